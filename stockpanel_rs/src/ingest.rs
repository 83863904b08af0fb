use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{info, warn};

use crate::config::DateRange;
use crate::frame::{date_column, numeric_values};
use crate::panel::{PriceBar, TickerSeries};

const RAW_COLUMNS: [&str; 6] = ["Date", "Open", "High", "Low", "Close", "Volume"];

/// Supplier of raw daily bars. Implementations return the bars for one
/// ticker restricted to `range`, in source order; an unknown ticker yields
/// an empty vector rather than an error.
pub trait SeriesSource: Send + Sync {
    fn fetch(&self, ticker: &str, range: &DateRange) -> Result<Vec<PriceBar>>;
}

/// Reads `<dir>/<TICKER>.csv` files with a `Date,Open,High,Low,Close,Volume`
/// header. Extra columns (e.g. `Adj Close`) are ignored.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{ticker}.csv"))
    }
}

impl SeriesSource for CsvDirectorySource {
    fn fetch(&self, ticker: &str, range: &DateRange) -> Result<Vec<PriceBar>> {
        let path = self.path_for(ticker);
        if !path.exists() {
            warn!(ticker = %ticker, path = %path.display(), "No raw CSV for ticker");
            return Ok(Vec::new());
        }
        let df = CsvReader::from_path(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?
            .infer_schema(Some(1024))
            .has_header(true)
            .finish()
            .with_context(|| format!("Unable to read {} into DataFrame", path.display()))?;
        bars_from_frame(&df, range).with_context(|| format!("Invalid raw CSV {}", path.display()))
    }
}

fn bars_from_frame(df: &DataFrame, range: &DateRange) -> Result<Vec<PriceBar>> {
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    for name in RAW_COLUMNS {
        if df.column(name).is_err() {
            return Err(anyhow!("Missing required column {name}"));
        }
    }

    let dates = raw_dates(df)?;
    let open = numeric_values(df.column("Open")?)?;
    let high = numeric_values(df.column("High")?)?;
    let low = numeric_values(df.column("Low")?)?;
    let close = numeric_values(df.column("Close")?)?;
    let volume = numeric_values(df.column("Volume")?)?;

    let mut bars = Vec::with_capacity(dates.len());
    let mut incomplete = 0usize;
    for idx in 0..dates.len() {
        let Some(date) = dates[idx] else {
            incomplete += 1;
            continue;
        };
        if !range.contains(date) {
            continue;
        }
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) =
            (open[idx], high[idx], low[idx], close[idx], volume[idx])
        else {
            incomplete += 1;
            continue;
        };
        bars.push(PriceBar {
            date,
            open,
            high,
            low,
            close,
            volume: share_count(volume, date)?,
        });
    }
    if incomplete > 0 {
        warn!(rows = incomplete, "Skipped raw rows with empty fields");
    }
    Ok(bars)
}

fn share_count(volume: f64, date: NaiveDate) -> Result<u64> {
    if !volume.is_finite() || volume < 0.0 || volume.fract() != 0.0 {
        return Err(anyhow!(
            "Volume on {date} must be a non-negative whole number (got {volume})"
        ));
    }
    Ok(volume as u64)
}

/// Accepts a parsed date column or ISO text. Timestamps such as
/// `2024-01-02 00:00:00-05:00` keep only their calendar date.
fn raw_dates(df: &DataFrame) -> Result<Vec<Option<NaiveDate>>> {
    let series = df.column("Date")?;
    match series.dtype() {
        DataType::Date => Ok(date_column(df, "Date")?.into_iter().map(Some).collect()),
        DataType::String => series
            .str()
            .context("Date column must be text")?
            .into_iter()
            .map(|opt| opt.map(parse_day).transpose())
            .collect(),
        other => Err(anyhow!("Unsupported Date dtype {other:?}")),
    }
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    let day = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").with_context(|| format!("Unparseable date {raw:?}"))
}

/// Fixed in-memory bars per ticker, for tests and replays.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    series: HashMap<String, Vec<PriceBar>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, ticker: impl Into<String>, bars: Vec<PriceBar>) -> Self {
        self.series.insert(ticker.into(), bars);
        self
    }
}

impl SeriesSource for InMemorySource {
    fn fetch(&self, ticker: &str, range: &DateRange) -> Result<Vec<PriceBar>> {
        Ok(self
            .series
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|bar| range.contains(bar.date))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Fetch every requested ticker. Any source error aborts the run; empty
/// results are left for the panel builder to judge.
pub fn fetch_all<S: AsRef<str>>(
    source: &dyn SeriesSource,
    tickers: &[S],
    range: &DateRange,
) -> Result<Vec<TickerSeries>> {
    let mut fetched = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let ticker = ticker.as_ref();
        let bars = source
            .fetch(ticker, range)
            .with_context(|| format!("Failed to ingest {ticker}"))?;
        fetched.push(TickerSeries::new(ticker, bars));
    }
    let rows: usize = fetched.iter().map(|s| s.bars.len()).sum();
    info!(
        tickers = fetched.len(),
        rows,
        start = %range.start,
        end = %range.end,
        "Raw series ingested"
    );
    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn range() -> DateRange {
        DateRange {
            start: ymd(2024, 1, 1),
            end: ymd(2024, 1, 5),
        }
    }

    #[test]
    fn csv_rows_are_filtered_to_range_in_file_order() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("AAPL.csv"),
            "Date,Open,High,Low,Close,Adj Close,Volume\n\
             2023-12-29,1,2,0.5,1.5,1.5,100\n\
             2024-01-03,3,4,2.5,3.5,3.5,300\n\
             2024-01-02 00:00:00-05:00,2,3,1.5,2.5,2.5,200\n\
             2024-01-05,5,6,4.5,5.5,5.5,500\n",
        )?;
        let bars = CsvDirectorySource::new(dir.path()).fetch("AAPL", &range())?;
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, ymd(2024, 1, 3));
        assert_eq!(bars[1].date, ymd(2024, 1, 2));
        assert_eq!(bars[1].volume, 200);
        assert_eq!(bars[1].close, 2.5);
        Ok(())
    }

    #[test]
    fn missing_file_is_empty_not_an_error() -> Result<()> {
        let dir = tempdir()?;
        let bars = CsvDirectorySource::new(dir.path()).fetch("MSFT", &range())?;
        assert!(bars.is_empty());
        Ok(())
    }

    #[test]
    fn rows_with_empty_fields_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("AAPL.csv"),
            "Date,Open,High,Low,Close,Volume\n\
             2024-01-02,2.0,3.0,1.5,,200\n\
             2024-01-03,3.0,4.0,2.5,3.5,300\n",
        )?;
        let bars = CsvDirectorySource::new(dir.path()).fetch("AAPL", &range())?;
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, ymd(2024, 1, 3));
        Ok(())
    }

    #[test]
    fn negative_volume_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("AAPL.csv"),
            "Date,Open,High,Low,Close,Volume\n2024-01-02,2.0,3.0,1.5,2.5,-5\n",
        )?;
        assert!(CsvDirectorySource::new(dir.path())
            .fetch("AAPL", &range())
            .is_err());
        Ok(())
    }

    #[test]
    fn missing_column_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("AAPL.csv"),
            "Date,Open,High,Low,Close\n2024-01-02,2.0,3.0,1.5,2.5\n",
        )?;
        assert!(CsvDirectorySource::new(dir.path())
            .fetch("AAPL", &range())
            .is_err());
        Ok(())
    }

    #[test]
    fn fetch_all_keeps_requested_order_and_empties() -> Result<()> {
        let bar = PriceBar {
            date: ymd(2024, 1, 2),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
        };
        let late = PriceBar {
            date: ymd(2024, 2, 1),
            ..bar
        };
        let source = InMemorySource::new().with_series("AAPL", vec![bar, late]);
        let fetched = fetch_all(&source, &["MSFT", "AAPL"], &range())?;
        assert_eq!(fetched[0], TickerSeries::new("MSFT", Vec::new()));
        assert_eq!(fetched[1], TickerSeries::new("AAPL", vec![bar]));
        Ok(())
    }
}
