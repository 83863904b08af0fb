use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use polars::prelude::*;
use sha2::{Digest, Sha256};

use crate::frame::{
    date_column, date_series, f64_column, optional_f64_column, string_column, u64_column,
};
use crate::panel::PriceBar;

/// Published column names, in published order. The dashboard looks columns
/// up by these exact names.
pub const ENRICHED_COLUMNS: [&str; 22] = [
    "Ticker",
    "Date",
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "Prev_close",
    "Daily_return",
    "Volatility",
    "MA_12",
    "MA_26",
    "MA_50",
    "MA_200",
    "First_Close",
    "Cumulative_Return",
    "Close_7_Days_Ago",
    "Momentum_7d",
    "MACD",
    "Signal_line",
    "Peak_Close",
    "DrawDown",
];

fn expected_dtype(column: &str) -> DataType {
    match column {
        "Ticker" => DataType::String,
        "Date" => DataType::Date,
        "Volume" => DataType::UInt64,
        _ => DataType::Float64,
    }
}

/// One ticker-day with every derived column. `None` marks a value that is
/// undefined (no history yet) or invalid (zero denominator); it is never
/// replaced by a default.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub ticker: String,
    pub bar: PriceBar,
    pub prev_close: Option<f64>,
    pub daily_return: Option<f64>,
    pub volatility: Option<f64>,
    pub ma_12: f64,
    pub ma_26: f64,
    pub ma_50: f64,
    pub ma_200: f64,
    pub first_close: f64,
    pub cumulative_return: Option<f64>,
    pub close_7_days_ago: Option<f64>,
    pub momentum_7d: Option<f64>,
    pub macd: f64,
    pub signal_line: f64,
    pub peak_close: f64,
    pub drawdown: Option<f64>,
}

/// Immutable, contract-checked enriched table. The only artefact handed to
/// a `TableSink`.
#[derive(Clone)]
pub struct EnrichedPanel {
    frame: Arc<DataFrame>,
    tickers: Arc<Vec<String>>,
}

impl EnrichedPanel {
    pub fn from_frame(frame: DataFrame) -> Result<Self> {
        let tickers = validate_contract(&frame)?;
        Ok(Self {
            frame: Arc::new(frame),
            tickers: Arc::new(tickers),
        })
    }

    pub fn from_rows(rows: &[EnrichedRow]) -> Result<Self> {
        let dates: Vec<_> = rows.iter().map(|r| r.bar.date).collect();
        let frame = DataFrame::new(vec![
            Series::new(
                "Ticker",
                rows.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(),
            ),
            date_series("Date", &dates)?,
            Series::new("Open", rows.iter().map(|r| r.bar.open).collect::<Vec<_>>()),
            Series::new("High", rows.iter().map(|r| r.bar.high).collect::<Vec<_>>()),
            Series::new("Low", rows.iter().map(|r| r.bar.low).collect::<Vec<_>>()),
            Series::new("Close", rows.iter().map(|r| r.bar.close).collect::<Vec<_>>()),
            Series::new(
                "Volume",
                rows.iter().map(|r| r.bar.volume).collect::<Vec<u64>>(),
            ),
            Series::new(
                "Prev_close",
                rows.iter().map(|r| r.prev_close).collect::<Vec<_>>(),
            ),
            Series::new(
                "Daily_return",
                rows.iter().map(|r| r.daily_return).collect::<Vec<_>>(),
            ),
            Series::new(
                "Volatility",
                rows.iter().map(|r| r.volatility).collect::<Vec<_>>(),
            ),
            Series::new("MA_12", rows.iter().map(|r| r.ma_12).collect::<Vec<_>>()),
            Series::new("MA_26", rows.iter().map(|r| r.ma_26).collect::<Vec<_>>()),
            Series::new("MA_50", rows.iter().map(|r| r.ma_50).collect::<Vec<_>>()),
            Series::new("MA_200", rows.iter().map(|r| r.ma_200).collect::<Vec<_>>()),
            Series::new(
                "First_Close",
                rows.iter().map(|r| r.first_close).collect::<Vec<_>>(),
            ),
            Series::new(
                "Cumulative_Return",
                rows.iter().map(|r| r.cumulative_return).collect::<Vec<_>>(),
            ),
            Series::new(
                "Close_7_Days_Ago",
                rows.iter().map(|r| r.close_7_days_ago).collect::<Vec<_>>(),
            ),
            Series::new(
                "Momentum_7d",
                rows.iter().map(|r| r.momentum_7d).collect::<Vec<_>>(),
            ),
            Series::new("MACD", rows.iter().map(|r| r.macd).collect::<Vec<_>>()),
            Series::new(
                "Signal_line",
                rows.iter().map(|r| r.signal_line).collect::<Vec<_>>(),
            ),
            Series::new(
                "Peak_Close",
                rows.iter().map(|r| r.peak_close).collect::<Vec<_>>(),
            ),
            Series::new(
                "DrawDown",
                rows.iter().map(|r| r.drawdown).collect::<Vec<_>>(),
            ),
        ])
        .context("Failed to assemble enriched table")?;
        Self::from_frame(frame)
    }

    pub fn data_frame(&self) -> Arc<DataFrame> {
        Arc::clone(&self.frame)
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Tickers in table order.
    pub fn tickers(&self) -> &[String] {
        self.tickers.as_ref()
    }

    pub fn rows(&self) -> Result<Vec<EnrichedRow>> {
        let frame = self.frame.as_ref();
        let tickers = string_column(frame, "Ticker")?;
        let dates = date_column(frame, "Date")?;
        let open = f64_column(frame, "Open")?;
        let high = f64_column(frame, "High")?;
        let low = f64_column(frame, "Low")?;
        let close = f64_column(frame, "Close")?;
        let volume = u64_column(frame, "Volume")?;
        let prev_close = optional_f64_column(frame, "Prev_close")?;
        let daily_return = optional_f64_column(frame, "Daily_return")?;
        let volatility = optional_f64_column(frame, "Volatility")?;
        let ma_12 = f64_column(frame, "MA_12")?;
        let ma_26 = f64_column(frame, "MA_26")?;
        let ma_50 = f64_column(frame, "MA_50")?;
        let ma_200 = f64_column(frame, "MA_200")?;
        let first_close = f64_column(frame, "First_Close")?;
        let cumulative_return = optional_f64_column(frame, "Cumulative_Return")?;
        let close_7_days_ago = optional_f64_column(frame, "Close_7_Days_Ago")?;
        let momentum_7d = optional_f64_column(frame, "Momentum_7d")?;
        let macd = f64_column(frame, "MACD")?;
        let signal_line = f64_column(frame, "Signal_line")?;
        let peak_close = f64_column(frame, "Peak_Close")?;
        let drawdown = optional_f64_column(frame, "DrawDown")?;

        Ok(tickers
            .into_iter()
            .enumerate()
            .map(|(i, ticker)| EnrichedRow {
                ticker,
                bar: PriceBar {
                    date: dates[i],
                    open: open[i],
                    high: high[i],
                    low: low[i],
                    close: close[i],
                    volume: volume[i],
                },
                prev_close: prev_close[i],
                daily_return: daily_return[i],
                volatility: volatility[i],
                ma_12: ma_12[i],
                ma_26: ma_26[i],
                ma_50: ma_50[i],
                ma_200: ma_200[i],
                first_close: first_close[i],
                cumulative_return: cumulative_return[i],
                close_7_days_ago: close_7_days_ago[i],
                momentum_7d: momentum_7d[i],
                macd: macd[i],
                signal_line: signal_line[i],
                peak_close: peak_close[i],
                drawdown: drawdown[i],
            })
            .collect())
    }

    /// SHA-256 of the table serialized as CSV. Identical inputs must give
    /// identical fingerprints.
    pub fn fingerprint(&self) -> Result<String> {
        let mut frame = self.frame.as_ref().clone();
        let mut writer = HashingWriter::new(io::sink());
        CsvWriter::new(&mut writer)
            .include_header(true)
            .finish(&mut frame)
            .context("Failed to hash enriched table")?;
        Ok(writer.finalize_hex())
    }
}

/// Check names, order and dtypes of every column, that each ticker's rows
/// are contiguous with strictly increasing dates, and that drawdowns are
/// never positive. Returns the tickers in table order.
fn validate_contract(frame: &DataFrame) -> Result<Vec<String>> {
    let names = frame.get_column_names();
    if names.as_slice() != ENRICHED_COLUMNS.as_slice() {
        return Err(anyhow!(
            "Enriched table columns {names:?} do not match the published schema {ENRICHED_COLUMNS:?}"
        ));
    }
    for name in ENRICHED_COLUMNS {
        let expected = expected_dtype(name);
        let actual = frame.column(name)?.dtype();
        if actual != &expected {
            return Err(anyhow!(
                "Column {name} has dtype {actual:?}, expected {expected:?}"
            ));
        }
    }

    let tickers = string_column(frame, "Ticker")?;
    let dates = date_column(frame, "Date")?;
    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for i in 0..tickers.len() {
        if i == 0 || tickers[i] != tickers[i - 1] {
            if !seen.insert(tickers[i].as_str()) {
                return Err(anyhow!("Rows for ticker {} are not contiguous", tickers[i]));
            }
            order.push(tickers[i].clone());
        } else if dates[i] <= dates[i - 1] {
            return Err(anyhow!(
                "Dates for ticker {} are not strictly increasing at {} (previous {})",
                tickers[i],
                dates[i],
                dates[i - 1]
            ));
        }
    }

    let drawdown = optional_f64_column(frame, "DrawDown")?;
    if let Some((idx, value)) = drawdown
        .iter()
        .enumerate()
        .find_map(|(idx, v)| v.filter(|v| *v > 0.0).map(|v| (idx, v)))
    {
        return Err(anyhow!(
            "DrawDown must never be positive (got {value} for {} on {})",
            tickers[idx],
            dates[idx]
        ));
    }

    Ok(order)
}

struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn row(ticker: &str, day: u32, close: f64, drawdown: Option<f64>) -> EnrichedRow {
        EnrichedRow {
            ticker: ticker.to_string(),
            bar: PriceBar {
                date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 10,
            },
            prev_close: None,
            daily_return: None,
            volatility: Some(0.0),
            ma_12: close,
            ma_26: close,
            ma_50: close,
            ma_200: close,
            first_close: close,
            cumulative_return: Some(0.0),
            close_7_days_ago: None,
            momentum_7d: None,
            macd: 0.0,
            signal_line: 0.0,
            peak_close: close,
            drawdown,
        }
    }

    #[test]
    fn rows_round_trip_through_frame() -> Result<()> {
        let rows = vec![
            row("AAPL", 2, 10.0, Some(0.0)),
            row("AAPL", 3, 9.0, Some(-10.0)),
            row("MSFT", 2, 5.0, None),
        ];
        let panel = EnrichedPanel::from_rows(&rows)?;
        assert_eq!(panel.data_frame().get_column_names(), ENRICHED_COLUMNS.to_vec());
        assert_eq!(panel.tickers(), &["AAPL".to_string(), "MSFT".to_string()]);
        assert_eq!(panel.rows()?, rows);
        Ok(())
    }

    #[test]
    fn empty_panel_keeps_schema() -> Result<()> {
        let panel = EnrichedPanel::from_rows(&[])?;
        assert_eq!(panel.height(), 0);
        assert!(panel.tickers().is_empty());
        Ok(())
    }

    #[test]
    fn rejects_positive_drawdown() {
        let rows = vec![row("AAPL", 2, 10.0, Some(0.5))];
        assert!(EnrichedPanel::from_rows(&rows).is_err());
    }

    #[test]
    fn rejects_repeated_or_backwards_dates() {
        let repeated = vec![row("AAPL", 2, 10.0, None), row("AAPL", 2, 10.0, None)];
        assert!(EnrichedPanel::from_rows(&repeated).is_err());
        let backwards = vec![row("AAPL", 3, 10.0, None), row("AAPL", 2, 10.0, None)];
        assert!(EnrichedPanel::from_rows(&backwards).is_err());
    }

    #[test]
    fn rejects_interleaved_tickers() {
        let rows = vec![
            row("AAPL", 2, 10.0, None),
            row("MSFT", 2, 10.0, None),
            row("AAPL", 3, 10.0, None),
        ];
        assert!(EnrichedPanel::from_rows(&rows).is_err());
    }

    #[test]
    fn rejects_renamed_columns() -> Result<()> {
        let panel = EnrichedPanel::from_rows(&[row("AAPL", 2, 10.0, None)])?;
        let mut frame = panel.data_frame().as_ref().clone();
        frame.rename("DrawDown", "Drawdown")?;
        assert!(EnrichedPanel::from_frame(frame).is_err());
        Ok(())
    }

    #[test]
    fn fingerprint_tracks_content() -> Result<()> {
        let a = EnrichedPanel::from_rows(&[row("AAPL", 2, 10.0, None)])?;
        let b = EnrichedPanel::from_rows(&[row("AAPL", 2, 10.0, None)])?;
        let c = EnrichedPanel::from_rows(&[row("AAPL", 2, 10.5, None)])?;
        assert_eq!(a.fingerprint()?, b.fingerprint()?);
        assert_ne!(a.fingerprint()?, c.fingerprint()?);
        Ok(())
    }
}
