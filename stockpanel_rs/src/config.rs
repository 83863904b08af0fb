use std::path::PathBuf;

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::universe::default_tickers;

pub const DEFAULT_OUTPUT_PATH: &str = "data/stock_data.parquet";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Symbols to ingest. Order is irrelevant; the published table is
    /// sorted by ticker.
    pub tickers: Vec<String>,
    /// Directory holding one raw `<TICKER>.csv` per symbol.
    pub input_dir: PathBuf,
    /// Location of the persisted enriched table. Each run fully replaces it.
    pub output_path: PathBuf,
    #[serde(default = "default_lookback_years")]
    pub lookback_years: u32,
    /// Run date used for the ingest window and the once-per-day guard.
    /// Defaults to the local calendar date when omitted.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    /// Worker threads for per-ticker feature computation (0 = all cores).
    #[serde(default)]
    pub n_workers: usize,
    /// Publish the remaining tickers when some requested tickers yield no
    /// rows, instead of failing the run.
    #[serde(default)]
    pub allow_missing_tickers: bool,
    /// Fail the run when any ticker's series is malformed, instead of
    /// excluding that ticker and reporting it.
    #[serde(default)]
    pub fail_on_malformed: bool,
    /// Ignore the once-per-day guard.
    #[serde(default)]
    pub force: bool,
}

const fn default_lookback_years() -> u32 {
    3
}

impl EtlConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            tickers: default_tickers(),
            input_dir: input_dir.into(),
            output_path: output_path.into(),
            lookback_years: default_lookback_years(),
            as_of: None,
            n_workers: 0,
            allow_missing_tickers: false,
            fail_on_malformed: false,
            force: false,
        }
    }

    pub fn run_date(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn date_range(&self) -> DateRange {
        DateRange::trailing_years(self.run_date(), self.lookback_years)
    }
}

/// Half-open calendar range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The ingest window for a run: `end` is the day before `run_date`
    /// (exclusive) and `start` lies `years * 365` days earlier.
    pub fn trailing_years(run_date: NaiveDate, years: u32) -> Self {
        let end = run_date - Days::new(1);
        let start = end - Days::new(365 * u64::from(years));
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn trailing_window_ends_yesterday_exclusive() {
        let range = DateRange::trailing_years(ymd(2024, 3, 1), 3);
        assert_eq!(range.end, ymd(2024, 2, 29));
        assert_eq!(range.start, ymd(2021, 3, 1));
        assert!(range.contains(ymd(2021, 3, 1)));
        assert!(range.contains(ymd(2024, 2, 28)));
        assert!(!range.contains(ymd(2024, 2, 29)));
        assert!(!range.contains(ymd(2021, 2, 28)));
    }

    #[test]
    fn config_round_trips_through_json_with_defaults() {
        let raw = r#"{"tickers":["AAPL"],"input_dir":"raw","output_path":"out.parquet"}"#;
        let config: EtlConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.lookback_years, 3);
        assert_eq!(config.n_workers, 0);
        assert!(!config.force);
        assert!(config.as_of.is_none());
    }

    #[test]
    fn explicit_as_of_drives_run_date() {
        let mut config = EtlConfig::new("raw", DEFAULT_OUTPUT_PATH);
        config.as_of = Some(ymd(2025, 1, 10));
        assert_eq!(config.run_date(), ymd(2025, 1, 10));
        assert_eq!(config.date_range().end, ymd(2025, 1, 9));
        assert_eq!(config.tickers.len(), 30);
    }
}
