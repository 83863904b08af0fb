use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::kpi_value::KpiValue;
use stockpanel_rs::universe::{default_tickers, find_ticker};
use stockpanel_rs::{DEFAULT_OUTPUT_PATH, EtlConfig};

#[derive(Parser, Debug)]
#[command(
    name = "stockpanel",
    about = "Daily equity price ETL with technical-analysis features"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest raw prices, compute features and publish the enriched table
    #[command(name = "run")]
    Run(RunArgs),
    /// Latest values and recent history for one ticker
    #[command(name = "show")]
    Show(ShowArgs),
    /// Overlay one KPI across several tickers
    #[command(name = "compare")]
    Compare(CompareArgs),
    /// Rank tickers by a KPI on their latest trading day
    #[command(name = "top")]
    Top(TopArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding one <TICKER>.csv per symbol
    #[arg(long = "input-dir", value_hint = clap::ValueHint::DirPath)]
    pub input_dir: PathBuf,

    /// Published table location
    #[arg(long = "output", default_value = DEFAULT_OUTPUT_PATH, value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// Comma-separated subset of the tracked universe (default: all 30)
    #[arg(long = "tickers", value_delimiter = ',')]
    pub tickers: Vec<String>,

    /// Years of history to ingest, counted back from yesterday
    #[arg(long = "lookback-years", default_value_t = 3)]
    pub lookback_years: u32,

    /// Run date (YYYY-MM-DD); defaults to today
    #[arg(long = "as-of")]
    pub as_of: Option<String>,

    /// Number of worker threads (omit to use all logical cores)
    #[arg(long = "workers")]
    pub workers: Option<usize>,

    /// Publish even if a table was already published for the run date
    #[arg(long = "force", default_value_t = false)]
    pub force: bool,

    /// Publish the remaining tickers when some yield no rows
    #[arg(long = "allow-missing", default_value_t = false)]
    pub allow_missing: bool,

    /// Abort instead of excluding tickers with malformed series
    #[arg(long = "fail-on-malformed", default_value_t = false)]
    pub fail_on_malformed: bool,

    /// Log to stdout only
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,
}

impl RunArgs {
    pub fn into_config(self) -> Result<EtlConfig> {
        let tickers = if self.tickers.is_empty() {
            default_tickers()
        } else {
            self.tickers
                .iter()
                .map(|raw| {
                    find_ticker(raw)
                        .map(|profile| profile.symbol.to_string())
                        .ok_or_else(|| anyhow!("Unknown ticker '{raw}'"))
                })
                .collect::<Result<Vec<_>>>()?
        };
        if self.lookback_years == 0 {
            return Err(anyhow!("--lookback-years must be at least 1"));
        }

        let mut config = EtlConfig::new(self.input_dir, self.output);
        config.tickers = tickers;
        config.lookback_years = self.lookback_years;
        config.as_of = parse_optional_date(self.as_of.as_deref())?;
        config.n_workers = self.workers.unwrap_or(0);
        config.force = self.force;
        config.allow_missing_tickers = self.allow_missing;
        config.fail_on_malformed = self.fail_on_malformed;
        Ok(config)
    }
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Ticker symbol
    pub ticker: String,

    /// Published table to read
    #[arg(long = "table", default_value = DEFAULT_OUTPUT_PATH)]
    pub table: PathBuf,

    /// Number of most recent rows to print
    #[arg(long = "rows", default_value_t = 10)]
    pub rows: usize,
}

#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// KPI to overlay
    #[arg(long = "kpi", value_enum, default_value = "close")]
    pub kpi: KpiValue,

    /// Comma-separated tickers to compare
    #[arg(long = "tickers", value_delimiter = ',', required = true)]
    pub tickers: Vec<String>,

    /// Published table to read
    #[arg(long = "table", default_value = DEFAULT_OUTPUT_PATH)]
    pub table: PathBuf,

    /// Only the most recent N dates per ticker
    #[arg(long = "last")]
    pub last: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct TopArgs {
    /// KPI to rank by
    #[arg(long = "kpi", value_enum, default_value = "momentum-7d")]
    pub kpi: KpiValue,

    /// How many tickers to list
    #[arg(long = "top-k", default_value_t = 5)]
    pub top_k: usize,

    /// Published table to read
    #[arg(long = "table", default_value = DEFAULT_OUTPUT_PATH)]
    pub table: PathBuf,
}

fn parse_optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value {
        Some(raw) => {
            let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .with_context(|| format!("Invalid date format for {raw}. Expected YYYY-MM-DD"))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
