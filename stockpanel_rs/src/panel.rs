use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EtlError;
use crate::frame::{date_column, date_series, f64_column, u64_column};

pub const PANEL_COLUMNS: [&str; 7] = ["Ticker", "Date", "Open", "High", "Low", "Close", "Volume"];

/// One trading day of raw OHLCV data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerSeries {
    pub ticker: String,
    pub bars: Vec<PriceBar>,
}

impl TickerSeries {
    pub fn new(ticker: impl Into<String>, bars: Vec<PriceBar>) -> Self {
        Self {
            ticker: ticker.into(),
            bars,
        }
    }
}

/// Column-wise copy of one ticker's rows, in panel order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceColumns {
    pub dates: Vec<NaiveDate>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<u64>,
}

impl PriceColumns {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn bar(&self, idx: usize) -> PriceBar {
        PriceBar {
            date: self.dates[idx],
            open: self.open[idx],
            high: self.high[idx],
            low: self.low[idx],
            close: self.close[idx],
            volume: self.volume[idx],
        }
    }

    pub fn bars(&self) -> impl Iterator<Item = PriceBar> + '_ {
        (0..self.len()).map(|idx| self.bar(idx))
    }
}

impl From<&[PriceBar]> for PriceColumns {
    fn from(bars: &[PriceBar]) -> Self {
        Self {
            dates: bars.iter().map(|b| b.date).collect(),
            open: bars.iter().map(|b| b.open).collect(),
            high: bars.iter().map(|b| b.high).collect(),
            low: bars.iter().map(|b| b.low).collect(),
            close: bars.iter().map(|b| b.close).collect(),
            volume: bars.iter().map(|b| b.volume).collect(),
        }
    }
}

/// Contiguous row range of one ticker inside the panel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub ticker: String,
    pub offset: usize,
    pub len: usize,
}

/// Long-format `{Ticker, Date, Open, High, Low, Close, Volume}` table with
/// each ticker's rows stored contiguously, tickers in ascending order.
#[derive(Clone)]
pub struct PricePanel {
    frame: Arc<DataFrame>,
    partitions: Arc<Vec<Partition>>,
}

impl PricePanel {
    pub fn data_frame(&self) -> Arc<DataFrame> {
        Arc::clone(&self.frame)
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn partitions(&self) -> &[Partition] {
        self.partitions.as_ref()
    }

    pub fn tickers(&self) -> Vec<&str> {
        self.partitions.iter().map(|p| p.ticker.as_str()).collect()
    }

    pub fn columns(&self, partition: &Partition) -> Result<PriceColumns> {
        let slice = self.frame.slice(partition.offset as i64, partition.len);
        let read = || -> Result<PriceColumns> {
            Ok(PriceColumns {
                dates: date_column(&slice, "Date")?,
                open: f64_column(&slice, "Open")?,
                high: f64_column(&slice, "High")?,
                low: f64_column(&slice, "Low")?,
                close: f64_column(&slice, "Close")?,
                volume: u64_column(&slice, "Volume")?,
            })
        };
        read().with_context(|| format!("Failed to read price columns for {}", partition.ticker))
    }

    fn from_grouped(grouped: &BTreeMap<String, Vec<PriceBar>>) -> Result<Self> {
        let height = grouped.values().map(Vec::len).sum();
        let mut tickers: Vec<&str> = Vec::with_capacity(height);
        let mut dates = Vec::with_capacity(height);
        let mut open = Vec::with_capacity(height);
        let mut high = Vec::with_capacity(height);
        let mut low = Vec::with_capacity(height);
        let mut close = Vec::with_capacity(height);
        let mut volume = Vec::with_capacity(height);
        let mut partitions = Vec::with_capacity(grouped.len());

        for (ticker, bars) in grouped {
            partitions.push(Partition {
                ticker: ticker.clone(),
                offset: tickers.len(),
                len: bars.len(),
            });
            for bar in bars {
                tickers.push(ticker.as_str());
                dates.push(bar.date);
                open.push(bar.open);
                high.push(bar.high);
                low.push(bar.low);
                close.push(bar.close);
                volume.push(bar.volume);
            }
        }

        let frame = DataFrame::new(vec![
            Series::new("Ticker", tickers),
            date_series("Date", &dates)?,
            Series::new("Open", open),
            Series::new("High", high),
            Series::new("Low", low),
            Series::new("Close", close),
            Series::new("Volume", volume),
        ])
        .context("Failed to assemble price panel")?;

        Ok(Self {
            frame: Arc::new(frame),
            partitions: Arc::new(partitions),
        })
    }
}

pub struct PanelBuild {
    pub panel: PricePanel,
    /// `MissingTickerData` for requested tickers that were skipped because
    /// partial results were allowed.
    pub missing: Vec<EtlError>,
}

pub struct PanelBuilder {
    requested: Vec<String>,
    allow_missing: bool,
}

impl PanelBuilder {
    pub fn new<S: AsRef<str>>(tickers: &[S]) -> Self {
        let mut seen = HashSet::new();
        let requested = tickers
            .iter()
            .map(|t| t.as_ref().to_string())
            .filter(|t| seen.insert(t.clone()))
            .collect();
        Self {
            requested,
            allow_missing: false,
        }
    }

    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }

    /// Normalize per-ticker series into one panel.
    ///
    /// Rows keep the order the ingestor produced them in; ordering and
    /// uniqueness of dates are checked by the feature engine, which can
    /// exclude a single ticker instead of failing the whole panel.
    pub fn build(&self, fetched: Vec<TickerSeries>) -> Result<PanelBuild> {
        let requested: HashSet<&str> = self.requested.iter().map(String::as_str).collect();
        let mut grouped: BTreeMap<String, Vec<PriceBar>> = BTreeMap::new();

        for series in fetched {
            if !requested.contains(series.ticker.as_str()) {
                warn!(ticker = %series.ticker, "Ignoring series for a ticker that was not requested");
                continue;
            }
            grouped
                .entry(series.ticker)
                .or_default()
                .extend(series.bars);
        }

        let mut missing = Vec::new();
        for ticker in &self.requested {
            let empty = grouped.get(ticker).is_none_or(|bars| bars.is_empty());
            if empty {
                warn!(ticker = %ticker, "No rows ingested for ticker");
                grouped.remove(ticker);
                missing.push(EtlError::MissingTickerData {
                    ticker: ticker.clone(),
                });
            }
        }

        if !self.allow_missing {
            if let Some(first) = missing.first() {
                return Err(first.clone().into());
            }
        }

        let panel = PricePanel::from_grouped(&grouped)?;
        info!(
            tickers = panel.partitions().len(),
            rows = panel.height(),
            missing = missing.len(),
            "Price panel built"
        );
        Ok(PanelBuild { panel, missing })
    }
}
