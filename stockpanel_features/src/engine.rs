use std::time::Instant;

use anyhow::Result;
use chrono::NaiveDate;
use rayon::prelude::*;
use stockpanel_rs::panel::{PriceBar, PriceColumns};
use stockpanel_rs::{ComputeContext, EnrichedPanel, EnrichedRow, EtlError, PricePanel, RunReport};
use tracing::info;

use crate::window::{TrailingWindow, pct_change, round2};

pub const MOVING_AVERAGE_WINDOWS: [usize; 4] = [12, 26, 50, 200];
pub const MOMENTUM_LAG: usize = 7;
pub const SIGNAL_WINDOW: usize = 9;

const CLOSE_HISTORY: usize = 200;

pub struct EnrichmentOutcome {
    pub panel: EnrichedPanel,
    /// Excluded tickers and null cells. `missing` is left for the caller.
    pub report: RunReport,
}

/// Derived columns for one ticker plus the cells that could not be computed.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFeatures {
    pub rows: Vec<EnrichedRow>,
    pub faults: Vec<EtlError>,
}

/// Computes every derived column per ticker in a single forward pass.
/// Tickers are independent and fan out across the context's worker pool.
pub struct FeatureEngine<'ctx> {
    ctx: &'ctx ComputeContext,
}

impl<'ctx> FeatureEngine<'ctx> {
    pub fn new(ctx: &'ctx ComputeContext) -> Self {
        Self { ctx }
    }

    pub fn enrich(&self, panel: &PricePanel) -> Result<EnrichmentOutcome> {
        let started = Instant::now();
        let partitions = panel.partitions();
        let results: Vec<Result<Result<SeriesFeatures, EtlError>>> = self.ctx.install(|| {
            partitions
                .par_iter()
                .map(|partition| {
                    let columns = panel.columns(partition)?;
                    Ok(enrich_series(&partition.ticker, &columns))
                })
                .collect()
        });

        let mut rows = Vec::with_capacity(panel.height());
        let mut report = RunReport::default();
        for result in results {
            match result? {
                Ok(features) => {
                    rows.extend(features.rows);
                    report.invalid_cells.extend(features.faults);
                }
                Err(err) => report.excluded.push(err),
            }
        }

        let enriched = EnrichedPanel::from_rows(&rows)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %self.ctx.run_id(),
            workers = self.ctx.workers(),
            tickers = enriched.tickers().len(),
            rows = enriched.height(),
            excluded = report.excluded.len(),
            invalid_cells = report.invalid_cells.len(),
            elapsed_ms,
            "Feature enrichment finished"
        );
        Ok(EnrichmentOutcome {
            panel: enriched,
            report,
        })
    }
}

/// Enrich one ticker's rows, which must already be in ascending date order.
pub fn enrich_series(ticker: &str, columns: &PriceColumns) -> Result<SeriesFeatures, EtlError> {
    validate_series(ticker, columns)?;
    let mut acc = SeriesAccumulator::new(ticker);
    let rows = columns.bars().map(|bar| acc.step(bar)).collect();
    Ok(SeriesFeatures {
        rows,
        faults: acc.faults,
    })
}

fn validate_series(ticker: &str, columns: &PriceColumns) -> Result<(), EtlError> {
    for (idx, bar) in columns.bars().enumerate() {
        for (name, price) in [
            ("Open", bar.open),
            ("High", bar.high),
            ("Low", bar.low),
            ("Close", bar.close),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(EtlError::malformed(
                    ticker,
                    format!("{name} on {} is {price}", bar.date),
                ));
            }
        }
        if idx > 0 {
            let prev = columns.dates[idx - 1];
            if bar.date == prev {
                return Err(EtlError::malformed(
                    ticker,
                    format!("duplicate date {}", bar.date),
                ));
            }
            if bar.date < prev {
                return Err(EtlError::malformed(
                    ticker,
                    format!("date {} follows later date {prev}", bar.date),
                ));
            }
        }
    }
    Ok(())
}

struct SeriesAccumulator<'a> {
    ticker: &'a str,
    prev_close: Option<f64>,
    first_close: Option<f64>,
    peak_close: Option<f64>,
    closes: TrailingWindow,
    macd: TrailingWindow,
    faults: Vec<EtlError>,
}

impl<'a> SeriesAccumulator<'a> {
    fn new(ticker: &'a str) -> Self {
        Self {
            ticker,
            prev_close: None,
            first_close: None,
            peak_close: None,
            closes: TrailingWindow::new(CLOSE_HISTORY),
            macd: TrailingWindow::new(SIGNAL_WINDOW),
            faults: Vec::new(),
        }
    }

    fn step(&mut self, bar: PriceBar) -> EnrichedRow {
        let date = bar.date;
        let close = bar.close;

        let prev_close = self.prev_close;
        let daily_return =
            prev_close.and_then(|prev| self.percent(date, "Daily_return", close, prev));
        let volatility = self.percent(date, "Volatility", bar.high, bar.low);

        self.closes.push(close);
        let [ma_12, ma_26, ma_50, ma_200] = MOVING_AVERAGE_WINDOWS.map(|w| self.moving_average(w));

        let first_close = *self.first_close.get_or_insert(close);
        let cumulative_return = self.percent(date, "Cumulative_Return", close, first_close);

        let close_7_days_ago = self.closes.lag(MOMENTUM_LAG);
        let momentum_7d =
            close_7_days_ago.and_then(|base| self.percent(date, "Momentum_7d", close, base));

        // Rounded averages are subtracted as-is; the difference is not re-rounded.
        let macd = ma_12 - ma_26;
        self.macd.push(macd);
        let signal_line = self.macd.mean(SIGNAL_WINDOW).map(round2).unwrap_or(macd);

        let peak_close = self.peak_close.map_or(close, |peak| peak.max(close));
        self.peak_close = Some(peak_close);
        let drawdown = self.percent(date, "DrawDown", close, peak_close);

        self.prev_close = Some(close);

        EnrichedRow {
            ticker: self.ticker.to_string(),
            bar,
            prev_close,
            daily_return,
            volatility,
            ma_12,
            ma_26,
            ma_50,
            ma_200,
            first_close,
            cumulative_return,
            close_7_days_ago,
            momentum_7d,
            macd,
            signal_line,
            peak_close,
            drawdown,
        }
    }

    fn moving_average(&self, length: usize) -> f64 {
        self.closes.mean(length).map(round2).unwrap_or(f64::NAN)
    }

    /// Rounded percent change, or `None` plus a recorded fault when `base`
    /// is zero.
    fn percent(&mut self, date: NaiveDate, column: &'static str, new: f64, base: f64) -> Option<f64> {
        match pct_change(new, base) {
            Some(value) => Some(round2(value)),
            None => {
                self.faults.push(EtlError::DivisionByZeroPrice {
                    ticker: self.ticker.to_string(),
                    date,
                    column,
                });
                None
            }
        }
    }
}
