use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use stockpanel_rs::{
    ComputeContext, DailyRunGuard, DateRange, EtlConfig, GuardDecision, PanelBuilder,
    PublishReceipt, RunMarker, RunReport, SeriesSource, TableSink, fetch_all,
};
use tracing::{info, warn};

use crate::engine::FeatureEngine;

#[derive(Debug)]
pub enum RunOutcome {
    /// A table was already published for this run date.
    Skipped(RunMarker),
    Published(RunSummary),
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_date: NaiveDate,
    pub range: DateRange,
    pub receipt: PublishReceipt,
    /// `None` when the table was published but the marker could not be
    /// written; the next run on the same day will publish again.
    pub marker: Option<RunMarker>,
    pub report: RunReport,
}

/// Guard, ingest, build, enrich, publish, record.
///
/// Every failure before the publish step returns early, so the previously
/// published table stays in place untouched. The guard marker is keyed on
/// the sink's location.
pub fn run_etl(
    config: &EtlConfig,
    source: &dyn SeriesSource,
    sink: &dyn TableSink,
) -> Result<RunOutcome> {
    let run_date = config.run_date();
    let guard = DailyRunGuard::for_table(sink.location());
    if !config.force {
        if let GuardDecision::AlreadyRan(marker) = guard.check(run_date) {
            info!(
                run_date = %run_date,
                marker = %guard.marker_path().display(),
                "Table already published today; skipping run"
            );
            return Ok(RunOutcome::Skipped(marker));
        }
    }

    if config.tickers.is_empty() {
        return Err(anyhow!("No tickers configured"));
    }

    let range = config.date_range();
    let ctx = ComputeContext::new(config.n_workers, run_date)?;
    info!(
        run_id = %ctx.run_id(),
        run_date = %run_date,
        start = %range.start,
        end = %range.end,
        tickers = config.tickers.len(),
        workers = ctx.workers(),
        "Starting ETL run"
    );

    let fetched = fetch_all(source, &config.tickers, &range)?;
    let build = PanelBuilder::new(&config.tickers)
        .allow_missing(config.allow_missing_tickers)
        .build(fetched)?;

    let outcome = FeatureEngine::new(&ctx).enrich(&build.panel)?;
    let mut report = outcome.report;
    report.missing = build.missing;

    if config.fail_on_malformed {
        if let Some(first) = report.excluded.first() {
            report.log_warnings();
            return Err(first.clone().into());
        }
    }
    if outcome.panel.height() == 0 {
        report.log_warnings();
        return Err(anyhow!(
            "No ticker produced publishable rows; keeping the previous table"
        ));
    }

    let receipt = sink.publish(&outcome.panel)?;
    report.log_warnings();
    let marker = match guard.record(run_date, &receipt) {
        Ok(marker) => Some(marker),
        Err(err) => {
            warn!(
                path = %guard.marker_path().display(),
                error = %format!("{err:#}"),
                "Table published but run marker not recorded"
            );
            None
        }
    };
    info!(
        run_id = %ctx.run_id(),
        rows = receipt.rows,
        tickers = receipt.tickers,
        clean = report.is_clean(),
        marker = marker.is_some(),
        "ETL run complete"
    );

    Ok(RunOutcome::Published(RunSummary {
        run_date,
        range,
        receipt,
        marker,
        report,
    }))
}
