use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::storage::{PublishReceipt, parent_dir};

/// Sidecar record of the last successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMarker {
    pub run_date: NaiveDate,
    pub rows: usize,
    pub tickers: usize,
    pub sha256: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    AlreadyRan(RunMarker),
}

/// Once-per-calendar-day guard for the daily job, stored as
/// `<table>.last_run.json` next to the published table.
#[derive(Debug, Clone)]
pub struct DailyRunGuard {
    marker_path: PathBuf,
}

impl DailyRunGuard {
    pub fn for_table(table: &Path) -> Self {
        let mut name = table
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".last_run.json");
        Self {
            marker_path: table.with_file_name(name),
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// A missing or unreadable marker never blocks a run.
    pub fn check(&self, run_date: NaiveDate) -> GuardDecision {
        match self.load() {
            Ok(Some(marker)) if marker.run_date == run_date => GuardDecision::AlreadyRan(marker),
            Ok(_) => GuardDecision::Proceed,
            Err(err) => {
                warn!(
                    path = %self.marker_path.display(),
                    error = %err,
                    "Ignoring unreadable run marker"
                );
                GuardDecision::Proceed
            }
        }
    }

    pub fn load(&self) -> Result<Option<RunMarker>> {
        if !self.marker_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.marker_path)
            .with_context(|| format!("Unable to read {}", self.marker_path.display()))?;
        let marker = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed run marker {}", self.marker_path.display()))?;
        Ok(Some(marker))
    }

    pub fn record(&self, run_date: NaiveDate, receipt: &PublishReceipt) -> Result<RunMarker> {
        let marker = RunMarker {
            run_date,
            rows: receipt.rows,
            tickers: receipt.tickers,
            sha256: receipt.sha256.clone(),
            recorded_at: Utc::now(),
        };
        let parent = parent_dir(&self.marker_path);
        fs::create_dir_all(&parent)
            .with_context(|| format!("Unable to create {}", parent.display()))?;
        let mut tmp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Unable to create temp file in {}", parent.display()))?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), &marker)
            .context("Failed to serialize run marker")?;
        tmp.as_file_mut()
            .flush()
            .context("Failed to flush run marker")?;
        tmp.persist(&self.marker_path)
            .with_context(|| format!("Unable to write {}", self.marker_path.display()))?;
        info!(path = %self.marker_path.display(), run_date = %run_date, "Run marker recorded");
        Ok(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn receipt(path: &Path) -> PublishReceipt {
        PublishReceipt {
            path: path.to_path_buf(),
            rows: 4,
            tickers: 2,
            sha256: "abc".to_string(),
        }
    }

    #[test]
    fn marker_sits_next_to_table() {
        let guard = DailyRunGuard::for_table(Path::new("data/stock_data.parquet"));
        assert_eq!(
            guard.marker_path(),
            Path::new("data/stock_data.parquet.last_run.json")
        );
    }

    #[test]
    fn same_day_is_skipped_next_day_proceeds() -> Result<()> {
        let dir = tempdir()?;
        let table = dir.path().join("stock_data.parquet");
        let guard = DailyRunGuard::for_table(&table);
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(guard.check(today), GuardDecision::Proceed);

        let marker = guard.record(today, &receipt(&table))?;
        assert_eq!(guard.check(today), GuardDecision::AlreadyRan(marker));
        assert_eq!(
            guard.check(today.succ_opt().unwrap()),
            GuardDecision::Proceed
        );
        Ok(())
    }

    #[test]
    fn corrupt_marker_does_not_block() -> Result<()> {
        let dir = tempdir()?;
        let guard = DailyRunGuard::for_table(&dir.path().join("t.parquet"));
        fs::write(guard.marker_path(), "{not json")?;
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(guard.check(today), GuardDecision::Proceed);
        assert!(guard.load().is_err());
        Ok(())
    }
}
