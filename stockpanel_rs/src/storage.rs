use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::io::parquet::{ParquetCompression, ParquetReader, ParquetWriter};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::info;

use crate::enriched::EnrichedPanel;

/// What a successful publish left on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub path: PathBuf,
    pub rows: usize,
    pub tickers: usize,
    /// SHA-256 of the published file bytes.
    pub sha256: String,
}

/// Destination for the enriched table. A publish either fully replaces the
/// previous table or leaves it untouched.
pub trait TableSink {
    /// Where the published table lives; run markers are kept beside it.
    fn location(&self) -> &Path;

    fn publish(&self, panel: &EnrichedPanel) -> Result<PublishReceipt>;
}

/// Zstd-compressed Parquet file, written next to its final location and
/// renamed into place so readers never observe a partial table.
#[derive(Debug, Clone)]
pub struct ParquetSink {
    path: PathBuf,
}

impl ParquetSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TableSink for ParquetSink {
    fn location(&self) -> &Path {
        &self.path
    }

    fn publish(&self, panel: &EnrichedPanel) -> Result<PublishReceipt> {
        let parent = parent_dir(&self.path);
        fs::create_dir_all(&parent)
            .with_context(|| format!("Unable to create {}", parent.display()))?;

        let mut tmp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Unable to create temp file in {}", parent.display()))?;
        let mut df = panel.data_frame().as_ref().clone();
        ParquetWriter::new(tmp.as_file_mut())
            .with_compression(ParquetCompression::Zstd(None))
            .finish(&mut df)
            .context("Failed to write enriched table")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush enriched table")?;

        let sha256 = sha256_file(tmp.path())?;
        tmp.persist(&self.path)
            .with_context(|| format!("Unable to publish {}", self.path.display()))?;

        let receipt = PublishReceipt {
            path: self.path.clone(),
            rows: panel.height(),
            tickers: panel.tickers().len(),
            sha256,
        };
        info!(
            path = %receipt.path.display(),
            rows = receipt.rows,
            tickers = receipt.tickers,
            sha256 = %receipt.sha256,
            "Enriched table published"
        );
        Ok(receipt)
    }
}

/// Load a previously published table and re-check its contract.
pub fn read_published(path: &Path) -> Result<EnrichedPanel> {
    let file = File::open(path).with_context(|| format!("Unable to open {}", path.display()))?;
    let df = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    EnrichedPanel::from_frame(df)
        .with_context(|| format!("{} does not hold an enriched table", path.display()))
}

pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Unable to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)
        .with_context(|| format!("Failed to hash {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enriched::tests::row;
    use tempfile::tempdir;

    #[test]
    fn publish_then_read_back() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("stock_data.parquet");
        let panel = EnrichedPanel::from_rows(&[
            row("AAPL", 2, 10.0, Some(0.0)),
            row("AAPL", 3, 9.0, Some(-10.0)),
        ])?;
        let receipt = ParquetSink::new(&path).publish(&panel)?;
        assert_eq!(receipt.rows, 2);
        assert_eq!(receipt.tickers, 1);
        assert_eq!(receipt.sha256, sha256_file(&path)?);

        let loaded = read_published(&path)?;
        assert_eq!(loaded.rows()?, panel.rows()?);
        Ok(())
    }

    #[test]
    fn publish_replaces_previous_table() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("stock_data.parquet");
        let sink = ParquetSink::new(&path);
        sink.publish(&EnrichedPanel::from_rows(&[row("AAPL", 2, 10.0, None)])?)?;
        sink.publish(&EnrichedPanel::from_rows(&[row("MSFT", 2, 4.0, None)])?)?;
        let loaded = read_published(&path)?;
        assert_eq!(loaded.tickers(), &["MSFT".to_string()]);
        let leftovers = fs::read_dir(dir.path())?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }

    #[test]
    fn bare_file_name_publishes_into_cwd_parent() {
        assert_eq!(parent_dir(Path::new("out.parquet")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("data/out.parquet")), PathBuf::from("data"));
    }
}
