use tracing::warn;

use crate::error::EtlError;

/// Data-quality findings of one run. None of these stop a publish on their
/// own; the run policy decides which ones do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Requested tickers with no ingested rows.
    pub missing: Vec<EtlError>,
    /// Tickers dropped because their series was malformed.
    pub excluded: Vec<EtlError>,
    /// Cells left null because a denominator was zero.
    pub invalid_cells: Vec<EtlError>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.excluded.is_empty() && self.invalid_cells.is_empty()
    }

    pub fn log_warnings(&self) {
        for err in self.missing.iter().chain(&self.excluded) {
            warn!(ticker = %err.ticker(), "{err}");
        }
        if !self.invalid_cells.is_empty() {
            warn!(
                cells = self.invalid_cells.len(),
                "Derived values left null due to zero prices"
            );
            for err in &self.invalid_cells {
                warn!(ticker = %err.ticker(), "{err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_until_anything_is_recorded() {
        let mut report = RunReport::default();
        assert!(report.is_clean());
        report.excluded.push(EtlError::malformed("AAPL", "duplicate date 2024-01-02"));
        assert!(!report.is_clean());
    }
}
