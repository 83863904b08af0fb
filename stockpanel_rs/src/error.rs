use chrono::NaiveDate;
use thiserror::Error;

/// Faults raised while turning ingested series into a published table.
///
/// Ingestion and sink failures travel as plain `anyhow::Error`s; these
/// variants are the per-ticker conditions callers may want to inspect
/// (via `downcast_ref::<EtlError>()`) and aggregate into a run report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EtlError {
    #[error("ingestion returned no rows for ticker {ticker}")]
    MissingTickerData { ticker: String },

    #[error("malformed series for {ticker}: {reason}")]
    MalformedSeries { ticker: String, reason: String },

    #[error("zero denominator for {ticker} on {date} while computing {column}")]
    DivisionByZeroPrice {
        ticker: String,
        date: NaiveDate,
        column: &'static str,
    },
}

impl EtlError {
    pub fn malformed(ticker: &str, reason: impl Into<String>) -> Self {
        EtlError::MalformedSeries {
            ticker: ticker.to_string(),
            reason: reason.into(),
        }
    }

    pub fn ticker(&self) -> &str {
        match self {
            EtlError::MissingTickerData { ticker }
            | EtlError::MalformedSeries { ticker, .. }
            | EtlError::DivisionByZeroPrice { ticker, .. } => ticker,
        }
    }
}
