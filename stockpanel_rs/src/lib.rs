pub mod config;
pub mod context;
pub mod dashboard;
pub mod enriched;
pub mod error;
pub mod frame;
pub mod guard;
pub mod ingest;
pub mod panel;
pub mod report;
pub mod storage;
pub mod universe;

pub use config::{DEFAULT_OUTPUT_PATH, DateRange, EtlConfig};
pub use context::ComputeContext;
pub use dashboard::{DashboardTable, Kpi};
pub use enriched::{ENRICHED_COLUMNS, EnrichedPanel, EnrichedRow};
pub use error::EtlError;
pub use guard::{DailyRunGuard, GuardDecision, RunMarker};
pub use ingest::{CsvDirectorySource, InMemorySource, SeriesSource, fetch_all};
pub use panel::{PanelBuilder, PriceBar, PricePanel, TickerSeries};
pub use report::RunReport;
pub use storage::{ParquetSink, PublishReceipt, TableSink, read_published};
