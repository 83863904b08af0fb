mod engine;
mod etl;
pub mod window;

pub use engine::{
    EnrichmentOutcome, FeatureEngine, MOMENTUM_LAG, MOVING_AVERAGE_WINDOWS, SIGNAL_WINDOW,
    SeriesFeatures, enrich_series,
};
pub use etl::{RunOutcome, RunSummary, run_etl};
