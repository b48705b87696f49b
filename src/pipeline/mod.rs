//! Per-feature fitting, aggregation, and dataset orchestration.

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod feature;
pub mod runner;

pub use aggregate::aggregate;
pub use batch::run_batch;
pub use config::{BatchManifest, DatasetEntry, RunOptions, Transformation};
pub use feature::{attempt_with_one_retry, fit_feature, FitFailure, FitOutcome};
pub use runner::{label_rows, run_dataset, PAIRWISE_PREFIX};
