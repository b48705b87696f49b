//! Per-feature zero-inflated negative binomial differential abundance testing.
//!
//! Every feature of a count table is regressed on a set of sample covariates
//! with a ZINB model. When subjects contribute several samples, the model
//! gains a per-subject random intercept. Coefficients are collected into a
//! ranked association table with Benjamini-Hochberg q-values, and many
//! datasets can be processed in parallel.
//!
//! # Overview
//!
//! - **data**: Feature tables, covariates, formulas, and result tables
//! - **model**: ZINB fixed-effects and random-intercept fits behind [`model::ModelFitter`]
//! - **correct**: Multiple testing correction (Benjamini-Hochberg)
//! - **pipeline**: Per-feature fitting, aggregation, dataset and batch runs
//!
//! # Example
//!
//! ```no_run
//! use zinb_daa::prelude::*;
//!
//! let dataset = Dataset::from_tsv_files(
//!     "cohort",
//!     "features.tsv",
//!     "metadata.tsv",
//!     "ID",
//!     None,
//! ).unwrap();
//!
//! let result = run_dataset(&dataset, &ZinbFitter::new(), &RunOptions::default(), None).unwrap();
//! result.to_tsv("associations.tsv").unwrap();
//! ```

pub mod correct;
pub mod data;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::correct::{correct_bh, PerCovariateBh, QValueAdjuster};
    pub use crate::data::{
        Association, AssociationTable, CoefficientRow, Dataset, DatasetResult, FeatureTable,
        LabeledAssociation, MetadataTable, ModelFormula, SampleSheet,
    };
    pub use crate::error::{DaaError, Result};
    pub use crate::model::{
        FeatureData, FittedModel, ModelFitter, ModelShape, ZinbConfig, ZinbFitter,
    };
    pub use crate::pipeline::{
        aggregate, run_batch, run_dataset, BatchManifest, FitFailure, FitOutcome, RunOptions,
        Transformation,
    };
}
