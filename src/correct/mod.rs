//! Multiple testing correction.

pub mod bh;

use crate::data::{Association, CoefficientRow, FeatureTable, MetadataTable};
use crate::error::Result;

pub use bh::{correct_bh, PerCovariateBh};

/// Pooled q-value procedure used when a dataset has several covariates.
///
/// Receives the stacked coefficient rows together with the original feature
/// and covariate tables, and returns the same rows, in the same order, with
/// `qval_bh` filled in.
pub trait QValueAdjuster: Sync {
    fn adjust(
        &self,
        features: &FeatureTable,
        metadata: &MetadataTable,
        rows: Vec<CoefficientRow>,
    ) -> Result<Vec<Association>>;
}
