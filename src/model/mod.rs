//! Count models for per-feature association testing.
//!
//! Two fitted-model shapes exist: a fixed-effects ZINB fit, whose count
//! component carries a `Log(theta)` row next to the regression coefficients,
//! and a random-intercept ZINB fit exposing a conditional component. Both are
//! wrapped in [`FittedModel`] so callers extract coefficients uniformly.

pub mod fitter;
pub mod glmm;
pub mod zinb;

use crate::data::formula::has_repeated_ids;
use crate::data::{MetadataTable, ModelFormula};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

pub use fitter::ZinbFitter;
pub use glmm::{fit_zinb_mixed, ZinbMixedFit};
pub use zinb::{fit_zinb_fixed, ZinbConfig, ZinbFixedFit};

/// Name of the intercept row in coefficient tables.
pub const INTERCEPT: &str = "(Intercept)";

/// Name of the dispersion row in the fixed-effects count table.
pub const LOG_THETA: &str = "Log(theta)";

/// Which model family a feature is fitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelShape {
    /// Zero-inflated NB with fixed effects only.
    Fixed,
    /// Zero-inflated NB with a random intercept per subject.
    Mixed,
}

impl ModelShape {
    /// Fixed when every sample is its own unit, mixed otherwise.
    pub fn from_ids(ids: &[String]) -> Self {
        if has_repeated_ids(ids) {
            ModelShape::Mixed
        } else {
            ModelShape::Fixed
        }
    }
}

impl std::fmt::Display for ModelShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelShape::Fixed => write!(f, "fixed"),
            ModelShape::Mixed => write!(f, "mixed"),
        }
    }
}

/// One row of a model's coefficient summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientEntry {
    /// Term name.
    pub term: String,
    /// Point estimate.
    pub estimate: f64,
    /// Standard error.
    pub std_error: f64,
    /// Wald z statistic.
    pub statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

impl CoefficientEntry {
    /// Build a row with a Wald z-test against the standard normal.
    pub fn wald(term: &str, estimate: f64, std_error: f64) -> Self {
        let statistic = if std_error > 0.0 && std_error.is_finite() {
            estimate / std_error
        } else {
            f64::NAN
        };
        let p_value = if statistic.is_finite() {
            erfc(statistic.abs() / std::f64::consts::SQRT_2)
        } else {
            f64::NAN
        };
        Self {
            term: term.to_string(),
            estimate,
            std_error,
            statistic,
            p_value,
        }
    }
}

/// Coefficient summary of one model component.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoefficientTable {
    pub rows: Vec<CoefficientEntry>,
}

impl CoefficientTable {
    /// Look up a row by term name.
    pub fn get(&self, term: &str) -> Option<&CoefficientEntry> {
        self.rows.iter().find(|r| r.term == term)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A fitted model of either shape.
#[derive(Debug, Clone)]
pub enum FittedModel {
    Fixed(ZinbFixedFit),
    Mixed(ZinbMixedFit),
}

impl FittedModel {
    /// Shape of the fitted model.
    pub fn shape(&self) -> ModelShape {
        match self {
            FittedModel::Fixed(_) => ModelShape::Fixed,
            FittedModel::Mixed(_) => ModelShape::Mixed,
        }
    }

    /// Covariate rows of the count (conditional) component.
    ///
    /// The intercept is excluded, as are the dispersion row and every
    /// zero-inflation row of the fixed-effects fit.
    pub fn covariate_block(&self) -> Vec<&CoefficientEntry> {
        match self {
            FittedModel::Fixed(fit) => fit
                .count
                .rows
                .iter()
                .filter(|r| r.term != INTERCEPT && r.term != LOG_THETA)
                .collect(),
            FittedModel::Mixed(fit) => fit
                .conditional
                .rows
                .iter()
                .filter(|r| r.term != INTERCEPT)
                .collect(),
        }
    }
}

/// Per-feature working dataset handed to a fitter.
#[derive(Debug, Clone, Copy)]
pub struct FeatureData<'a> {
    /// Counts for this feature.
    pub response: &'a [f64],
    /// Covariates.
    pub metadata: &'a MetadataTable,
    /// Library size per sample.
    pub lib_size: &'a [f64],
    /// Subject ID per sample.
    pub ids: &'a [String],
}

/// Capability to fit one feature's count model.
///
/// Implementations must be shareable across worker threads.
pub trait ModelFitter: Sync {
    /// Fit `formula` to `data` with the requested model shape.
    fn fit(
        &self,
        formula: &ModelFormula,
        data: &FeatureData<'_>,
        shape: ModelShape,
    ) -> Result<FittedModel>;
}
