//! Fitting one feature: shape decision, retry, coefficient extraction.
//!
//! A feature never fails the dataset. Whatever happens inside the fitter, the
//! feature contributes one row per covariate; rows of a failed fit carry NA
//! statistics.

use crate::data::{CoefficientRow, Dataset, ModelFormula};
use crate::error::{DaaError, Result};
use crate::model::{FeatureData, FittedModel, ModelFitter, ModelShape};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Why a feature produced NA rows.
#[derive(Debug, Clone, PartialEq)]
pub enum FitFailure {
    /// The fitter returned an error on both attempts.
    Numerical(String),
    /// The fit succeeded but its covariate block has the wrong length.
    Structural { expected: usize, actual: usize },
}

impl std::fmt::Display for FitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitFailure::Numerical(msg) => write!(f, "fit failed twice: {}", msg),
            FitFailure::Structural { expected, actual } => write!(
                f,
                "coefficient block has {} rows, expected {}",
                actual, expected
            ),
        }
    }
}

/// Result of fitting a single feature.
#[derive(Debug)]
pub enum FitOutcome {
    Success(FittedModel),
    Failed(FitFailure),
}

/// Run `attempt`, and run it once more if the first call errors.
///
/// A panicking attempt counts as an error.
pub fn attempt_with_one_retry<F>(mut attempt: F) -> FitOutcome
where
    F: FnMut() -> Result<FittedModel>,
{
    match guarded(&mut attempt) {
        Ok(model) => FitOutcome::Success(model),
        Err(first) => {
            log::debug!("retrying fit after error: {}", first);
            match guarded(&mut attempt) {
                Ok(model) => FitOutcome::Success(model),
                Err(second) => FitOutcome::Failed(FitFailure::Numerical(second.to_string())),
            }
        }
    }
}

fn guarded<F>(attempt: &mut F) -> Result<FittedModel>
where
    F: FnMut() -> Result<FittedModel>,
{
    catch_unwind(AssertUnwindSafe(|| attempt())).unwrap_or_else(|payload| {
        Err(DaaError::FitFailure(format!(
            "fitter panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Map a fitted model's covariate block onto coefficient rows.
fn extract_rows(
    model: &FittedModel,
    feature: &str,
    covariates: &[String],
) -> std::result::Result<Vec<CoefficientRow>, FitFailure> {
    let block = model.covariate_block();
    if block.len() != covariates.len() {
        return Err(FitFailure::Structural {
            expected: covariates.len(),
            actual: block.len(),
        });
    }

    Ok(block
        .iter()
        .zip(covariates.iter())
        .map(|(entry, covariate)| CoefficientRow {
            feature: feature.to_string(),
            metadata: covariate.clone(),
            coef: entry.estimate,
            stderr: entry.std_error,
            pval: entry.p_value,
        })
        .collect())
}

/// Fit one feature and return exactly one row per covariate.
///
/// # Arguments
/// * `fitter` - Model fitting capability
/// * `index` - 1-based feature position, used in log messages
/// * `name` - Feature name
/// * `values` - Counts for this feature
/// * `dataset` - Dataset supplying covariates, library sizes and IDs
pub fn fit_feature(
    fitter: &dyn ModelFitter,
    index: usize,
    name: &str,
    values: &[f64],
    dataset: &Dataset,
) -> Vec<CoefficientRow> {
    let covariates = dataset.metadata.names();

    let data = FeatureData {
        response: values,
        metadata: &dataset.metadata,
        lib_size: &dataset.lib_size,
        ids: &dataset.ids,
    };
    let formula = ModelFormula::build(covariates, &dataset.lib_size, &dataset.ids);
    let shape = ModelShape::from_ids(&dataset.ids);

    let failure = match attempt_with_one_retry(|| fitter.fit(&formula, &data, shape)) {
        FitOutcome::Success(model) => match extract_rows(&model, name, covariates) {
            Ok(rows) => return rows,
            Err(structural) => structural,
        },
        FitOutcome::Failed(numerical) => numerical,
    };

    match &failure {
        FitFailure::Numerical(_) => {
            log::warn!(
                "Dataset '{}': fitting problem for feature {} ({}): {}",
                dataset.name,
                index,
                name,
                failure
            )
        }
        FitFailure::Structural { .. } => log::warn!(
            "Dataset '{}': unexpected model output for feature {} ({}): {}",
            dataset.name,
            index,
            name,
            failure
        ),
    }

    covariates
        .iter()
        .map(|covariate| CoefficientRow::missing(name, covariate))
        .collect()
}
