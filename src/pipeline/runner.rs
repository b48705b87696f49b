//! Running one dataset end to end.

use crate::correct::QValueAdjuster;
use crate::data::{AssociationTable, CoefficientRow, Dataset, DatasetResult, LabeledAssociation};
use crate::error::{DaaError, Result};
use crate::model::ModelFitter;
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::config::{RunOptions, Transformation};
use crate::pipeline::feature::fit_feature;
use rayon::prelude::*;
use std::time::Instant;

/// Prefix of the per-row identifier.
pub const PAIRWISE_PREFIX: &str = "pairwiseAssociation";

/// Fit every feature of `dataset` and return the ranked, labeled table.
///
/// Rejects any transformation other than `NONE` before fitting. Feature
/// failures become NA rows; only configuration and validation problems are
/// returned as errors.
pub fn run_dataset(
    dataset: &Dataset,
    fitter: &dyn ModelFitter,
    options: &RunOptions,
    adjuster: Option<&dyn QValueAdjuster>,
) -> Result<DatasetResult> {
    if options.transformation != Transformation::None {
        return Err(DaaError::UnsupportedTransformation(
            options.transformation.to_string(),
        ));
    }
    dataset.validate()?;

    log::info!(
        "Dataset '{}': fitting {} features against {} covariates on {} samples",
        dataset.name,
        dataset.features.n_features(),
        dataset.metadata.n_covariates(),
        dataset.n_samples()
    );

    let start = Instant::now();

    let per_feature: Vec<Vec<CoefficientRow>> = if options.parallel_features {
        dataset
            .features
            .feature_names()
            .par_iter()
            .enumerate()
            .map(|(i, name)| fit_feature(fitter, i + 1, name, dataset.features.column(i), dataset))
            .collect()
    } else {
        dataset
            .features
            .iter()
            .enumerate()
            .map(|(i, (name, values))| fit_feature(fitter, i + 1, name, values, dataset))
            .collect()
    };
    let rows: Vec<CoefficientRow> = per_feature.into_iter().flatten().collect();

    let table = aggregate(
        rows,
        &dataset.features,
        &dataset.metadata,
        options.multiple_qvalues,
        adjuster,
    )?;

    let time = round_minutes(start.elapsed().as_secs_f64() / 60.0);
    let result = DatasetResult {
        name: dataset.name.clone(),
        rows: label_rows(table, &options.true_positive_suffix),
        time,
    };

    log::info!(
        "Dataset '{}': {} associations, {} failed, {} minutes",
        result.name,
        result.len(),
        result.n_missing(),
        result.time
    );

    Ok(result)
}

/// Number `pairwiseAssociation1..N` in ranked order, suffixing rows whose
/// feature and covariate both carry the true-positive marker.
pub fn label_rows(table: AssociationTable, suffix: &str) -> Vec<LabeledAssociation> {
    table
        .rows
        .into_iter()
        .enumerate()
        .map(|(i, association)| {
            let planted = !suffix.is_empty()
                && association.feature.ends_with(suffix)
                && association.metadata.ends_with(suffix);
            let pairwise_association = if planted {
                format!("{}{}{}", PAIRWISE_PREFIX, i + 1, suffix)
            } else {
                format!("{}{}", PAIRWISE_PREFIX, i + 1)
            };
            LabeledAssociation {
                pairwise_association,
                association,
            }
        })
        .collect()
}

fn round_minutes(minutes: f64) -> f64 {
    (minutes * 1000.0).round() / 1000.0
}
