//! Running many datasets in parallel.

use crate::correct::QValueAdjuster;
use crate::data::{Dataset, DatasetResult};
use crate::model::ModelFitter;
use crate::pipeline::config::RunOptions;
use crate::pipeline::feature::panic_message;
use crate::pipeline::runner::run_dataset;
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run every dataset independently and keep the ones that succeed.
///
/// A dataset that returns an error or panics is dropped with a warning;
/// the others are unaffected. Surviving results keep input order.
pub fn run_batch(
    datasets: &[Dataset],
    fitter: &dyn ModelFitter,
    options: &RunOptions,
    adjuster: Option<&dyn QValueAdjuster>,
) -> Vec<DatasetResult> {
    log::info!("Running batch of {} datasets", datasets.len());

    let results: Vec<DatasetResult> = datasets
        .par_iter()
        .filter_map(|dataset| {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| run_dataset(dataset, fitter, options, adjuster)));
            match outcome {
                Ok(Ok(result)) => Some(result),
                Ok(Err(e)) => {
                    log::warn!("Dropping dataset '{}': {}", dataset.name, e);
                    None
                }
                Err(payload) => {
                    log::warn!(
                        "Dropping dataset '{}': panicked: {}",
                        dataset.name,
                        panic_message(payload.as_ref())
                    );
                    None
                }
            }
        })
        .collect();

    log::info!(
        "Batch finished: {} of {} datasets succeeded",
        results.len(),
        datasets.len()
    );

    results
}
