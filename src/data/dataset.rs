//! A ready-to-model dataset: features, covariates, library sizes, and IDs.

use crate::data::formula::has_varying_values;
use crate::data::{FeatureTable, MetadataTable, SampleSheet};
use crate::error::{DaaError, Result};
use std::path::Path;

/// One dataset supplied to the runner.
///
/// All vectors are indexed by sample in the same order.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Label carried into the batch output.
    pub name: String,
    /// Per-feature counts.
    pub features: FeatureTable,
    /// Numeric covariates used jointly as regressors.
    pub metadata: MetadataTable,
    /// Library size per sample.
    pub lib_size: Vec<f64>,
    /// Subject identifier per sample.
    pub ids: Vec<String>,
}

impl Dataset {
    /// Assemble a dataset from its parts.
    pub fn new(
        name: impl Into<String>,
        features: FeatureTable,
        metadata: MetadataTable,
        lib_size: Vec<f64>,
        ids: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            features,
            metadata,
            lib_size,
            ids,
        }
    }

    /// Load a dataset from a feature TSV and a sample sheet TSV.
    ///
    /// Library sizes are the per-sample totals of the feature table. When
    /// `covariates` is `None`, every sample sheet column except `id_column`
    /// is used.
    pub fn from_tsv_files<P: AsRef<Path>, Q: AsRef<Path>>(
        name: impl Into<String>,
        features_path: P,
        metadata_path: Q,
        id_column: &str,
        covariates: Option<&[String]>,
    ) -> Result<Self> {
        let sheet = SampleSheet::from_tsv(metadata_path)?;
        let features = FeatureTable::from_tsv(features_path)?.align_samples(sheet.sample_ids())?;

        let covariate_names: Vec<String> = match covariates {
            Some(names) => names.to_vec(),
            None => sheet
                .column_names()
                .iter()
                .filter(|c| c.as_str() != id_column)
                .cloned()
                .collect(),
        };

        let metadata = sheet.covariates(&covariate_names)?;
        let ids = sheet.ids(id_column)?;
        let lib_size = features.sample_totals();

        Ok(Self::new(name, features, metadata, lib_size, ids))
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.features.n_samples()
    }

    /// Check that the dataset can be modeled.
    pub fn validate(&self) -> Result<()> {
        if self.features.n_features() == 0 {
            return Err(DaaError::EmptyData(format!(
                "dataset '{}' has no features",
                self.name
            )));
        }
        if self.metadata.n_covariates() == 0 {
            return Err(DaaError::EmptyData(format!(
                "dataset '{}' has no covariates",
                self.name
            )));
        }

        let n = self.n_samples();
        for actual in [self.metadata.n_samples(), self.lib_size.len(), self.ids.len()] {
            if actual != n {
                return Err(DaaError::DimensionMismatch {
                    expected: n,
                    actual,
                });
            }
        }

        if has_varying_values(&self.lib_size)
            && self.lib_size.iter().any(|&s| !(s > 0.0 && s.is_finite()))
        {
            return Err(DaaError::InvalidParameter(format!(
                "dataset '{}' has non-positive library sizes, cannot use a log offset",
                self.name
            )));
        }

        Ok(())
    }
}
