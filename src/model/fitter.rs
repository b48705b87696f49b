//! Default [`ModelFitter`] backed by the ZINB fits in this crate.

use crate::data::formula::has_varying_values;
use crate::data::{GroupIndex, ModelFormula};
use crate::error::{DaaError, Result};
use crate::model::{
    fit_zinb_fixed, fit_zinb_mixed, FeatureData, FittedModel, ModelFitter, ModelShape, ZinbConfig,
    INTERCEPT,
};
use nalgebra::DMatrix;

/// Fits ZINB models with a `log(libSize)` offset and optional random intercept.
#[derive(Debug, Clone, Default)]
pub struct ZinbFitter {
    pub config: ZinbConfig,
}

impl ZinbFitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ZinbConfig) -> Self {
        Self { config }
    }

    /// Intercept plus one column per formula covariate, in formula order.
    fn design(
        &self,
        formula: &ModelFormula,
        data: &FeatureData<'_>,
    ) -> Result<(DMatrix<f64>, Vec<String>)> {
        let covariates = formula.covariates();
        let n = data.response.len();

        let mut columns: Vec<&[f64]> = Vec::with_capacity(covariates.len());
        for name in &covariates {
            let column = data
                .metadata
                .iter()
                .find(|(m, _)| m == name)
                .map(|(_, values)| values)
                .ok_or_else(|| DaaError::MissingColumn(name.to_string()))?;
            if column.len() != n {
                return Err(DaaError::DimensionMismatch {
                    expected: n,
                    actual: column.len(),
                });
            }
            if !has_varying_values(column) {
                return Err(DaaError::FitFailure(format!(
                    "covariate '{}' is constant",
                    name
                )));
            }
            columns.push(column);
        }

        let x = DMatrix::from_fn(n, columns.len() + 1, |i, j| {
            if j == 0 {
                1.0
            } else {
                columns[j - 1][i]
            }
        });

        let mut names = Vec::with_capacity(columns.len() + 1);
        names.push(INTERCEPT.to_string());
        names.extend(covariates.iter().map(|c| c.to_string()));

        Ok((x, names))
    }
}

impl ModelFitter for ZinbFitter {
    fn fit(
        &self,
        formula: &ModelFormula,
        data: &FeatureData<'_>,
        shape: ModelShape,
    ) -> Result<FittedModel> {
        let (x, names) = self.design(formula, data)?;

        let offset: Vec<f64> = if formula.has_offset() {
            data.lib_size.iter().map(|&l| l.ln()).collect()
        } else {
            vec![0.0; data.response.len()]
        };

        match shape {
            ModelShape::Fixed => {
                fit_zinb_fixed(data.response, &x, &names, &offset, &self.config)
                    .map(FittedModel::Fixed)
            }
            ModelShape::Mixed => {
                let groups = GroupIndex::from_ids(data.ids);
                fit_zinb_mixed(data.response, &x, &names, &offset, &groups, &self.config)
                    .map(FittedModel::Mixed)
            }
        }
    }
}
