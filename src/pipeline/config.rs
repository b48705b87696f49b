//! Run options and batch manifests.

use crate::data::Dataset;
use crate::error::{DaaError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Response transformation requested for a run.
///
/// Only `None` is accepted by the runner; ZINB models need raw counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transformation {
    #[default]
    None,
    Log,
    Logit,
    Ast,
}

impl FromStr for Transformation {
    type Err = DaaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Transformation::None),
            "LOG" => Ok(Transformation::Log),
            "LOGIT" => Ok(Transformation::Logit),
            "AST" => Ok(Transformation::Ast),
            other => Err(DaaError::InvalidParameter(format!(
                "unknown transformation '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Transformation::None => "NONE",
            Transformation::Log => "LOG",
            Transformation::Logit => "LOGIT",
            Transformation::Ast => "AST",
        };
        write!(f, "{}", name)
    }
}

/// Options for a dataset run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Response transformation; must be `NONE`.
    pub transformation: Transformation,
    /// Use the pooled q-value procedure instead of plain BH.
    pub multiple_qvalues: bool,
    /// Marker identifying planted true-positive features and covariates.
    pub true_positive_suffix: String,
    /// Fit features in parallel within a dataset.
    pub parallel_features: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            transformation: Transformation::None,
            multiple_qvalues: false,
            true_positive_suffix: "_TP".to_string(),
            parallel_features: true,
        }
    }
}

impl RunOptions {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(DaaError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(DaaError::from)
    }
}

/// One dataset entry of a batch manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub name: String,
    /// Feature table TSV (features as rows).
    pub features: PathBuf,
    /// Sample sheet TSV.
    pub metadata: PathBuf,
    /// Sample sheet column holding subject IDs.
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Covariates to test; every other column when absent.
    #[serde(default)]
    pub covariates: Option<Vec<String>>,
}

fn default_id_column() -> String {
    "ID".to_string()
}

impl DatasetEntry {
    /// Load the dataset, resolving relative paths against `base`.
    pub fn load(&self, base: &Path) -> Result<Dataset> {
        Dataset::from_tsv_files(
            self.name.clone(),
            base.join(&self.features),
            base.join(&self.metadata),
            &self.id_column,
            self.covariates.as_deref(),
        )
    }
}

/// YAML manifest listing the datasets of a batch run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchManifest {
    #[serde(default)]
    pub options: RunOptions,
    pub datasets: Vec<DatasetEntry>,
}

impl BatchManifest {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(DaaError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = RunOptions::default();
        assert_eq!(options.transformation, Transformation::None);
        assert!(!options.multiple_qvalues);
        assert_eq!(options.true_positive_suffix, "_TP");
        assert!(options.parallel_features);
    }

    #[test]
    fn test_options_yaml_partial() {
        let options = RunOptions::from_yaml("transformation: LOG\nmultiple_qvalues: true\n").unwrap();
        assert_eq!(options.transformation, Transformation::Log);
        assert!(options.multiple_qvalues);
        assert_eq!(options.true_positive_suffix, "_TP");
    }

    #[test]
    fn test_options_yaml_roundtrip() {
        let options = RunOptions {
            true_positive_suffix: "_planted".to_string(),
            ..RunOptions::default()
        };
        let yaml = options.to_yaml().unwrap();
        assert_eq!(RunOptions::from_yaml(&yaml).unwrap(), options);
    }

    #[test]
    fn test_transformation_from_str() {
        assert_eq!("none".parse::<Transformation>().unwrap(), Transformation::None);
        assert_eq!("AST".parse::<Transformation>().unwrap(), Transformation::Ast);
        assert!("sqrt".parse::<Transformation>().is_err());
        assert_eq!(Transformation::Logit.to_string(), "LOGIT");
    }

    #[test]
    fn test_manifest_yaml() {
        let yaml = r#"
options:
  parallel_features: false
datasets:
  - name: cohort_a
    features: a/features.tsv
    metadata: a/metadata.tsv
  - name: cohort_b
    features: b/features.tsv
    metadata: b/metadata.tsv
    id_column: subject
    covariates: [group]
"#;
        let manifest = BatchManifest::from_yaml(yaml).unwrap();
        assert!(!manifest.options.parallel_features);
        assert_eq!(manifest.datasets.len(), 2);
        assert_eq!(manifest.datasets[0].id_column, "ID");
        assert_eq!(manifest.datasets[1].id_column, "subject");
        assert_eq!(
            manifest.datasets[1].covariates.as_deref(),
            Some(&["group".to_string()][..])
        );
    }
}
