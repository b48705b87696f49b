//! Sample metadata: raw sample sheets and the numeric covariate table.

use crate::error::{DaaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A raw metadata value as read from a sample sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with a string level.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Render the value as a grouping label.
    pub fn label(&self) -> Option<String> {
        match self {
            Variable::Categorical(s) => Some(s.clone()),
            Variable::Continuous(x) => Some(x.to_string()),
            Variable::Missing => None,
        }
    }
}

fn is_missing_token(raw: &str) -> bool {
    raw.is_empty() || raw == "NA" || raw == "na"
}

/// Sample sheet as loaded from disk, before covariates are chosen.
///
/// Columns are inferred as continuous if every non-missing value parses as a
/// number, otherwise categorical.
#[derive(Debug, Clone)]
pub struct SampleSheet {
    sample_ids: Vec<String>,
    column_names: Vec<String>,
    /// Column-major values: `columns[c][s]`.
    columns: Vec<Vec<Variable>>,
}

impl SampleSheet {
    /// Load a sample sheet from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with column names (first column is sample ID)
    /// - Subsequent rows: sample ID followed by variable values
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| DaaError::EmptyData("Empty metadata file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(DaaError::EmptyData(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();

        let mut sample_ids = Vec::new();
        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            sample_ids.push(fields[0].trim().to_string());
            raw_rows.push(fields[1..].iter().map(|s| s.trim().to_string()).collect());
        }

        if sample_ids.is_empty() {
            return Err(DaaError::EmptyData("No samples in metadata".to_string()));
        }

        let columns = (0..column_names.len())
            .map(|col_idx| {
                let raw: Vec<&str> = raw_rows
                    .iter()
                    .map(|row| row.get(col_idx).map(String::as_str).unwrap_or(""))
                    .collect();
                let all_numeric = raw
                    .iter()
                    .all(|v| is_missing_token(v) || v.parse::<f64>().is_ok());
                raw.iter()
                    .map(|v| {
                        if is_missing_token(v) {
                            Variable::Missing
                        } else if all_numeric {
                            v.parse::<f64>()
                                .map(Variable::Continuous)
                                .unwrap_or(Variable::Missing)
                        } else {
                            Variable::Categorical(v.to_string())
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            sample_ids,
            column_names,
            columns,
        })
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Get all values for a column.
    pub fn column(&self, column: &str) -> Result<&[Variable]> {
        let idx = self
            .column_names
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| DaaError::MissingColumn(column.to_string()))?;
        Ok(&self.columns[idx])
    }

    /// Extract a grouping column as string labels.
    pub fn ids(&self, column: &str) -> Result<Vec<String>> {
        self.column(column)?
            .iter()
            .map(|v| {
                v.label().ok_or_else(|| {
                    DaaError::InvalidParameter(format!(
                        "Missing values not allowed in grouping variable '{}'",
                        column
                    ))
                })
            })
            .collect()
    }

    /// Build the numeric covariate table from the named columns.
    ///
    /// Continuous columns are used as-is. Two-level categorical columns are
    /// coded 0/1 against the alphabetically first level. Missing values and
    /// categorical columns with any other number of levels are rejected.
    pub fn covariates(&self, names: &[String]) -> Result<MetadataTable> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let values = self.column(name)?;
            if values.iter().any(Variable::is_missing) {
                return Err(DaaError::InvalidVariableType {
                    column: name.clone(),
                    reason: "missing values are not supported in covariates".to_string(),
                });
            }

            let levels: BTreeSet<&str> = values
                .iter()
                .filter_map(|v| match v {
                    Variable::Categorical(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect();

            let column: Vec<f64> = if levels.is_empty() {
                values
                    .iter()
                    .map(|v| match v {
                        Variable::Continuous(x) => *x,
                        _ => f64::NAN,
                    })
                    .collect()
            } else if levels.len() == 2 {
                let reference = levels.iter().next().copied().unwrap_or_default();
                values
                    .iter()
                    .map(|v| match v {
                        Variable::Categorical(s) if s != reference => 1.0,
                        _ => 0.0,
                    })
                    .collect()
            } else {
                return Err(DaaError::InvalidVariableType {
                    column: name.clone(),
                    reason: format!(
                        "categorical covariates must have exactly two levels, found {}",
                        levels.len()
                    ),
                });
            };
            columns.push(column);
        }

        MetadataTable::new(self.sample_ids.clone(), names.to_vec(), columns)
    }
}

/// Numeric covariate table used jointly as regressors.
///
/// Each covariate contributes exactly one coefficient per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTable {
    sample_ids: Vec<String>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl MetadataTable {
    /// Create a covariate table from named numeric columns.
    pub fn new(sample_ids: Vec<String>, names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(DaaError::DimensionMismatch {
                expected: names.len(),
                actual: columns.len(),
            });
        }
        for column in &columns {
            if column.len() != sample_ids.len() {
                return Err(DaaError::DimensionMismatch {
                    expected: sample_ids.len(),
                    actual: column.len(),
                });
            }
        }
        Ok(Self {
            sample_ids,
            names,
            columns,
        })
    }

    /// Covariate names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Sample IDs.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Number of covariates.
    pub fn n_covariates(&self) -> usize {
        self.names.len()
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Values of the covariate at `index`.
    pub fn column(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    /// Iterate over `(name, values)` pairs in covariate order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .zip(self.columns.iter())
            .map(|(name, col)| (name.as_str(), col.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_sheet() -> SampleSheet {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tgroup\tage\tsubject\tsite").unwrap();
        writeln!(file, "S1\tcontrol\t30\tA\tgut").unwrap();
        writeln!(file, "S2\ttreatment\t45\tA\toral").unwrap();
        writeln!(file, "S3\tcontrol\t28\tB\tskin").unwrap();
        writeln!(file, "S4\ttreatment\tNA\tB\tgut").unwrap();
        file.flush().unwrap();
        SampleSheet::from_tsv(file.path()).unwrap()
    }

    #[test]
    fn test_sheet_type_inference() {
        let sheet = create_test_sheet();
        assert_eq!(sheet.sample_ids().len(), 4);
        assert_eq!(sheet.column_names(), &["group", "age", "subject", "site"]);
        assert_eq!(sheet.column("age").unwrap()[0], Variable::Continuous(30.0));
        assert!(sheet.column("age").unwrap()[3].is_missing());
        assert_eq!(
            sheet.column("group").unwrap()[1],
            Variable::Categorical("treatment".to_string())
        );
    }

    #[test]
    fn test_binary_covariate_coding() {
        let sheet = create_test_sheet();
        let table = sheet.covariates(&["group".to_string()]).unwrap();
        assert_eq!(table.n_covariates(), 1);
        assert_eq!(table.column(0), &[0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_ids() {
        let sheet = create_test_sheet();
        let ids = sheet.ids("subject").unwrap();
        assert_eq!(ids, vec!["A", "A", "B", "B"]);
    }

    #[test]
    fn test_missing_covariate_rejected() {
        let sheet = create_test_sheet();
        let result = sheet.covariates(&["age".to_string()]);
        assert!(matches!(result, Err(DaaError::InvalidVariableType { .. })));
    }

    #[test]
    fn test_multilevel_categorical_rejected() {
        let sheet = create_test_sheet();
        let result = sheet.covariates(&["site".to_string()]);
        assert!(matches!(result, Err(DaaError::InvalidVariableType { .. })));
    }

    #[test]
    fn test_unknown_column() {
        let sheet = create_test_sheet();
        assert!(matches!(
            sheet.covariates(&["dose".to_string()]),
            Err(DaaError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_table_dimension_check() {
        let result = MetadataTable::new(
            vec!["S1".into(), "S2".into()],
            vec!["x".into()],
            vec![vec![1.0]],
        );
        assert!(result.is_err());
    }
}
