//! Feature abundance table: one column of counts per feature.

use crate::error::{DaaError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Dense feature table storing counts as one vector per feature.
///
/// Each feature is an independent modeling target. Feature order is preserved
/// from construction through to the association table.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Sample identifiers, shared by every column.
    sample_ids: Vec<String>,
    /// Feature names in input order.
    feature_names: Vec<String>,
    /// Counts per feature, each of length `n_samples`.
    columns: Vec<Vec<f64>>,
}

impl FeatureTable {
    /// Create a feature table from named columns.
    pub fn new(
        sample_ids: Vec<String>,
        feature_names: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if feature_names.len() != columns.len() {
            return Err(DaaError::DimensionMismatch {
                expected: feature_names.len(),
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
            feature_names,
            columns,
        })
    }

    /// Load a feature table from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with sample IDs (first column is the feature ID header)
    /// - Subsequent rows: feature ID followed by non-negative counts
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| DaaError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(DaaError::EmptyData(
                "TSV must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();
        let n_samples = sample_ids.len();

        let mut feature_names = Vec::new();
        let mut columns = Vec::new();

        for (row_idx, line_result) in lines.enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != n_samples + 1 {
                return Err(DaaError::DimensionMismatch {
                    expected: n_samples + 1,
                    actual: fields.len(),
                });
            }

            let values = fields[1..]
                .iter()
                .enumerate()
                .map(|(col_idx, value_str)| {
                    let value: f64 = value_str.trim().parse().map_err(|_| DaaError::InvalidCount {
                        value: value_str.to_string(),
                        row: row_idx,
                        col: col_idx,
                    })?;
                    if value < 0.0 || !value.is_finite() {
                        return Err(DaaError::InvalidCount {
                            value: value_str.to_string(),
                            row: row_idx,
                            col: col_idx,
                        });
                    }
                    Ok(value)
                })
                .collect::<Result<Vec<f64>>>()?;

            feature_names.push(fields[0].trim().to_string());
            columns.push(values);
        }

        if feature_names.is_empty() {
            return Err(DaaError::EmptyData("No features in TSV".to_string()));
        }

        Self::new(sample_ids, feature_names, columns)
    }

    /// Number of features.
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Feature names in order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Sample identifiers.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Counts for the feature at `index`.
    pub fn column(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    /// Counts for a feature looked up by name.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        let idx = self.feature_names.iter().position(|f| f == name)?;
        Some(&self.columns[idx])
    }

    /// Iterate over `(name, counts)` pairs in feature order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.feature_names
            .iter()
            .zip(self.columns.iter())
            .map(|(name, col)| (name.as_str(), col.as_slice()))
    }

    /// Total counts per sample (library sizes).
    pub fn sample_totals(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_samples()];
        for column in &self.columns {
            for (total, value) in totals.iter_mut().zip(column.iter()) {
                *total += value;
            }
        }
        totals
    }

    /// Reorder samples to match `order`, failing if any sample is unknown.
    pub fn align_samples(&self, order: &[String]) -> Result<Self> {
        let positions = order
            .iter()
            .map(|id| {
                self.sample_ids
                    .iter()
                    .position(|s| s == id)
                    .ok_or_else(|| DaaError::SampleMismatch(format!(
                        "sample '{}' not found in feature table",
                        id
                    )))
            })
            .collect::<Result<Vec<usize>>>()?;

        let columns = self
            .columns
            .iter()
            .map(|col| positions.iter().map(|&p| col[p]).collect())
            .collect();

        Self::new(order.to_vec(), self.feature_names.clone(), columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_tsv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "feature_id\tS1\tS2\tS3").unwrap();
        writeln!(file, "taxon_a\t10\t0\t5").unwrap();
        writeln!(file, "taxon_b\t0\t20\t1").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_from_tsv() {
        let file = create_test_tsv();
        let table = FeatureTable::from_tsv(file.path()).unwrap();

        assert_eq!(table.n_features(), 2);
        assert_eq!(table.n_samples(), 3);
        assert_eq!(table.feature_names(), &["taxon_a", "taxon_b"]);
        assert_eq!(table.column(0), &[10.0, 0.0, 5.0]);
        assert_eq!(table.get("taxon_b").unwrap(), &[0.0, 20.0, 1.0]);
    }

    #[test]
    fn test_sample_totals() {
        let file = create_test_tsv();
        let table = FeatureTable::from_tsv(file.path()).unwrap();
        assert_eq!(table.sample_totals(), vec![10.0, 20.0, 6.0]);
    }

    #[test]
    fn test_invalid_count() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "feature_id\tS1\tS2").unwrap();
        writeln!(file, "taxon_a\t1\tabc").unwrap();
        file.flush().unwrap();

        let result = FeatureTable::from_tsv(file.path());
        assert!(matches!(result, Err(DaaError::InvalidCount { .. })));
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "feature_id\tS1\tS2").unwrap();
        writeln!(file, "taxon_a\t1\t-3").unwrap();
        file.flush().unwrap();

        assert!(FeatureTable::from_tsv(file.path()).is_err());
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let result = FeatureTable::new(
            vec!["S1".into(), "S2".into()],
            vec!["a".into()],
            vec![vec![1.0, 2.0, 3.0]],
        );
        assert!(matches!(result, Err(DaaError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_align_samples() {
        let file = create_test_tsv();
        let table = FeatureTable::from_tsv(file.path()).unwrap();
        let order = vec!["S3".to_string(), "S1".to_string(), "S2".to_string()];

        let aligned = table.align_samples(&order).unwrap();
        assert_eq!(aligned.sample_ids(), order.as_slice());
        assert_eq!(aligned.column(0), &[5.0, 10.0, 0.0]);

        let missing = vec!["S9".to_string()];
        assert!(table.align_samples(&missing).is_err());
    }
}
