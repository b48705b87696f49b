//! Result types for per-feature association testing.
//!
//! Missing values (failed fits, untestable coefficients) are stored as
//! `f64::NAN` and written as `NA`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One (feature, covariate) coefficient from a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    /// Feature name.
    pub feature: String,
    /// Covariate name.
    pub metadata: String,
    /// Estimated coefficient (log scale).
    pub coef: f64,
    /// Standard error of the estimate.
    pub stderr: f64,
    /// Two-sided p-value.
    pub pval: f64,
}

impl CoefficientRow {
    /// Row with every statistic missing.
    pub fn missing(feature: &str, metadata: &str) -> Self {
        Self {
            feature: feature.to_string(),
            metadata: metadata.to_string(),
            coef: f64::NAN,
            stderr: f64::NAN,
            pval: f64::NAN,
        }
    }

    /// Attach a q-value.
    pub fn with_qvalue(self, qval_bh: f64) -> Association {
        Association {
            feature: self.feature,
            metadata: self.metadata,
            coef: self.coef,
            stderr: self.stderr,
            pval: self.pval,
            qval_bh,
        }
    }
}

/// A coefficient row augmented with its adjusted p-value.
///
/// Field order is the output column order: `feature` and `metadata` lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub feature: String,
    pub metadata: String,
    pub coef: f64,
    pub stderr: f64,
    pub pval: f64,
    #[serde(rename = "qval_BH")]
    pub qval_bh: f64,
}

impl Association {
    /// Drop the q-value, recovering the coefficient row.
    pub fn coefficients(&self) -> CoefficientRow {
        CoefficientRow {
            feature: self.feature.clone(),
            metadata: self.metadata.clone(),
            coef: self.coef,
            stderr: self.stderr,
            pval: self.pval,
        }
    }

    /// Check if significant at a threshold. NA is never significant.
    pub fn is_significant_at(&self, alpha: f64) -> bool {
        self.qval_bh < alpha
    }
}

/// Ranked association table for one dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssociationTable {
    pub rows: Vec<Association>,
}

impl AssociationTable {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over rows.
    pub fn iter(&self) -> impl Iterator<Item = &Association> {
        self.rows.iter()
    }

    /// Strip q-values, for re-aggregation.
    pub fn coefficient_rows(&self) -> Vec<CoefficientRow> {
        self.rows.iter().map(Association::coefficients).collect()
    }
}

/// An association with its dataset-relative identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledAssociation {
    /// `pairwiseAssociationK`, optionally with the true-positive suffix.
    #[serde(rename = "pairwiseAssociation")]
    pub pairwise_association: String,
    #[serde(flatten)]
    pub association: Association,
}

/// Output of one dataset run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetResult {
    /// Dataset label.
    pub name: String,
    /// Ranked, labeled rows.
    pub rows: Vec<LabeledAssociation>,
    /// Elapsed fitting time in minutes, rounded to 3 decimals.
    pub time: f64,
}

impl DatasetResult {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count rows significant at `alpha`.
    pub fn n_significant(&self, alpha: f64) -> usize {
        self.rows
            .iter()
            .filter(|r| r.association.is_significant_at(alpha))
            .count()
    }

    /// Count rows whose fit failed (NA p-value).
    pub fn n_missing(&self) -> usize {
        self.rows.iter().filter(|r| r.association.pval.is_nan()).count()
    }

    /// Write results to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_tsv(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write results as TSV to any writer.
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(
            writer,
            "pairwiseAssociation\tfeature\tmetadata\tcoef\tstderr\tpval\tqval_BH\ttime"
        )?;

        for r in &self.rows {
            let a = &r.association;
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                r.pairwise_association,
                a.feature,
                a.metadata,
                format_value(a.coef),
                format_value(a.stderr),
                format_value(a.pval),
                format_value(a.qval_bh),
                self.time
            )?;
        }

        Ok(())
    }

    /// Serialize to pretty JSON. Missing values become `null`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Format a statistic, writing `NA` for missing values.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NA".to_string()
    } else {
        value.to_string()
    }
}

impl std::fmt::Display for DatasetResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Dataset: {}", self.name)?;
        writeln!(f, "Associations tested: {}", self.len())?;
        writeln!(f, "Failed fits (NA):    {}", self.n_missing())?;
        writeln!(f, "Significant at q < 0.05: {}", self.n_significant(0.05))?;
        writeln!(f, "Significant at q < 0.25: {}", self.n_significant(0.25))?;
        writeln!(f, "Time (minutes): {}", self.time)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> DatasetResult {
        let rows = vec![
            LabeledAssociation {
                pairwise_association: "pairwiseAssociation1".into(),
                association: CoefficientRow {
                    feature: "f1".into(),
                    metadata: "group".into(),
                    coef: 1.5,
                    stderr: 0.25,
                    pval: 0.001,
                }
                .with_qvalue(0.002),
            },
            LabeledAssociation {
                pairwise_association: "pairwiseAssociation2".into(),
                association: CoefficientRow::missing("f2", "group").with_qvalue(f64::NAN),
            },
        ];
        DatasetResult {
            name: "toy".into(),
            rows,
            time: 0.012,
        }
    }

    #[test]
    fn test_counts() {
        let r = result();
        assert_eq!(r.len(), 2);
        assert_eq!(r.n_missing(), 1);
        assert_eq!(r.n_significant(0.05), 1);
    }

    #[test]
    fn test_write_tsv() {
        let mut buf = Vec::new();
        result().write_tsv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "pairwiseAssociation\tfeature\tmetadata\tcoef\tstderr\tpval\tqval_BH\ttime"
        );
        assert_eq!(lines[1], "pairwiseAssociation1\tf1\tgroup\t1.5\t0.25\t0.001\t0.002\t0.012");
        assert_eq!(lines[2], "pairwiseAssociation2\tf2\tgroup\tNA\tNA\tNA\tNA\t0.012");
    }

    #[test]
    fn test_json_missing_as_null() {
        let json = result().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let second = &value["rows"][1];
        assert_eq!(second["pairwiseAssociation"], "pairwiseAssociation2");
        assert!(second["coef"].is_null());
        assert!(second["qval_BH"].is_null());
    }

    #[test]
    fn test_association_round_trip_to_coefficients() {
        let row = CoefficientRow {
            feature: "f".into(),
            metadata: "m".into(),
            coef: 0.3,
            stderr: 0.1,
            pval: 0.2,
        };
        assert_eq!(row.clone().with_qvalue(0.4).coefficients(), row);
    }
}
