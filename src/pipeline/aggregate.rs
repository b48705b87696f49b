//! Stacking per-feature rows into a ranked association table.

use crate::correct::{correct_bh, QValueAdjuster};
use crate::data::{AssociationTable, CoefficientRow, FeatureTable, MetadataTable};
use crate::error::{DaaError, Result};
use std::cmp::Ordering;

/// Attach q-values to the stacked rows and rank them.
///
/// With `multiple_qvalues` the pooled procedure `adjuster` supplies q-values;
/// otherwise BH is applied over every non-missing p-value. Rows are sorted by
/// ascending q-value with missing values last; ties keep their stacked order.
pub fn aggregate(
    rows: Vec<CoefficientRow>,
    features: &FeatureTable,
    metadata: &MetadataTable,
    multiple_qvalues: bool,
    adjuster: Option<&dyn QValueAdjuster>,
) -> Result<AssociationTable> {
    let n_rows = rows.len();

    let mut associations = if multiple_qvalues {
        let adjuster = adjuster.ok_or_else(|| {
            DaaError::InvalidParameter(
                "multiple_qvalues requires a pooled q-value procedure".to_string(),
            )
        })?;
        let adjusted = adjuster.adjust(features, metadata, rows)?;
        if adjusted.len() != n_rows {
            return Err(DaaError::DimensionMismatch {
                expected: n_rows,
                actual: adjusted.len(),
            });
        }
        adjusted
    } else {
        let p_values: Vec<f64> = rows.iter().map(|r| r.pval).collect();
        let q_values = correct_bh(&p_values);
        rows.into_iter()
            .zip(q_values)
            .map(|(row, q)| row.with_qvalue(q))
            .collect()
    };

    associations.sort_by(|a, b| na_last(a.qval_bh, b.qval_bh));

    Ok(AssociationTable { rows: associations })
}

/// Ascending order with NaN greater than every number.
fn na_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::PerCovariateBh;
    use crate::data::Association;
    use approx::assert_relative_eq;

    fn tables() -> (FeatureTable, MetadataTable) {
        let samples: Vec<String> = vec!["s1".into(), "s2".into(), "s3".into()];
        let features = FeatureTable::new(
            samples.clone(),
            vec!["f1".into(), "f2".into(), "f3".into()],
            vec![vec![1.0, 2.0, 3.0]; 3],
        )
        .unwrap();
        let metadata =
            MetadataTable::new(samples, vec!["group".into()], vec![vec![0.0, 1.0, 1.0]]).unwrap();
        (features, metadata)
    }

    fn row(feature: &str, pval: f64) -> CoefficientRow {
        CoefficientRow {
            feature: feature.into(),
            metadata: "group".into(),
            coef: if pval.is_nan() { f64::NAN } else { 0.5 },
            stderr: if pval.is_nan() { f64::NAN } else { 0.1 },
            pval,
        }
    }

    #[test]
    fn test_bh_sorted_with_na_last() {
        let (features, metadata) = tables();
        let rows = vec![row("f1", f64::NAN), row("f2", 0.04), row("f3", 0.01)];

        let table = aggregate(rows, &features, &metadata, false, None).unwrap();

        let order: Vec<&str> = table.iter().map(|a| a.feature.as_str()).collect();
        assert_eq!(order, vec!["f3", "f2", "f1"]);
        assert_relative_eq!(table.rows[0].qval_bh, 0.02, epsilon = 1e-12);
        assert_relative_eq!(table.rows[1].qval_bh, 0.04, epsilon = 1e-12);
        assert!(table.rows[2].qval_bh.is_nan());
        assert!(table.rows[2].coef.is_nan());
    }

    #[test]
    fn test_ties_keep_stacked_order() {
        let (features, metadata) = tables();
        let rows = vec![row("f1", 0.5), row("f2", 0.5), row("f3", 0.5)];

        let table = aggregate(rows, &features, &metadata, false, None).unwrap();

        let order: Vec<&str> = table.iter().map(|a| a.feature.as_str()).collect();
        assert_eq!(order, vec!["f1", "f2", "f3"]);
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let (features, metadata) = tables();
        let rows = vec![row("f1", 0.2), row("f2", f64::NAN), row("f3", 0.003)];

        let once = aggregate(rows, &features, &metadata, false, None).unwrap();
        let twice = aggregate(once.coefficient_rows(), &features, &metadata, false, None).unwrap();

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.feature, b.feature);
            assert_eq!(a.pval.to_bits(), b.pval.to_bits());
            assert_eq!(a.qval_bh.to_bits(), b.qval_bh.to_bits());
        }
    }

    #[test]
    fn test_pooled_requires_adjuster() {
        let (features, metadata) = tables();
        let result = aggregate(vec![row("f1", 0.1)], &features, &metadata, true, None);
        assert!(matches!(result, Err(DaaError::InvalidParameter(_))));
    }

    #[test]
    fn test_pooled_delegates_to_adjuster() {
        let (features, metadata) = tables();
        let rows = vec![row("f1", 0.03), row("f2", 0.01)];

        let table =
            aggregate(rows, &features, &metadata, true, Some(&PerCovariateBh)).unwrap();

        assert_eq!(table.rows[0].feature, "f2");
        assert_relative_eq!(table.rows[0].qval_bh, 0.02, epsilon = 1e-12);
    }

    struct DroppingAdjuster;

    impl QValueAdjuster for DroppingAdjuster {
        fn adjust(
            &self,
            _: &FeatureTable,
            _: &MetadataTable,
            rows: Vec<CoefficientRow>,
        ) -> Result<Vec<Association>> {
            Ok(rows.into_iter().skip(1).map(|r| r.with_qvalue(0.1)).collect())
        }
    }

    #[test]
    fn test_pooled_row_count_must_match() {
        let (features, metadata) = tables();
        let rows = vec![row("f1", 0.03), row("f2", 0.01)];

        let result = aggregate(rows, &features, &metadata, true, Some(&DroppingAdjuster));
        assert!(matches!(
            result,
            Err(DaaError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
}
