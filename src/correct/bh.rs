//! Benjamini-Hochberg false discovery rate correction.

use crate::data::{Association, CoefficientRow, FeatureTable, MetadataTable};
use crate::error::Result;
use std::collections::HashMap;

use super::QValueAdjuster;

/// Apply Benjamini-Hochberg FDR correction.
///
/// For sorted p-values, `q[i] = min(p[i] * m / rank[i], q[i+1])`, capped at 1.
/// Missing p-values (NaN) are excluded from `m` and receive a NaN q-value.
///
/// # Arguments
/// * `p_values` - Raw p-values, NaN for missing
///
/// # Returns
/// q-values in the input order.
pub fn correct_bh(p_values: &[f64]) -> Vec<f64> {
    let mut q_values = vec![f64::NAN; p_values.len()];

    let mut indices: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    let m = indices.len();
    if m == 0 {
        return q_values;
    }

    indices.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let m_f64 = m as f64;

    // Start from the largest p-value
    let mut running = p_values[indices[m - 1]].min(1.0);
    q_values[indices[m - 1]] = running;

    for rank in (1..m).rev() {
        let idx = indices[rank - 1];
        let adjusted = p_values[idx] * m_f64 / rank as f64;
        running = adjusted.min(running).min(1.0);
        q_values[idx] = running;
    }

    q_values
}

/// BH applied separately within each covariate, across all features.
///
/// Each covariate's p-values form their own family, so adding a covariate
/// never changes the q-values of another.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerCovariateBh;

impl QValueAdjuster for PerCovariateBh {
    fn adjust(
        &self,
        _features: &FeatureTable,
        _metadata: &MetadataTable,
        rows: Vec<CoefficientRow>,
    ) -> Result<Vec<Association>> {
        let mut strata: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            strata.entry(row.metadata.as_str()).or_default().push(i);
        }

        let mut q_values = vec![f64::NAN; rows.len()];
        for members in strata.values() {
            let p: Vec<f64> = members.iter().map(|&i| rows[i].pval).collect();
            for (&i, q) in members.iter().zip(correct_bh(&p)) {
                q_values[i] = q;
            }
        }

        Ok(rows
            .into_iter()
            .zip(q_values)
            .map(|(row, q)| row.with_qvalue(q))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bh_ordering() {
        // P-values in non-sorted order
        let p_values = vec![0.04, 0.01, 0.03, 0.005];

        let q = correct_bh(&p_values);

        // Smallest p-value (0.005 at index 3): q = 0.005 * 4 / 1 = 0.02
        assert_relative_eq!(q[3], 0.02, epsilon = 1e-10);

        // Second smallest (0.01 at index 1): min(0.01 * 4 / 2, q[next]) = 0.02
        assert_relative_eq!(q[1], 0.02, epsilon = 1e-10);
    }

    #[test]
    fn test_bh_monotonicity() {
        let p_values = vec![0.001, 0.01, 0.02, 0.05, 0.1, 0.5];

        let q = correct_bh(&p_values);

        // Input is sorted, so q-values must be non-decreasing
        for pair in q.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-12);
        }
    }

    #[test]
    fn test_bh_bounded() {
        let q = correct_bh(&[0.5, 0.6, 0.7, 0.8, 0.9, 1.0]);
        assert!(q.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_bh_empty() {
        assert!(correct_bh(&[]).is_empty());
    }

    #[test]
    fn test_bh_single() {
        let q = correct_bh(&[0.05]);
        assert_relative_eq!(q[0], 0.05, epsilon = 1e-10);
    }

    #[test]
    fn test_bh_known_values() {
        // Rank 1: 0.005 * 5/1 = 0.025
        // Rank 2: 0.01 * 5/2 = 0.025
        // Rank 3: 0.02 * 5/3 = 0.0333
        // Rank 4: 0.04 * 5/4 = 0.05
        // Rank 5: 0.1 * 5/5 = 0.1
        let q = correct_bh(&[0.005, 0.01, 0.02, 0.04, 0.1]);

        assert_relative_eq!(q[0], 0.025, epsilon = 1e-10);
        assert_relative_eq!(q[1], 0.025, epsilon = 1e-10);
        assert_relative_eq!(q[2], 1.0 / 30.0, epsilon = 1e-10);
        assert_relative_eq!(q[3], 0.05, epsilon = 1e-10);
        assert_relative_eq!(q[4], 0.1, epsilon = 1e-10);
    }

    #[test]
    fn test_bh_missing_excluded_from_m() {
        // With the NaN dropped, m = 2: q = [0.01 * 2, 0.04]
        let q = correct_bh(&[0.01, f64::NAN, 0.04]);

        assert_relative_eq!(q[0], 0.02, epsilon = 1e-10);
        assert!(q[1].is_nan());
        assert_relative_eq!(q[2], 0.04, epsilon = 1e-10);
    }

    #[test]
    fn test_bh_all_missing() {
        let q = correct_bh(&[f64::NAN, f64::NAN]);
        assert!(q.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_per_covariate_strata() {
        let features = FeatureTable::new(
            vec!["s1".into(), "s2".into()],
            vec!["f1".into(), "f2".into()],
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        )
        .unwrap();
        let metadata = MetadataTable::new(
            vec!["s1".into(), "s2".into()],
            vec!["a".into(), "b".into()],
            vec![vec![0.0, 1.0], vec![1.0, 0.0]],
        )
        .unwrap();

        let row = |f: &str, m: &str, p: f64| CoefficientRow {
            feature: f.into(),
            metadata: m.into(),
            coef: 1.0,
            stderr: 0.5,
            pval: p,
        };
        let rows = vec![
            row("f1", "a", 0.01),
            row("f1", "b", 0.5),
            row("f2", "a", 0.04),
            row("f2", "b", f64::NAN),
        ];

        let adjusted = PerCovariateBh.adjust(&features, &metadata, rows).unwrap();

        assert_eq!(adjusted.len(), 4);
        assert_eq!(adjusted[0].feature, "f1");
        assert_eq!(adjusted[0].metadata, "a");
        // Covariate "a": m = 2
        assert_relative_eq!(adjusted[0].qval_bh, 0.02, epsilon = 1e-10);
        assert_relative_eq!(adjusted[2].qval_bh, 0.04, epsilon = 1e-10);
        // Covariate "b": m = 1, NA stays NA
        assert_relative_eq!(adjusted[1].qval_bh, 0.5, epsilon = 1e-10);
        assert!(adjusted[3].qval_bh.is_nan());
    }
}
