//! Grouping structure for random-intercept models.

use std::collections::HashMap;

/// Mapping of samples to subjects for a `(1 | ID)` random intercept.
#[derive(Debug, Clone)]
pub struct GroupIndex {
    /// Group index for each sample.
    pub group_indices: Vec<usize>,
    /// Unique group IDs in first-seen order.
    pub group_ids: Vec<String>,
}

impl GroupIndex {
    /// Build the index from per-sample IDs.
    pub fn from_ids(ids: &[String]) -> Self {
        let mut group_map: HashMap<&str, usize> = HashMap::new();
        let mut group_ids: Vec<String> = Vec::new();
        let mut group_indices: Vec<usize> = Vec::with_capacity(ids.len());

        for id in ids {
            let idx = *group_map.entry(id.as_str()).or_insert_with(|| {
                group_ids.push(id.clone());
                group_ids.len() - 1
            });
            group_indices.push(idx);
        }

        Self {
            group_indices,
            group_ids,
        }
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.group_indices.len()
    }

    /// Number of groups.
    pub fn n_groups(&self) -> usize {
        self.group_ids.len()
    }

    /// Whether every sample is its own group.
    pub fn all_distinct(&self) -> bool {
        self.n_groups() == self.n_samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects() -> Vec<String> {
        ["A", "A", "B", "B", "C", "C", "D", "D"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_group_index_structure() {
        let index = GroupIndex::from_ids(&subjects());
        assert_eq!(index.n_samples(), 8);
        assert_eq!(index.n_groups(), 4);
        assert!(!index.all_distinct());
        assert_eq!(index.group_indices[0], index.group_indices[1]);
        assert_ne!(index.group_indices[0], index.group_indices[2]);
        assert_eq!(index.group_ids, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_all_distinct() {
        let ids: Vec<String> = (0..5).map(|i| format!("s{}", i)).collect();
        assert!(GroupIndex::from_ids(&ids).all_distinct());
    }
}
