//! Weighted bucket entries, the currency of rebalancing.

use crate::node::NodeAddress;
use std::cmp::Ordering;

/// Snapshot of one bucket's data size and owner.
///
/// Ordered by weight ascending; ties break on bucket id so sorting is
/// deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WeightedEntry {
    pub bucket_id: usize,
    pub weight: i64,
    pub owner: NodeAddress,
}

impl WeightedEntry {
    #[inline]
    pub fn new(bucket_id: usize, weight: i64, owner: NodeAddress) -> Self {
        Self {
            bucket_id,
            weight,
            owner,
        }
    }
}

impl Ord for WeightedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then_with(|| self.bucket_id.cmp(&other.bucket_id))
    }
}

impl PartialOrd for WeightedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_by_weight_then_id() {
        let a: NodeAddress = "10.0.0.1:7800".parse().unwrap();
        let mut entries = vec![
            WeightedEntry::new(2, 50, a),
            WeightedEntry::new(1, 10, a),
            WeightedEntry::new(0, 50, a),
        ];
        entries.sort();
        let ids: Vec<usize> = entries.iter().map(|e| e.bucket_id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
    }
}
