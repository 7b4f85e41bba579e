//! Cluster-wide snapshot used when a node joins.

use crate::bucket::{weight_of, BucketMap, BucketStatsTable, WeightedEntry};
use crate::config::DistributionConfig;
use crate::matrix::distribution_matrix::{ClusterShare, DistributionMatrix};
use crate::node::NodeAddress;
use tracing::debug;

/// Fair shares for the cluster after a join, plus one matrix per existing
/// member describing what it can give to the newcomer.
#[derive(Clone, Debug)]
pub struct DistributionData {
    share: ClusterShare,
    entries: Vec<WeightedEntry>,
    matrices: Vec<DistributionMatrix>,
}

impl DistributionData {
    /// Scan `map` once and build the per-member matrices.
    ///
    /// `members` are the nodes already in the cluster; shares are computed
    /// for `members.len() + 1` nodes. Each movable bucket is credited to its
    /// temporary owner, so a bucket already promised to an earlier joiner
    /// sits in that joiner's matrix. Buckets under state transfer are
    /// locked and excluded from the entries, but their weight still counts
    /// toward the cluster total. `weight_divisor` scales the per-node target
    /// (2 trades balance quality for shorter transfers).
    pub fn new(
        map: &BucketMap,
        stats: &BucketStatsTable,
        members: &[NodeAddress],
        config: &DistributionConfig,
        weight_divisor: i64,
    ) -> Self {
        let mut cache_data_sum: i64 = 1;
        let mut entries = Vec::with_capacity(map.len());
        for bucket in map {
            let weight = weight_of(stats, bucket.id);
            if bucket.status.is_movable() {
                entries.push(WeightedEntry::new(bucket.id, weight, bucket.temporary));
            }
            cache_data_sum += weight;
        }
        if cache_data_sum > 1 {
            cache_data_sum -= 1;
        }

        let nodes = members.len() + 1;
        let share = ClusterShare {
            buckets_per_node: map.len() / nodes,
            weight_per_node: cache_data_sum / nodes as i64 / weight_divisor.max(1),
            cache_data_sum,
        };
        debug!(
            nodes,
            buckets_per_node = share.buckets_per_node,
            weight_per_node = share.weight_per_node,
            cache_data_sum,
            "distribution data computed"
        );

        let matrices = members
            .iter()
            .map(|member| DistributionMatrix::new(&entries, *member, &share, config))
            .collect();

        Self {
            share,
            entries,
            matrices,
        }
    }

    pub fn share(&self) -> &ClusterShare {
        &self.share
    }

    pub fn buckets_per_node(&self) -> usize {
        self.share.buckets_per_node
    }

    pub fn weight_per_node(&self) -> i64 {
        self.share.weight_per_node
    }

    pub fn cache_data_sum(&self) -> i64 {
        self.share.cache_data_sum
    }

    /// Entries eligible for moving.
    pub fn entries(&self) -> &[WeightedEntry] {
        &self.entries
    }

    pub fn matrices(&self) -> &[DistributionMatrix] {
        &self.matrices
    }

    /// True if any member carries enough data for weight to matter.
    pub fn should_balance_weight(&self) -> bool {
        self.matrices.iter().any(DistributionMatrix::do_weight_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{BucketStatistics, BucketStatus};

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_shares_count_the_joining_node() {
        let a = addr("10.0.0.1:7800");
        let map = BucketMap::founding(a, 1000);
        let stats: BucketStatsTable = (0..1000)
            .map(|id| (id, BucketStatistics::with_size(10)))
            .collect();

        let data = DistributionData::new(&map, &stats, &[a], &DistributionConfig::default(), 1);
        assert_eq!(data.buckets_per_node(), 500);
        assert_eq!(data.cache_data_sum(), 10_000);
        assert_eq!(data.weight_per_node(), 5_000);
        assert_eq!(data.matrices().len(), 1);
        assert_eq!(data.matrices()[0].buckets_to_sacrifice(), 500);
    }

    #[test]
    fn test_locked_buckets_are_not_entries() {
        let a = addr("10.0.0.1:7800");
        let mut map = BucketMap::founding(a, 10);
        map.get_mut(3).unwrap().status = BucketStatus::UnderStateTransfer;
        let stats: BucketStatsTable = (0..10).map(|id| (id, BucketStatistics::with_size(1))).collect();

        let data = DistributionData::new(&map, &stats, &[a], &DistributionConfig::default(), 1);
        assert_eq!(data.entries().len(), 9);
        assert!(data.entries().iter().all(|e| e.bucket_id != 3));
        assert_eq!(data.cache_data_sum(), 10);
    }

    #[test]
    fn test_weight_divisor_halves_target() {
        let a = addr("10.0.0.1:7800");
        let map = BucketMap::founding(a, 100);
        let stats: BucketStatsTable = (0..100).map(|id| (id, BucketStatistics::with_size(100))).collect();

        let full = DistributionData::new(&map, &stats, &[a], &DistributionConfig::default(), 1);
        let half = DistributionData::new(&map, &stats, &[a], &DistributionConfig::default(), 2);
        assert_eq!(half.weight_per_node() * 2, full.weight_per_node());
        assert!(half.matrices()[0].weight_to_sacrifice() < full.matrices()[0].weight_to_sacrifice());
    }

    #[test]
    fn test_empty_cluster_has_unit_sum() {
        let a = addr("10.0.0.1:7800");
        let map = BucketMap::founding(a, 10);
        let data = DistributionData::new(
            &map,
            &BucketStatsTable::new(),
            &[a],
            &DistributionConfig::default(),
            1,
        );
        assert_eq!(data.cache_data_sum(), 1);
        assert!(!data.should_balance_weight());
    }
}
