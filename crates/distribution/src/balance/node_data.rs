//! Per-node weight lists used by the steady-state balancer.

use crate::bucket::{weight_of, BucketMap, BucketStatsTable, WeightedEntry};
use crate::node::NodeAddress;

/// Buckets currently served by one node, lightest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceDataForNode {
    address: NodeAddress,
    entries: Vec<WeightedEntry>,
    total_weight: i64,
    percent_data: i64,
}

impl BalanceDataForNode {
    fn new(address: NodeAddress, mut entries: Vec<WeightedEntry>, cluster_weight: i64) -> Self {
        entries.sort();
        let total_weight = entries.iter().map(|e| e.weight).sum::<i64>();
        Self {
            address,
            entries,
            total_weight,
            percent_data: total_weight * 100 / cluster_weight.max(1),
        }
    }

    pub fn address(&self) -> NodeAddress {
        self.address
    }

    pub fn entries(&self) -> &[WeightedEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<WeightedEntry> {
        &mut self.entries
    }

    pub fn items_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_weight(&self) -> i64 {
        self.total_weight
    }

    /// Share of the cluster's data held by this node, in percent.
    pub fn percent_data(&self) -> i64 {
        self.percent_data
    }
}

/// Snapshot of every member's load for one balancing pass.
#[derive(Clone, Debug)]
pub struct NodeBalanceData {
    nodes: Vec<BalanceDataForNode>,
    cluster_weight: i64,
    weight_per_node: i64,
    percent_weight_per_node: i64,
}

impl NodeBalanceData {
    /// Group the movable buckets of `map` by temporary owner.
    ///
    /// Buckets under state transfer are locked and left out entirely.
    pub fn new(map: &BucketMap, stats: &BucketStatsTable, members: &[NodeAddress]) -> Self {
        let mut cluster_weight: i64 = 1;
        let mut per_node: Vec<Vec<WeightedEntry>> = vec![Vec::new(); members.len()];

        for bucket in map.iter().filter(|b| b.status.is_movable()) {
            let weight = weight_of(stats, bucket.id);
            cluster_weight += weight;
            if let Some(slot) = members.iter().position(|m| *m == bucket.temporary) {
                per_node[slot].push(WeightedEntry::new(bucket.id, weight, bucket.temporary));
            }
        }

        let count = members.len().max(1) as i64;
        let nodes = members
            .iter()
            .zip(per_node)
            .map(|(member, entries)| BalanceDataForNode::new(*member, entries, cluster_weight))
            .collect();

        Self {
            nodes,
            cluster_weight,
            weight_per_node: cluster_weight / count,
            percent_weight_per_node: 100 / count,
        }
    }

    pub fn nodes(&self) -> &[BalanceDataForNode] {
        &self.nodes
    }

    pub(crate) fn into_nodes(self) -> Vec<BalanceDataForNode> {
        self.nodes
    }

    pub fn node(&self, address: &NodeAddress) -> Option<&BalanceDataForNode> {
        self.nodes.iter().find(|n| n.address == *address)
    }

    pub fn cluster_weight(&self) -> i64 {
        self.cluster_weight
    }

    /// Fair data weight per member.
    pub fn weight_per_node(&self) -> i64 {
        self.weight_per_node
    }

    pub fn percent_weight_per_node(&self) -> i64 {
        self.percent_weight_per_node
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
    fn test_groups_by_temporary_owner() {
        let a = addr("10.0.0.1:7800");
        let b = addr("10.0.0.2:7800");
        let mut map = BucketMap::founding(a, 10);
        map.change_ownership(&[0, 1, 2], b).unwrap();
        let stats: BucketStatsTable = (0..10)
            .map(|id| (id, BucketStatistics::with_size(id as i64 * 10)))
            .collect();

        let data = NodeBalanceData::new(&map, &stats, &[a, b]);
        let of_b = data.node(&b).unwrap();
        assert_eq!(of_b.items_count(), 3);
        assert_eq!(of_b.total_weight(), 30);
        assert_eq!(data.node(&a).unwrap().items_count(), 7);
        assert_eq!(data.cluster_weight(), 451);
        assert_eq!(data.weight_per_node(), 225);
        assert_eq!(data.percent_weight_per_node(), 50);
    }

    #[test]
    fn test_entries_sorted_lightest_first() {
        let a = addr("10.0.0.1:7800");
        let map = BucketMap::founding(a, 4);
        let stats: BucketStatsTable = [(0, 40), (1, 10), (2, 30), (3, 20)]
            .into_iter()
            .map(|(id, w)| (id, BucketStatistics::with_size(w)))
            .collect();
        let data = NodeBalanceData::new(&map, &stats, &[a]);
        let ids: Vec<usize> = data.nodes()[0].entries().iter().map(|e| e.bucket_id).collect();
        assert_eq!(ids, vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_locked_buckets_are_skipped() {
        let a = addr("10.0.0.1:7800");
        let mut map = BucketMap::founding(a, 4);
        map.get_mut(2).unwrap().status = BucketStatus::UnderStateTransfer;
        let stats: BucketStatsTable = (0..4).map(|id| (id, BucketStatistics::with_size(5))).collect();
        let data = NodeBalanceData::new(&map, &stats, &[a]);
        assert_eq!(data.nodes()[0].items_count(), 3);
        assert!(data.nodes()[0].entries().iter().all(|e| e.bucket_id != 2));
    }
}
