//! Map planning on membership changes.
//!
//! A leaving node's buckets are spread round-robin over the remaining
//! members. A joining node receives buckets picked from every existing
//! member's [`DistributionMatrix`] according to the requested
//! [`DistributionMode`].

use crate::bucket::{BucketMap, BucketStatsTable, BucketStatus};
use crate::config::DistributionConfig;
use crate::error::{Error, Result};
use crate::maps::{DistributionInfo, DistributionMode};
use crate::matrix::{compare_and_select, shuffle_select, DistributionData, DistributionMatrix};
use crate::node::NodeAddress;
use std::collections::HashSet;
use tracing::{debug, info};

/// Buckets chosen for a joining node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketSelection {
    /// Mode actually used; lightly loaded clusters fall back to shuffling.
    pub mode: DistributionMode,
    pub bucket_ids: Vec<usize>,
}

/// Reassign the buckets of `leaving` to `members`, the nodes that stay.
///
/// Transfers towards the leaving node are abandoned first. Its permanently
/// owned buckets then go round-robin to members still below
/// `total / members` buckets; any leftover goes to the next member in turn.
pub fn distribute_orphan_buckets(
    map: &BucketMap,
    leaving: NodeAddress,
    members: &[NodeAddress],
) -> Result<BucketMap> {
    if members.is_empty() {
        return Err(Error::NoMembers);
    }

    let mut planned = map.clone();
    let mut reverted = 0;
    for bucket in planned.iter_mut().filter(|b| b.temporary == leaving) {
        bucket.revert();
        reverted += 1;
    }

    let mut counts: Vec<usize> = members.iter().map(|m| planned.permanent_count(m)).collect();
    let per_node = planned.len() / members.len();
    let mut next = 0;
    let mut orphans = 0;

    for bucket in planned.iter_mut().filter(|b| b.permanent == leaving) {
        orphans += 1;
        let slot = (0..members.len())
            .map(|step| (next + step) % members.len())
            .find(|&slot| counts[slot] < per_node)
            .unwrap_or(next);

        let owner = members[slot];
        bucket.permanent = owner;
        bucket.temporary = owner;
        bucket.status = BucketStatus::Functional;
        counts[slot] += 1;
        next = (slot + 1) % members.len();
    }

    info!(
        node = %leaving,
        orphans,
        reverted,
        members = members.len(),
        "orphan buckets distributed"
    );
    Ok(planned)
}

/// Pick the buckets existing `members` hand over to the joining node.
pub fn balance_buckets(
    info: &DistributionInfo,
    map: &BucketMap,
    stats: &BucketStatsTable,
    members: &[NodeAddress],
    config: &DistributionConfig,
) -> BucketSelection {
    let weight_divisor = match info.mode {
        DistributionMode::AvgWeightTime => 2,
        _ => 1,
    };
    let data = DistributionData::new(map, stats, members, config, weight_divisor);

    let mode = if data.should_balance_weight() {
        info.mode
    } else {
        if info.mode != DistributionMode::ShuffleBuckets {
            info!(
                requested = %info.mode,
                "cluster lightly loaded, falling back to shuffled distribution"
            );
        }
        DistributionMode::ShuffleBuckets
    };

    let mut bucket_ids = Vec::new();
    for matrix in data.matrices().iter().filter(|m| !m.is_empty()) {
        let picked = match mode {
            DistributionMode::OptimalTime => (0..matrix.dimensions().cols)
                .filter_map(|col| matrix.bucket_id(0, col))
                .collect(),
            DistributionMode::ShuffleBuckets => {
                resolve_indices(matrix, &shuffle_select(matrix).indices)
            }
            DistributionMode::OptimalWeight | DistributionMode::AvgWeightTime => {
                resolve_indices(matrix, &compare_and_select(matrix).indices)
            }
        };
        debug!(
            node = %matrix.address(),
            %mode,
            count = picked.len(),
            buckets = ?picked,
            "buckets selected"
        );
        bucket_ids.extend(picked);
    }

    info!(
        node = %info.affected_node.address,
        %mode,
        count = bucket_ids.len(),
        "buckets selected for joining node"
    );
    BucketSelection { mode, bucket_ids }
}

/// Turn flat matrix indices into bucket ids.
///
/// Padding cells are replaced by the ids of row 0, in column order, so the
/// result keeps one id per selected cell without repeating any.
fn resolve_indices(matrix: &DistributionMatrix, indices: &[usize]) -> Vec<usize> {
    let cols = matrix.dimensions().cols;
    let selected: HashSet<usize> = indices
        .iter()
        .filter_map(|&i| matrix.bucket_id_at(i))
        .collect();
    let mut fillers = (0..cols)
        .filter_map(|col| matrix.bucket_id(0, col))
        .filter(|id| !selected.contains(id));

    indices
        .iter()
        .filter_map(|&index| matrix.bucket_id_at(index).or_else(|| fillers.next()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{Bucket, BucketStatistics};
    use crate::maps::ClusterActivity;
    use crate::node::NodeInfo;

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_orphans_split_evenly() {
        let a = addr("10.0.0.1:7800");
        let b = addr("10.0.0.2:7800");
        let c = addr("10.0.0.3:7800");
        let buckets = (0..1000)
            .map(|id| {
                let owner = match id {
                    0..=349 => a,
                    350..=699 => b,
                    _ => c,
                };
                Bucket::new(id, owner)
            })
            .collect();
        let map = BucketMap::from_buckets(buckets).unwrap();

        let planned = distribute_orphan_buckets(&map, c, &[a, b]).unwrap();
        assert_eq!(planned.permanent_count(&c), 0);
        assert_eq!(planned.temporary_count(&c), 0);
        assert_eq!(planned.permanent_count(&a), 500);
        assert_eq!(planned.permanent_count(&b), 500);
        assert!(planned.all_settled());
    }

    #[test]
    fn test_transfer_to_leaving_node_is_reverted() {
        let a = addr("10.0.0.1:7800");
        let b = addr("10.0.0.2:7800");
        let mut map = BucketMap::founding(a, 10);
        map.change_ownership(&[1, 2], b).unwrap();

        let planned = distribute_orphan_buckets(&map, b, &[a]).unwrap();
        for id in [1, 2] {
            let bucket = planned.get(id).unwrap();
            assert_eq!(bucket.temporary, a);
            assert_eq!(bucket.status, BucketStatus::Functional);
        }
        // input untouched
        assert_eq!(map.get(1).unwrap().temporary, b);
    }

    #[test]
    fn test_leftover_goes_round_robin() {
        let a = addr("10.0.0.1:7800");
        let b = addr("10.0.0.2:7800");
        let c = addr("10.0.0.3:7800");
        let d = addr("10.0.0.4:7800");
        // 10 buckets, 3 remaining members -> 3 per node plus one leftover
        let buckets = (0..10).map(|id| Bucket::new(id, d)).collect();
        let map = BucketMap::from_buckets(buckets).unwrap();

        let planned = distribute_orphan_buckets(&map, d, &[a, b, c]).unwrap();
        let counts: Vec<usize> = [a, b, c].iter().map(|m| planned.permanent_count(m)).collect();
        assert_eq!(counts.iter().sum::<usize>(), 10);
        assert!(counts.iter().all(|&n| (3..=4).contains(&n)));
    }

    #[test]
    fn test_no_members_is_an_error() {
        let a = addr("10.0.0.1:7800");
        let map = BucketMap::founding(a, 4);
        assert_eq!(distribute_orphan_buckets(&map, a, &[]), Err(Error::NoMembers));
    }

    #[test]
    fn test_unloaded_join_shuffles_half() {
        let a = addr("10.0.0.1:7800");
        let b = addr("10.0.0.2:7800");
        let map = BucketMap::founding(a, 1000);
        let info = DistributionInfo::new(ClusterActivity::NodeJoin, NodeInfo::new(b))
            .with_mode(DistributionMode::OptimalWeight);

        let selection = balance_buckets(
            &info,
            &map,
            &BucketStatsTable::new(),
            &[a],
            &DistributionConfig::default(),
        );
        assert_eq!(selection.mode, DistributionMode::ShuffleBuckets);
        assert_eq!(selection.bucket_ids.len(), 500);
        let unique: HashSet<_> = selection.bucket_ids.iter().collect();
        assert_eq!(unique.len(), 500);
    }

    #[test]
    fn test_loaded_join_keeps_weight_mode() {
        let a = addr("10.0.0.1:7800");
        let b = addr("10.0.0.2:7800");
        let map = BucketMap::founding(a, 100);
        let stats: BucketStatsTable = (0..100)
            .map(|id| (id, BucketStatistics::with_size(1000 + id as i64)))
            .collect();
        let config = DistributionConfig::default().with_cache_size_per_node(10_000);
        let info = DistributionInfo::new(ClusterActivity::NodeJoin, NodeInfo::new(b))
            .with_mode(DistributionMode::OptimalWeight);

        let selection = balance_buckets(&info, &map, &stats, &[a], &config);
        assert_eq!(selection.mode, DistributionMode::OptimalWeight);
        assert_eq!(selection.bucket_ids.len(), 50);
        let unique: HashSet<_> = selection.bucket_ids.iter().collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn test_optimal_time_takes_first_row() {
        let a = addr("10.0.0.1:7800");
        let b = addr("10.0.0.2:7800");
        let map = BucketMap::founding(a, 10);
        let stats: BucketStatsTable = (0..10)
            .map(|id| (id, BucketStatistics::with_size(100 - id as i64)))
            .collect();
        let config = DistributionConfig::default().with_cache_size_per_node(100);
        let info = DistributionInfo::new(ClusterActivity::NodeJoin, NodeInfo::new(b))
            .with_mode(DistributionMode::OptimalTime);

        let selection = balance_buckets(&info, &map, &stats, &[a], &config);
        assert_eq!(selection.mode, DistributionMode::OptimalTime);
        // lightest five buckets are ids 9..=5
        assert_eq!(selection.bucket_ids, vec![9, 8, 7, 6, 5]);
    }
}
