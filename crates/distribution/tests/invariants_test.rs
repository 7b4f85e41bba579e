//! Property tests for the map invariants.
//!
//! Every planned map must cover each bucket exactly once, a leave must not
//! leave buckets behind on the departed node, the ownership index must
//! partition the map, and buckets under transfer are never picked. Joins
//! keep every node at its fair share whether or not transfers finish in
//! between, and balance shares follow each node's deficit.

use distribution::balance::{filter_candidate_nodes, BalanceNodeMgr, NodeBalanceData};
use distribution::bucket::{BucketStatistics, BucketStatsTable};
use distribution::distribute::balance_buckets;
use distribution::{
    BalancingResult, Bucket, BucketMap, BucketStatus, ClusterActivity, DistributionConfig,
    DistributionInfo, DistributionManager, NodeAddress, NodeInfo, OwnershipMap,
};
use proptest::prelude::*;
use std::collections::HashSet;

fn node(i: usize) -> NodeAddress {
    format!("10.0.0.{}:7800", i + 1).parse().unwrap()
}

/// Plan and install; returns the planned map.
fn apply(manager: &DistributionManager, activity: ClusterActivity, address: NodeAddress) -> BucketMap {
    let info = DistributionInfo::new(activity, NodeInfo::new(address));
    let maps = manager.get_maps(&info).unwrap();
    let left = if activity == ClusterActivity::NodeLeave {
        vec![address]
    } else {
        Vec::new()
    };
    manager.install_hash_map(&maps, &left).unwrap();
    maps.hash_map.unwrap()
}

fn complete_transfers(manager: &DistributionManager) {
    let map = manager.installed_map().unwrap();
    for bucket in map.iter().filter(|b| !b.is_settled()) {
        manager.lock_buckets(&[bucket.id], bucket.temporary).unwrap();
        manager.release_buckets(&[bucket.id], bucket.temporary);
    }
}

fn assert_covers(map: &BucketMap, total: usize, members: &[NodeAddress]) {
    assert_eq!(map.len(), total);
    for (id, bucket) in map.iter().enumerate() {
        assert_eq!(bucket.id, id);
        assert!(members.contains(&bucket.temporary), "bucket {bucket} served by non-member");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_joins_cover_every_bucket(
        total in 8usize..200,
        nodes in 1usize..6,
        settle in any::<bool>(),
    ) {
        let manager = DistributionManager::new(DistributionConfig::default().with_total_buckets(total)).unwrap();
        for i in 0..nodes {
            apply(&manager, ClusterActivity::NodeJoin, node(i));
            if settle {
                complete_transfers(&manager);
            }
        }
        let members = manager.members();
        prop_assert_eq!(members.len(), nodes);
        assert_covers(&manager.installed_map().unwrap(), total, &members);
    }

    #[test]
    fn prop_joins_keep_fair_share(
        total in 8usize..300,
        settles in prop::collection::vec(any::<bool>(), 1..6),
    ) {
        let nodes = settles.len();
        let manager = DistributionManager::new(DistributionConfig::default().with_total_buckets(total)).unwrap();
        for (i, &settle) in settles.iter().enumerate() {
            apply(&manager, ClusterActivity::NodeJoin, node(i));
            if settle {
                complete_transfers(&manager);
            }
        }
        complete_transfers(&manager);

        let map = manager.installed_map().unwrap();
        prop_assert!(map.all_settled());
        let fair = total / nodes;
        for i in 0..nodes {
            let count = map.permanent_count(&node(i));
            prop_assert!(
                count >= fair && count <= fair + total % nodes,
                "{} owns {} of {} buckets",
                node(i),
                count,
                total
            );
        }
    }

    #[test]
    fn prop_candidate_shares_follow_deficit(b_owned in 160usize..=300) {
        // a owns 700 of 1000 equally heavy buckets, b and c split the rest.
        let (a, b, c) = (node(0), node(1), node(2));
        let mut map = BucketMap::founding(a, 1000);
        for id in 700..1000 {
            let owner = if id < 700 + b_owned { b } else { c };
            let bucket = map.get_mut(id).unwrap();
            bucket.permanent = owner;
            bucket.temporary = owner;
        }
        let stats: BucketStatsTable = (0..1000)
            .map(|id| (id, BucketStatistics::with_size(1000)))
            .collect();
        let data = NodeBalanceData::new(&map, &stats, &[a, b, c]);
        prop_assert_eq!(data.weight_per_node(), 333_333);
        let excess = data.node(&a).unwrap().total_weight() - data.weight_per_node();

        let shares = filter_candidate_nodes(&data, excess);
        prop_assert_eq!(shares.len(), 2);
        let (to_b, to_c) = (shares[0].weight_share, shares[1].weight_share);
        prop_assert!(to_c > to_b, "c is further below the fair share: {} vs {}", to_c, to_b);
        prop_assert!((to_b + to_c - excess).abs() <= excess / 100 + 2);

        // Shares are computed from whole percentages, so allow a few points.
        let deficit_b = 333_333 - b_owned as i64 * 1000;
        let deficit_c = 333_333 - (300 - b_owned) as i64 * 1000;
        let expected_b = excess * deficit_b / (deficit_b + deficit_c);
        prop_assert!((to_b - expected_b).abs() <= excess / 15, "{} vs {}", to_b, expected_b);
    }

    #[test]
    fn prop_leave_orphans_nothing(
        total in 8usize..200,
        nodes in 2usize..6,
        leaving in 0usize..6,
        settle in any::<bool>(),
    ) {
        let leaving = node(leaving % nodes);
        let manager = DistributionManager::new(DistributionConfig::default().with_total_buckets(total)).unwrap();
        for i in 0..nodes {
            apply(&manager, ClusterActivity::NodeJoin, node(i));
            if settle {
                complete_transfers(&manager);
            }
        }

        let planned = apply(&manager, ClusterActivity::NodeLeave, leaving);
        prop_assert!(planned.iter().all(|b| b.permanent != leaving && b.temporary != leaving));
        let members = manager.members();
        prop_assert!(!members.contains(&leaving));
        assert_covers(&planned, total, &members);
        assert_covers(&manager.installed_map().unwrap(), total, &members);
    }

    #[test]
    fn prop_ownership_partitions_map(
        owners in prop::collection::vec((0usize..5, 0usize..5), 1..300),
    ) {
        let buckets: Vec<Bucket> = owners
            .iter()
            .enumerate()
            .map(|(id, &(permanent, temporary))| {
                let mut bucket = Bucket::new(id, node(permanent));
                bucket.reassign(node(temporary));
                bucket
            })
            .collect();
        let map = BucketMap::from_buckets(buckets).unwrap();
        let ownership = OwnershipMap::from_bucket_map(&map);

        prop_assert_eq!(ownership.bucket_count(), map.len());
        let mut seen = HashSet::new();
        for (owner, list) in ownership.iter() {
            for (id, bucket) in list {
                prop_assert!(seen.insert(*id), "bucket {} listed twice", id);
                prop_assert_eq!(bucket.temporary, *owner);
                prop_assert_eq!(map.get(*id), Some(bucket));
            }
        }
        prop_assert_eq!(seen.len(), map.len());
    }

    #[test]
    fn prop_buckets_under_transfer_are_never_picked(
        locked in prop::collection::hash_set(0usize..100, 0..40),
        weights in prop::collection::vec(0i64..10_000, 100),
    ) {
        let a = node(0);
        let mut map = BucketMap::founding(a, 100);
        for &id in &locked {
            map.get_mut(id).unwrap().status = BucketStatus::UnderStateTransfer;
        }
        let stats: BucketStatsTable = weights
            .iter()
            .enumerate()
            .map(|(id, &w)| (id, BucketStatistics::with_size(w)))
            .collect();
        let config = DistributionConfig::default().with_cache_size_per_node(100_000);

        let info = DistributionInfo::new(ClusterActivity::NodeJoin, NodeInfo::new(node(1)));
        let selection = balance_buckets(&info, &map, &stats, &[a], &config);
        prop_assert!(selection.bucket_ids.iter().all(|id| !locked.contains(id)));
        let unique: HashSet<usize> = selection.bucket_ids.iter().copied().collect();
        prop_assert_eq!(unique.len(), selection.bucket_ids.len());

        let tick = DistributionInfo::new(ClusterActivity::None, NodeInfo::new(a));
        let result = BalanceNodeMgr::new(&config).balance_nodes(&tick, &map, &stats, &[a, node(1)]);
        if let Some(planned) = result.hash_map {
            for &id in &locked {
                prop_assert_eq!(planned.get(id), map.get(id));
            }
        } else {
            prop_assert_ne!(result.result, BalancingResult::Default);
        }
    }
}
