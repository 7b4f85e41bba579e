//! Steady-state balancer: moves weight from one overloaded node to the
//! nodes below the average without any membership change.
//!
//! The overloaded (primary) node's heaviest buckets are swapped against the
//! lightest buckets of each underloaded (secondary) node until the weight
//! assigned to that secondary has moved, give or take the cushion.

use crate::balance::node_data::{BalanceDataForNode, NodeBalanceData};
use crate::bucket::{BucketMap, BucketStatsTable, OwnershipMap};
use crate::config::DistributionConfig;
use crate::maps::{BalancingResult, DistributionInfo, DistributionMaps};
use crate::node::NodeAddress;
use std::collections::HashSet;
use tracing::{debug, info};

/// Weight a secondary node should receive from the primary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CandidateShare {
    pub node: NodeAddress,
    pub weight_share: i64,
}

/// Pairwise balancer for periodic balance ticks.
#[derive(Debug)]
pub struct BalanceNodeMgr<'a> {
    config: &'a DistributionConfig,
}

impl<'a> BalanceNodeMgr<'a> {
    pub fn new(config: &'a DistributionConfig) -> Self {
        Self { config }
    }

    /// Plan a new map that unloads `info.affected_node`.
    ///
    /// The input map is left untouched; the plan works on a copy.
    pub fn balance_nodes(
        &self,
        info: &DistributionInfo,
        map: &BucketMap,
        stats: &BucketStatsTable,
        members: &[NodeAddress],
    ) -> DistributionMaps {
        if !sanity_check_for_all_functional(map) {
            info!("transfer in progress, balancing postponed");
            return DistributionMaps::with_result(BalancingResult::AlreadyInBalancing);
        }

        let data = NodeBalanceData::new(map, stats, members);
        let source = info.affected_node.address;
        let Some(weight_to_move) = self.sanity_check_for_candidate_node(&data, &source) else {
            debug!(node = %source, "node within its fair share, balancing not required");
            return DistributionMaps::with_result(BalancingResult::NotRequired);
        };

        let candidates = filter_candidate_nodes(&data, weight_to_move);
        if candidates.is_empty() {
            return DistributionMaps::with_result(BalancingResult::NotRequired);
        }

        let mut nodes = data.into_nodes();
        let Some(primary_slot) = nodes.iter().position(|n| n.address() == source) else {
            return DistributionMaps::with_result(BalancingResult::NotRequired);
        };
        let mut primary = nodes.swap_remove(primary_slot);

        let mut planned = map.clone();
        let mut swaps = 0;
        for candidate in &candidates {
            let Some(secondary) = nodes.iter_mut().find(|n| n.address() == candidate.node) else {
                continue;
            };
            let moved = balance_two_nodes(
                &mut primary,
                secondary,
                candidate.weight_share,
                self.config.cushion_factor,
            );
            debug!(
                from = %source,
                to = %candidate.node,
                share = candidate.weight_share,
                swaps = moved,
                "balanced node pair"
            );
            swaps += moved;
            apply_changes(&mut planned, secondary);
        }
        if swaps == 0 {
            debug!(node = %source, "no swap reduces the excess, balancing not required");
            return DistributionMaps::with_result(BalancingResult::NotRequired);
        }
        apply_changes(&mut planned, &primary);

        info!(
            node = %source,
            weight_to_move,
            candidates = candidates.len(),
            "balance plan computed"
        );
        let ownership = OwnershipMap::from_bucket_map(&planned);
        DistributionMaps::new(planned, ownership)
    }

    /// Excess weight of `source` above the fair share, if it is worth moving.
    ///
    /// An excess within the cushion around the fair share is not worth a
    /// transfer, so a freshly balanced cluster reports nothing to do.
    fn sanity_check_for_candidate_node(
        &self,
        data: &NodeBalanceData,
        source: &NodeAddress,
    ) -> Option<i64> {
        let node = data.node(source)?;
        if node.percent_data() <= data.percent_weight_per_node() {
            return None;
        }
        let excess = node.total_weight() - data.weight_per_node();
        let cushion = data.weight_per_node() * i64::from(self.config.cushion_factor) / 100;
        (excess > cushion).then_some(excess)
    }
}

/// True when no bucket has a transfer in flight.
pub fn sanity_check_for_all_functional(map: &BucketMap) -> bool {
    map.all_settled()
}

/// Split `weight_to_move` among the nodes below the fair share, in
/// proportion to how far below it each one is.
pub fn filter_candidate_nodes(data: &NodeBalanceData, weight_to_move: i64) -> Vec<CandidateShare> {
    let fair = data.weight_per_node();
    let fair_percent = data.percent_weight_per_node();
    let below: Vec<&BalanceDataForNode> = data
        .nodes()
        .iter()
        .filter(|n| n.total_weight() < fair)
        .collect();

    let total_missing: i64 = below.iter().map(|n| fair_percent - n.percent_data()).sum();

    below
        .into_iter()
        .map(|n| {
            let missing = fair_percent - n.percent_data();
            let weight_share = if total_missing > 0 {
                let percent_share = (missing as f64 / total_missing as f64 * 100.0).round() as i64;
                (percent_share as f64 * weight_to_move as f64 / 100.0).round() as i64
            } else {
                0
            };
            CandidateShare {
                node: n.address(),
                weight_share,
            }
        })
        .collect()
}

/// Swap buckets so about `data_to_move` weight goes from `primary` to
/// `secondary`.
///
/// Secondary entries are walked lightest first, primary entries heaviest
/// first; a pair is swapped only when it is a real gain for the secondary.
/// Stops once the moved weight is within `cushion_factor` percent of the
/// target. Both lists are sorted again afterwards. Returns the number of
/// swaps made.
pub fn balance_two_nodes(
    primary: &mut BalanceDataForNode,
    secondary: &mut BalanceDataForNode,
    data_to_move: i64,
    cushion_factor: u32,
) -> usize {
    let cushion = (data_to_move as f64 * f64::from(cushion_factor) / 100.0).round() as i64;
    let mut moved_so_far: i64 = 0;
    let mut used: HashSet<usize> = HashSet::new();
    let mut swaps = 0;

    let pri = primary.entries_mut();
    let sec = secondary.entries_mut();

    'outer: for i in 0..sec.len() {
        for j in (0..pri.len()).rev() {
            if pri[j].weight <= sec[i].weight || used.contains(&j) {
                continue;
            }
            let gain = pri[j].weight - sec[i].weight;
            moved_so_far += gain;

            if moved_so_far <= data_to_move {
                std::mem::swap(&mut pri[j], &mut sec[i]);
                swaps += 1;
                if data_to_move - moved_so_far <= cushion {
                    break 'outer;
                }
                used.insert(j);
                break;
            } else if moved_so_far - data_to_move <= cushion {
                std::mem::swap(&mut pri[j], &mut sec[i]);
                swaps += 1;
                break 'outer;
            } else {
                moved_so_far -= gain;
            }
        }
    }

    pri.sort();
    sec.sort();
    swaps
}

/// Point every bucket listed for `node` at it, marking changed ones for
/// transfer.
fn apply_changes(map: &mut BucketMap, node: &BalanceDataForNode) {
    let owner = node.address();
    for entry in node.entries() {
        if let Some(bucket) = map.get_mut(entry.bucket_id) {
            bucket.reassign(owner);
        }
    }
}
