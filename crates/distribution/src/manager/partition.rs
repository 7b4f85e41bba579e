//! Partition awareness strategies.
//!
//! Plain partitioned clusters give every node its own buckets. In
//! partitioned-replica clusters nodes form subgroups: the first node of a
//! subgroup is its coordinator and owns buckets, the others are replicas
//! that shadow the coordinator's buckets in the ownership map.

use crate::bucket::{Bucket, BucketMap, BucketStatus, OwnershipMap};
use crate::node::{NodeAddress, NodeInfo};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

/// What a join means for bucket ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinPlan {
    /// The node takes buckets from existing members.
    Distribute,
    /// The node replicates a coordinator; only the ownership map changes.
    ShadowOnly,
}

/// What a leave means for bucket ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeavePlan {
    /// The node's buckets become orphans and are redistributed.
    Distribute,
    /// A replica takes over the departed coordinator's buckets in place.
    PromoteReplica {
        old: NodeAddress,
        new: NodeAddress,
    },
    /// A replica left; only the ownership map changes.
    ShadowOnly,
}

/// Membership bookkeeping and ownership expansion for one cluster topology.
pub trait PartitionAwareness: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Record the node that founded the cluster.
    fn on_founding(&mut self, node: &NodeInfo);

    fn plan_join(&mut self, node: &NodeInfo) -> JoinPlan;

    fn plan_leave(&mut self, node: &NodeInfo) -> LeavePlan;

    /// Join seen by a node that does not compute maps. Returns whether the
    /// node owns buckets and belongs in the member list.
    fn on_member_joined(&mut self, node: &NodeInfo) -> bool;

    /// Leave seen by a node that does not compute maps. Returns a node that
    /// now owns buckets and must be added to the member list.
    fn on_member_left(&mut self, node: &NodeInfo) -> Option<NodeAddress>;

    /// Ownership map for `map`, given the currently installed one.
    fn ownership_map(&self, map: &BucketMap, current: &OwnershipMap) -> OwnershipMap;
}

/// Every member is its own partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPartitioning;

impl PartitionAwareness for NoPartitioning {
    fn name(&self) -> &'static str {
        "partitioned"
    }

    fn on_founding(&mut self, _node: &NodeInfo) {}

    fn plan_join(&mut self, _node: &NodeInfo) -> JoinPlan {
        JoinPlan::Distribute
    }

    fn plan_leave(&mut self, _node: &NodeInfo) -> LeavePlan {
        LeavePlan::Distribute
    }

    fn on_member_joined(&mut self, _node: &NodeInfo) -> bool {
        true
    }

    fn on_member_left(&mut self, _node: &NodeInfo) -> Option<NodeAddress> {
        None
    }

    fn ownership_map(&self, map: &BucketMap, _current: &OwnershipMap) -> OwnershipMap {
        OwnershipMap::from_bucket_map(map)
    }
}

/// Subgroups of one coordinator and its replicas.
#[derive(Clone, Debug, Default)]
pub struct PartitionedReplicated {
    /// Subgroup → nodes, coordinator first.
    partitions: HashMap<String, Vec<NodeInfo>>,
    subgroups: HashMap<NodeAddress, String>,
}

impl PartitionedReplicated {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinator of `subgroup`, if it has any node.
    pub fn coordinator(&self, subgroup: &str) -> Option<NodeAddress> {
        self.partitions
            .get(subgroup)
            .and_then(|nodes| nodes.first())
            .map(|n| n.address)
    }

    /// Replicas of `subgroup` in join order.
    pub fn replicas(&self, subgroup: &str) -> Vec<NodeAddress> {
        self.partitions
            .get(subgroup)
            .map(|nodes| nodes.iter().skip(1).map(|n| n.address).collect())
            .unwrap_or_default()
    }

    pub fn subgroup_of(&self, address: &NodeAddress) -> Option<&str> {
        self.subgroups.get(address).map(String::as_str)
    }

    /// Add `node` to its subgroup. Returns true if it became the coordinator
    /// of a new subgroup.
    fn add_node(&mut self, node: &NodeInfo) -> bool {
        let subgroup = node.subgroup_or_address();
        self.subgroups.insert(node.address, subgroup.clone());
        match self.partitions.get_mut(&subgroup) {
            Some(nodes) => {
                if !nodes.iter().any(|n| n.address == node.address) {
                    let mut replica = node.clone();
                    replica.is_coordinator = false;
                    nodes.push(replica);
                }
                false
            }
            None => {
                let mut coordinator = node.clone();
                coordinator.is_coordinator = true;
                self.partitions.insert(subgroup, vec![coordinator]);
                true
            }
        }
    }

    /// Remove `node`. Returns the subgroup's remaining nodes, `None` if the
    /// subgroup is gone or unknown.
    fn remove_node(&mut self, node: &NodeInfo) -> Option<&mut Vec<NodeInfo>> {
        let subgroup = self
            .subgroups
            .remove(&node.address)
            .unwrap_or_else(|| node.subgroup_or_address());
        let nodes = self.partitions.get_mut(&subgroup)?;
        nodes.retain(|n| n.address != node.address);
        if nodes.is_empty() {
            self.partitions.remove(&subgroup);
            return None;
        }
        self.partitions.get_mut(&subgroup)
    }
}

impl PartitionAwareness for PartitionedReplicated {
    fn name(&self) -> &'static str {
        "partitioned-replica"
    }

    fn on_founding(&mut self, node: &NodeInfo) {
        self.add_node(node);
    }

    fn plan_join(&mut self, node: &NodeInfo) -> JoinPlan {
        if self.add_node(node) {
            JoinPlan::Distribute
        } else {
            debug!(node = %node.address, subgroup = ?node.subgroup, "replica joined");
            JoinPlan::ShadowOnly
        }
    }

    fn plan_leave(&mut self, node: &NodeInfo) -> LeavePlan {
        let was_coordinator = self
            .subgroup_of(&node.address)
            .and_then(|s| self.coordinator(s))
            .is_some_and(|c| c == node.address);

        let Some(remaining) = self.remove_node(node) else {
            return LeavePlan::Distribute;
        };
        if !was_coordinator {
            return LeavePlan::ShadowOnly;
        }

        let Some(next) = remaining.first_mut() else {
            return LeavePlan::Distribute;
        };
        next.is_coordinator = true;
        info!(old = %node.address, new = %next.address, "replica promoted to coordinator");
        LeavePlan::PromoteReplica {
            old: node.address,
            new: next.address,
        }
    }

    fn on_member_joined(&mut self, node: &NodeInfo) -> bool {
        self.add_node(node)
    }

    fn on_member_left(&mut self, node: &NodeInfo) -> Option<NodeAddress> {
        let remaining = self.remove_node(node)?;
        let coordinator = remaining.first_mut()?;
        coordinator.is_coordinator = true;
        Some(coordinator.address)
    }

    fn ownership_map(&self, map: &BucketMap, current: &OwnershipMap) -> OwnershipMap {
        let base = OwnershipMap::from_bucket_map(map);
        let mut expanded = OwnershipMap::new();

        for (owner, buckets) in base.iter() {
            let group = self
                .subgroups
                .get(owner)
                .and_then(|s| self.partitions.get(s));
            let Some(group) = group else {
                expanded.set_node(*owner, buckets.clone());
                continue;
            };

            for node in group {
                if node.address == *owner {
                    expanded.set_node(node.address, buckets.clone());
                    continue;
                }
                let list = expand_replica(*owner, node.address, buckets, current.node(&node.address));
                debug!(
                    replica = %node.address,
                    coordinator = %owner,
                    buckets = list.len(),
                    "replica ownership expanded"
                );
                expanded.set_node(node.address, list);
            }
        }
        expanded
    }
}

/// Bucket list of `replica` shadowing `coordinator`'s `buckets`.
///
/// Records the replica already has are kept while the coordinator still
/// owns the bucket; an unfinished one is retargeted at the coordinator. New
/// buckets are added as pending transfers from the coordinator.
fn expand_replica(
    coordinator: NodeAddress,
    replica: NodeAddress,
    buckets: &BTreeMap<usize, Bucket>,
    existing: Option<&BTreeMap<usize, Bucket>>,
) -> BTreeMap<usize, Bucket> {
    let mut list = BTreeMap::new();

    if let Some(existing) = existing {
        for (id, bucket) in existing {
            if !buckets.contains_key(id) {
                continue;
            }
            let mut kept = *bucket;
            if !kept.is_settled() {
                kept.permanent = coordinator;
            }
            list.insert(*id, kept);
        }
    }

    for (id, bucket) in buckets {
        list.entry(*id).or_insert_with(|| Bucket {
            id: bucket.id,
            permanent: coordinator,
            temporary: replica,
            status: BucketStatus::NeedTransfer,
        });
    }
    list
}

/// Hand `old`'s buckets to the replica `new` without moving data.
///
/// Buckets `old` owned move with their pending transfers intact; buckets
/// `old` was still receiving must now be fetched by `new`.
pub fn upgrade_to_coordinator_of_replica(
    map: &BucketMap,
    old: NodeAddress,
    new: NodeAddress,
) -> BucketMap {
    let mut planned = map.clone();
    for bucket in planned.iter_mut() {
        if bucket.permanent == old {
            bucket.permanent = new;
            if bucket.temporary == old {
                bucket.temporary = new;
            }
        } else if bucket.temporary == old {
            bucket.temporary = new;
            bucket.status = BucketStatus::NeedTransfer;
        }
    }
    planned
}
