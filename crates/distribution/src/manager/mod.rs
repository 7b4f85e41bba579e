//! Stateful façade over the bucket maps.
//!
//! [`DistributionManager`] owns the installed map used for routing, the map
//! being planned, the ownership index and the bucket statistics, all behind
//! one reader-writer lock:
//!
//! ```text
//!  membership change ──▶ get_maps ──▶ install_hash_map ──▶ select_node
//!                        (write)       (write)              (read)
//!                                         │
//!  state transfer ──▶ lock_buckets ──▶ release_buckets ──▶ waiters woken
//! ```
//!
//! Planning runs under the write lock for its whole duration, so key
//! routing pauses while a new map is computed.
//!
//! Status waiters block on a separate mutex and condvar; they are notified
//! only after the write lock is released.

pub mod partition;

use crate::balance::BalanceNodeMgr;
use crate::bucket::{
    Bucket, BucketMap, BucketStatsTable, BucketStatus, OwnershipMap, StatusLatch,
};
use crate::config::DistributionConfig;
use crate::distribute::{balance_buckets, distribute_orphan_buckets};
use crate::error::{Error, Result};
use crate::maps::{ClusterActivity, DistributionInfo, DistributionMaps};
use crate::node::{NodeAddress, NodeInfo};
use crate::partitioner::{bucket_for_hash, bucket_size, Partitioner, SipPartitioner};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub use partition::{
    upgrade_to_coordinator_of_replica, JoinPlan, LeavePlan, NoPartitioning, PartitionAwareness,
    PartitionedReplicated,
};

/// Outcome of [`DistributionManager::lock_buckets`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketLockResult {
    /// Buckets now under state transfer for the requester.
    pub lock_acquired: Vec<usize>,
    /// Buckets whose temporary owner is no longer the requester.
    pub owner_changed: Vec<usize>,
}

/// Node holding noticeably more data than the cluster average.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CandidateNode {
    pub node: NodeAddress,
    pub percent_above_avg: i64,
}

struct DistributionState {
    installed: Option<BucketMap>,
    last_created: Option<BucketMap>,
    ownership: OwnershipMap,
    stats: BucketStatsTable,
    members: Vec<NodeAddress>,
    local_address: Option<NodeAddress>,
    awareness: Box<dyn PartitionAwareness>,
}

impl DistributionState {
    fn total_data_size(&self) -> i64 {
        self.stats.values().map(|s| s.data_size).sum()
    }

    fn avg_data_size(&self) -> i64 {
        if self.members.is_empty() {
            return 0;
        }
        self.total_data_size() / self.members.len() as i64
    }

    fn data_size_per_node(&self) -> HashMap<NodeAddress, i64> {
        let mut sizes = HashMap::new();
        let Some(map) = self.last_created.as_ref().or(self.installed.as_ref()) else {
            return sizes;
        };
        for bucket in map {
            let size = self.stats.get(&bucket.id).map_or(0, |s| s.data_size);
            *sizes.entry(bucket.temporary).or_insert(0) += size;
        }
        sizes
    }

    fn add_member(&mut self, address: NodeAddress) {
        if !self.members.contains(&address) {
            self.members.push(address);
        }
    }
}

/// Tracks bucket ownership for one cache node and plans new maps when
/// membership or load changes.
pub struct DistributionManager {
    config: DistributionConfig,
    partitioner: Box<dyn Partitioner>,
    bucket_size: u32,
    state: RwLock<DistributionState>,
    latches: Vec<StatusLatch>,
    status_wait: Mutex<()>,
    status_changed: Condvar,
}

impl DistributionManager {
    /// Manager for a plain partitioned cluster.
    pub fn new(config: DistributionConfig) -> Result<Self> {
        Self::with_awareness(config, Box::new(NoPartitioning))
    }

    /// Manager for a partitioned cluster where every subgroup has a
    /// coordinator and replicas.
    pub fn partitioned_replicated(config: DistributionConfig) -> Result<Self> {
        Self::with_awareness(config, Box::new(PartitionedReplicated::new()))
    }

    pub fn with_awareness(
        config: DistributionConfig,
        awareness: Box<dyn PartitionAwareness>,
    ) -> Result<Self> {
        config.validate()?;
        let total = config.total_buckets;
        debug!(total_buckets = total, awareness = awareness.name(), "distribution manager created");
        Ok(Self {
            bucket_size: bucket_size(total),
            partitioner: Box::new(SipPartitioner),
            state: RwLock::new(DistributionState {
                installed: None,
                last_created: None,
                ownership: OwnershipMap::new(),
                stats: BucketStatsTable::new(),
                members: Vec::new(),
                local_address: None,
                awareness,
            }),
            latches: (0..total)
                .map(|_| StatusLatch::with_status(BucketStatus::Functional))
                .collect(),
            status_wait: Mutex::new(()),
            status_changed: Condvar::new(),
            config,
        })
    }

    /// Replace the key partitioner.
    pub fn with_partitioner(mut self, partitioner: Box<dyn Partitioner>) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    /// Width of one bucket's slice of the hash code range.
    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    pub fn total_buckets(&self) -> usize {
        self.config.total_buckets
    }

    /// Bucket a key falls into.
    #[inline]
    pub fn bucket_id<K: AsRef<[u8]> + ?Sized>(&self, key: &K) -> usize {
        let hash = self.partitioner.hash_code(key.as_ref());
        bucket_for_hash(hash, self.bucket_size, self.config.total_buckets)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub fn local_address(&self) -> Option<NodeAddress> {
        self.state.read().local_address
    }

    pub fn set_local_address(&self, address: NodeAddress) {
        self.state.write().local_address = Some(address);
    }

    /// Members that own buckets.
    pub fn members(&self) -> Vec<NodeAddress> {
        self.state.read().members.clone()
    }

    /// Record a join on a node that does not plan maps itself.
    pub fn on_member_joined(&self, node: &NodeInfo) {
        let mut state = self.state.write();
        if state.awareness.on_member_joined(node) {
            state.add_member(node.address);
        }
    }

    /// Record a leave on a node that does not plan maps itself.
    pub fn on_member_left(&self, node: &NodeInfo) {
        let mut state = self.state.write();
        state.members.retain(|m| *m != node.address);
        if let Some(coordinator) = state.awareness.on_member_left(node) {
            state.add_member(coordinator);
        }
    }

    // ------------------------------------------------------------------
    // Planning
    // ------------------------------------------------------------------

    /// Plan new maps for a membership change or a balance tick.
    ///
    /// The first call founds the cluster: every bucket goes to the affected
    /// node. Planning works on a copy of the last planned map; nothing is
    /// routed differently until the result is installed.
    pub fn get_maps(&self, info: &DistributionInfo) -> Result<DistributionMaps> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let node = &info.affected_node;

        if state.installed.is_none() {
            let map = BucketMap::founding(node.address, self.config.total_buckets);
            state.add_member(node.address);
            state.awareness.on_founding(node);
            let ownership = state.awareness.ownership_map(&map, &state.ownership);
            state.last_created = Some(map.clone());
            info!(node = %node.address, buckets = map.len(), "cluster founded");
            return Ok(DistributionMaps::new(map, ownership));
        }

        let base = match (&state.last_created, &state.installed) {
            (Some(last), _) => last.clone(),
            (None, Some(installed)) => installed.clone(),
            (None, None) => return Err(Error::MapNotInstalled),
        };

        let planned = match info.activity {
            ClusterActivity::NodeJoin if state.members.contains(&node.address) => {
                warn!(node = %node.address, "join for an existing member, map unchanged");
                base
            }
            ClusterActivity::NodeJoin => match state.awareness.plan_join(node) {
                JoinPlan::Distribute => {
                    let selection =
                        balance_buckets(info, &base, &state.stats, &state.members, &self.config);
                    let mut map = base;
                    map.change_ownership(&selection.bucket_ids, node.address)?;
                    state.add_member(node.address);
                    info!(
                        node = %node.address,
                        buckets = selection.bucket_ids.len(),
                        mode = %selection.mode,
                        "new map planned for joining node"
                    );
                    map
                }
                JoinPlan::ShadowOnly => base,
            },
            ClusterActivity::NodeLeave => {
                let mut remaining: Vec<NodeAddress> = state
                    .members
                    .iter()
                    .copied()
                    .filter(|m| *m != node.address)
                    .collect();
                let map = match state.awareness.plan_leave(node) {
                    LeavePlan::Distribute => {
                        distribute_orphan_buckets(&base, node.address, &remaining)?
                    }
                    LeavePlan::PromoteReplica { old, new } => {
                        if !remaining.contains(&new) {
                            remaining.push(new);
                        }
                        upgrade_to_coordinator_of_replica(&base, old, new)
                    }
                    LeavePlan::ShadowOnly => base,
                };
                info!(node = %node.address, remaining = remaining.len(), "new map planned for leaving node");
                state.members = remaining;
                map
            }
            ClusterActivity::None => {
                let result = BalanceNodeMgr::new(&self.config).balance_nodes(
                    info,
                    &base,
                    &state.stats,
                    &state.members,
                );
                match result.hash_map {
                    Some(map) => map,
                    None => return Ok(result),
                }
            }
        };

        let ownership = state.awareness.ownership_map(&planned, &state.ownership);
        state.last_created = Some(planned.clone());
        Ok(DistributionMaps::new(planned, ownership))
    }

    /// Make `maps` the live distribution.
    ///
    /// A bucket whose permanent owner differs while its temporary owner is
    /// the same is inconsistent; it is logged and keeps its installed
    /// record. Members listed in `left` are dropped from the member list.
    pub fn install_hash_map(&self, maps: &DistributionMaps, left: &[NodeAddress]) -> Result<()> {
        let (Some(new_map), Some(ownership)) = (&maps.hash_map, &maps.ownership) else {
            debug!(result = ?maps.result, "nothing to install");
            return Ok(());
        };
        if new_map.len() != self.config.total_buckets {
            return Err(Error::BucketCountMismatch {
                expected: self.config.total_buckets,
                actual: new_map.len(),
            });
        }

        {
            let mut guard = self.state.write();
            let state = &mut *guard;

            match state.installed.as_mut() {
                Some(installed) => {
                    let mut skipped = 0;
                    for new_bucket in new_map {
                        let old = installed.bucket_mut(new_bucket.id)?;
                        if old.permanent != new_bucket.permanent
                            && old.temporary == new_bucket.temporary
                        {
                            error!(
                                bucket_id = new_bucket.id,
                                old_permanent = %old.permanent,
                                old_temporary = %old.temporary,
                                new_permanent = %new_bucket.permanent,
                                new_temporary = %new_bucket.temporary,
                                "inconsistent bucket ownership, keeping installed record"
                            );
                            skipped += 1;
                            continue;
                        }
                        *old = *new_bucket;
                    }
                    info!(skipped, "hash map installed");
                }
                None => {
                    state.installed = Some(new_map.clone());
                    info!("first hash map installed");
                }
            }

            state.ownership = ownership.clone();
            if !left.is_empty() {
                state.members.retain(|m| !left.contains(m));
            }
            if let Some(installed) = &state.installed {
                self.sync_latches(installed.iter());
            }
        }

        self.notify_bucket_update();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Node that serves `key`, or `None` before any map is installed.
    ///
    /// Retries a few times when the installed map is caught mid-update.
    pub fn select_node<K: AsRef<[u8]> + ?Sized>(&self, key: &K) -> Result<Option<NodeAddress>> {
        let attempts = self.config.select_retries;
        let mut attempt = 1;
        loop {
            match self.select_node_once(key.as_ref()) {
                Ok(node) => return Ok(node),
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!(attempt, error = %e, "routing retry");
                    thread::sleep(self.config.select_retry_delay);
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(attempts, error = %e, "routing failed");
                    return Err(Error::RoutingFailed { attempts });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn select_node_once(&self, key: &[u8]) -> Result<Option<NodeAddress>> {
        let id = self.bucket_id(key);
        let state = self.state.read();
        let Some(installed) = &state.installed else {
            return Ok(None);
        };
        let bucket = installed.bucket(id)?;

        // Until a transfer completes the owned record points at the node
        // still holding the data.
        if !state.ownership.contains_owner(&bucket.temporary) {
            warn!(bucket_id = id, owner = %bucket.temporary, "owner missing from ownership map");
            return Ok(Some(bucket.permanent));
        }
        Ok(Some(
            state
                .ownership
                .find(&bucket.temporary, id)
                .map_or(bucket.permanent, |owned| owned.permanent),
        ))
    }

    /// True if `owner` serves the key's bucket and it is not moving.
    pub fn is_bucket_functional<K: AsRef<[u8]> + ?Sized>(&self, owner: &NodeAddress, key: &K) -> bool {
        let id = self.bucket_id(key);
        self.state
            .read()
            .ownership
            .find(owner, id)
            .is_some_and(|b| b.status == BucketStatus::Functional)
    }

    // ------------------------------------------------------------------
    // State transfer
    // ------------------------------------------------------------------

    /// Lock buckets for `requesting` before it copies their data.
    ///
    /// Buckets whose temporary owner is no longer `requesting` are reported
    /// in `owner_changed`; the caller must not copy them.
    pub fn lock_buckets(&self, bucket_ids: &[usize], requesting: NodeAddress) -> Result<BucketLockResult> {
        let mut result = BucketLockResult::default();
        let mut guard = self.state.write();
        let state = &mut *guard;
        let installed = state.installed.as_mut().ok_or(Error::MapNotInstalled)?;
        for &id in bucket_ids {
            installed.bucket(id)?;
        }

        for &id in bucket_ids {
            let bucket = installed.bucket_mut(id)?;
            if bucket.temporary == requesting {
                bucket.status = BucketStatus::UnderStateTransfer;
                info!(bucket_id = id, node = %requesting, "bucket lock acquired");
                if !result.lock_acquired.contains(&id) {
                    result.lock_acquired.push(id);
                }
            } else if !result.owner_changed.contains(&id) {
                info!(bucket_id = id, new_owner = %bucket.temporary, "bucket owner changed");
                result.owner_changed.push(id);
            }
        }

        Self::mark_under_transfer(state, &result.lock_acquired, requesting);
        if let Some(installed) = &state.installed {
            self.sync_latches(result.lock_acquired.iter().filter_map(|&id| installed.get(id)));
        }
        Ok(result)
    }

    /// Lock buckets for `node` without reporting ownership changes.
    pub fn change_bucket_status_to_state_transfer(&self, bucket_ids: &[usize], node: NodeAddress) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let installed = state.installed.as_mut().ok_or(Error::MapNotInstalled)?;

        let mut locked = Vec::with_capacity(bucket_ids.len());
        for &id in bucket_ids {
            let bucket = installed.bucket_mut(id)?;
            if bucket.temporary == node {
                bucket.status = BucketStatus::UnderStateTransfer;
                debug!(bucket = %bucket, "bucket status changed");
                locked.push(id);
            }
        }

        Self::mark_under_transfer(state, &locked, node);
        if let Some(installed) = &state.installed {
            self.sync_latches(locked.iter().filter_map(|&id| installed.get(id)));
        }
        Ok(())
    }

    /// Mirror a lock into the planned map and the ownership index.
    fn mark_under_transfer(state: &mut DistributionState, ids: &[usize], node: NodeAddress) {
        for &id in ids {
            if let Some(bucket) = state.last_created.as_mut().and_then(|m| m.get_mut(id)) {
                if bucket.temporary == node {
                    bucket.status = BucketStatus::UnderStateTransfer;
                }
            }
            if let Some(bucket) = state.ownership.find_mut(&node, id) {
                if bucket.temporary == node {
                    bucket.status = BucketStatus::UnderStateTransfer;
                }
            }
        }
    }

    /// Finish the transfer of buckets copied by `requesting`.
    ///
    /// Best effort: unknown buckets and a missing map are logged and
    /// skipped. Returns the number of buckets released.
    pub fn release_buckets(&self, bucket_ids: &[usize], requesting: NodeAddress) -> usize {
        let mut released = Vec::with_capacity(bucket_ids.len());
        {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let Some(installed) = state.installed.as_mut() else {
                debug!(node = %requesting, "release before any map was installed");
                return 0;
            };

            for &id in bucket_ids {
                let Some(bucket) = installed.get_mut(id) else {
                    warn!(bucket_id = id, "release of unknown bucket");
                    continue;
                };
                if bucket.temporary == requesting {
                    bucket.status = BucketStatus::Functional;
                    bucket.permanent = requesting;
                    released.push(id);
                }
            }

            for &id in bucket_ids {
                if let Some(bucket) = state.last_created.as_mut().and_then(|m| m.get_mut(id)) {
                    if bucket.temporary == requesting {
                        bucket.status = BucketStatus::Functional;
                        bucket.permanent = requesting;
                    }
                }
                if let Some(bucket) = state.ownership.find_mut(&requesting, id) {
                    if bucket.temporary == requesting {
                        bucket.status = BucketStatus::Functional;
                        bucket.permanent = requesting;
                    }
                }
            }

            if let Some(installed) = &state.installed {
                self.sync_latches(released.iter().filter_map(|&id| installed.get(id)));
            }
            debug!(node = %requesting, released = released.len(), "buckets released");
        }

        self.notify_bucket_update();
        released.len()
    }

    /// Mark a bucket's latch functional without touching its owners.
    pub fn set_bucket_functional(&self, bucket_id: usize) -> Result<()> {
        let latch = self.latch(bucket_id)?;
        latch.set_status_bit(BucketStatus::Functional.bit(), BucketStatus::UnderStateTransfer.bit());
        Ok(())
    }

    pub fn verify_temporary_ownership(&self, bucket_id: usize, owner: &NodeAddress) -> bool {
        self.state
            .read()
            .installed
            .as_ref()
            .and_then(|m| m.get(bucket_id))
            .is_some_and(|b| b.temporary == *owner)
    }

    pub fn verify_permanent_ownership(&self, bucket_id: usize, owner: &NodeAddress) -> bool {
        self.state
            .read()
            .installed
            .as_ref()
            .and_then(|m| m.get(bucket_id))
            .is_some_and(|b| b.permanent == *owner)
    }

    /// True while any installed bucket is assigned or being copied.
    pub fn in_state_transfer(&self) -> bool {
        self.state
            .read()
            .installed
            .as_ref()
            .is_some_and(|m| m.iter().any(|b| b.status != BucketStatus::Functional))
    }

    // ------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------

    /// Block until the bucket's latch reports `Functional`.
    pub fn wait_for_bucket_to_be_functional(&self, bucket_id: usize) -> Result<()> {
        self.wait_for_latch(bucket_id, BucketStatus::Functional.bit())
    }

    /// Block until the key's bucket can serve requests, i.e. it is not
    /// locked for state transfer.
    pub fn wait<K: AsRef<[u8]> + ?Sized>(&self, key: &K) -> Result<()> {
        if self.state.read().installed.is_none() {
            error!("wait before any map was installed");
            return Err(Error::MapNotInstalled);
        }
        let id = self.bucket_id(key);
        self.wait_for_latch(
            id,
            BucketStatus::Functional.bit() | BucketStatus::NeedTransfer.bit(),
        )
    }

    fn wait_for_latch(&self, bucket_id: usize, mask: u8) -> Result<()> {
        let latch = self.latch(bucket_id)?;
        if latch.wait_for_any(mask, self.config.wait_timeout) {
            Ok(())
        } else {
            Err(Error::WaitTimeout { bucket_id })
        }
    }

    /// Block until bucket `bucket_id` reaches `status`, or until `owner` is
    /// no longer its temporary owner.
    ///
    /// Must not be called from the thread that will release the bucket.
    /// `timeout` of `None` waits forever.
    pub fn wait_for_bucket_status(
        &self,
        bucket_id: usize,
        status: BucketStatus,
        owner: &NodeAddress,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let latch = self.latch(bucket_id)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let done = || {
            let temporary = self
                .state
                .read()
                .installed
                .as_ref()
                .and_then(|m| m.get(bucket_id))
                .map(|b| b.temporary);
            match temporary {
                None => true,
                Some(temporary) => latch.is_any_bits_set(status.bit()) || temporary != *owner,
            }
        };

        let mut guard = self.status_wait.lock();
        while !done() {
            match deadline {
                Some(deadline) => {
                    if self.status_changed.wait_until(&mut guard, deadline).timed_out() && !done() {
                        return Err(Error::WaitTimeout { bucket_id });
                    }
                }
                None => self.status_changed.wait(&mut guard),
            }
        }
        Ok(())
    }

    /// Wake every status waiter so it re-checks its condition.
    pub fn notify_bucket_update(&self) {
        let _guard = self.status_wait.lock();
        self.status_changed.notify_all();
    }

    fn latch(&self, bucket_id: usize) -> Result<&StatusLatch> {
        self.latches.get(bucket_id).ok_or(Error::InvalidBucket {
            id: bucket_id,
            total: self.latches.len(),
        })
    }

    fn sync_latches<'a>(&self, buckets: impl Iterator<Item = &'a Bucket>) {
        for bucket in buckets {
            if let Some(latch) = self.latches.get(bucket.id) {
                if latch.bits() != bucket.status.bit() {
                    latch.set_status(bucket.status);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Copy of the live map.
    pub fn installed_map(&self) -> Option<BucketMap> {
        self.state.read().installed.clone()
    }

    /// Copy of the last planned map.
    pub fn last_created_map(&self) -> Option<BucketMap> {
        self.state.read().last_created.clone()
    }

    /// Replace the map the next planning pass starts from.
    ///
    /// Used when coordination moves to this node and it must continue from
    /// a map planned elsewhere.
    pub fn set_last_created_map(&self, map: BucketMap) {
        self.state.write().last_created = Some(map);
    }

    /// Copy of the live ownership index.
    pub fn ownership_map(&self) -> OwnershipMap {
        self.state.read().ownership.clone()
    }

    /// Ownership index `map` would have, given the live one.
    pub fn buckets_ownership_map(&self, map: &BucketMap) -> OwnershipMap {
        let state = self.state.read();
        state.awareness.ownership_map(map, &state.ownership)
    }

    /// Ids of buckets this node serves or owns, ascending.
    pub fn bucket_ids_owned_by_me(&self) -> Vec<usize> {
        let state = self.state.read();
        let Some(local) = state.local_address else {
            return Vec::new();
        };
        let mut ids = BTreeSet::new();
        for (_, buckets) in state.ownership.iter() {
            for bucket in buckets.values() {
                if bucket.temporary == local || bucket.permanent == local {
                    ids.insert(bucket.id);
                }
            }
        }
        ids.into_iter().collect()
    }

    /// Buckets listed for `node` in the ownership index.
    pub fn buckets_list(&self, node: &NodeAddress) -> Option<Vec<Bucket>> {
        self.state.read().ownership.buckets_of(node)
    }

    /// Bucket id → client-facing address of the node to contact.
    ///
    /// Settled buckets report their permanent owner, moving ones their
    /// temporary owner. `renderers` maps cluster addresses to the address
    /// clients use; nodes without a renderer map to an empty string.
    pub fn owner_hash_map_table(
        &self,
        renderers: &HashMap<NodeAddress, NodeAddress>,
    ) -> BTreeMap<usize, String> {
        let state = self.state.read();
        let Some(installed) = &state.installed else {
            return BTreeMap::new();
        };
        installed
            .iter()
            .map(|bucket| {
                let owner = match bucket.status {
                    BucketStatus::Functional => bucket.permanent,
                    BucketStatus::NeedTransfer | BucketStatus::UnderStateTransfer => bucket.temporary,
                };
                (bucket.id, server_address(renderers, &owner))
            })
            .collect()
    }

    /// Permanent owners of everything `active` servers hold, plus the
    /// servers themselves.
    pub fn permanent_addresses(&self, active: &[NodeAddress]) -> Vec<NodeAddress> {
        let state = self.state.read();
        let mut list = Vec::new();
        for server in active {
            if let Some(buckets) = state.ownership.node(server) {
                for bucket in buckets.values() {
                    if !list.contains(&bucket.permanent) {
                        list.push(bucket.permanent);
                    }
                }
            }
            if !list.contains(server) {
                list.push(*server);
            }
        }
        list
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn bucket_stats(&self) -> BucketStatsTable {
        self.state.read().stats.clone()
    }

    /// Replace the whole statistics table.
    pub fn set_bucket_stats(&self, stats: BucketStatsTable) {
        self.state.write().stats = stats;
    }

    /// Merge statistics reported by `node`.
    ///
    /// Only figures for buckets `node` permanently owns are accepted, so a
    /// temporary owner cannot overwrite the permanent owner's numbers.
    pub fn update_bucket_stats(&self, node: &NodeAddress, reported: &BucketStatsTable) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let Some(installed) = &state.installed else {
            debug!(node = %node, "stats ignored, no map installed");
            return;
        };
        let mut accepted = 0;
        for (id, stats) in reported {
            if installed.get(*id).is_some_and(|b| b.permanent == *node) {
                state.stats.insert(*id, *stats);
                accepted += 1;
            }
        }
        debug!(node = %node, accepted, reported = reported.len(), "bucket stats updated");
    }

    pub fn total_data_size(&self) -> i64 {
        self.state.read().total_data_size()
    }

    /// Total data size over the member count, 0 without members.
    pub fn avg_data_size(&self) -> i64 {
        self.state.read().avg_data_size()
    }

    /// Data served by each node, from the last planned map when present.
    pub fn data_size_per_node(&self) -> HashMap<NodeAddress, i64> {
        self.state.read().data_size_per_node()
    }

    /// Nodes above the average by more than the auto-balancing threshold,
    /// most loaded first.
    pub fn candidate_nodes_for_balance(&self) -> Vec<CandidateNode> {
        let state = self.state.read();
        let avg = state.avg_data_size();
        if avg <= 0 {
            return Vec::new();
        }
        let threshold = i64::from(self.config.auto_balancing_threshold);
        let mut candidates: Vec<CandidateNode> = state
            .data_size_per_node()
            .into_iter()
            .filter(|(_, size)| *size > avg)
            .map(|(node, size)| CandidateNode {
                node,
                percent_above_avg: (size - avg) * 100 / avg,
            })
            .filter(|c| c.percent_above_avg > threshold)
            .collect();
        candidates.sort_by(|a, b| {
            b.percent_above_avg
                .cmp(&a.percent_above_avg)
                .then_with(|| a.node.cmp(&b.node))
        });
        info!(avg_data_size = avg, candidates = candidates.len(), "load balancing candidates");
        candidates
    }
}

impl fmt::Debug for DistributionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("DistributionManager")
            .field("total_buckets", &self.config.total_buckets)
            .field("partitioner", &self.partitioner.name())
            .field("awareness", &state.awareness.name())
            .field("members", &state.members)
            .field("installed", &state.installed.is_some())
            .finish()
    }
}

impl fmt::Display for DistributionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        if let Some(installed) = &state.installed {
            for bucket in installed {
                writeln!(f, "Key: {}\tValue: {}", bucket.id, bucket)?;
            }
        }
        Ok(())
    }
}

/// Client-facing IP of `owner`, empty when it has no renderer.
fn server_address(renderers: &HashMap<NodeAddress, NodeAddress>, owner: &NodeAddress) -> String {
    renderers
        .get(owner)
        .map(|renderer| renderer.ip().to_string())
        .unwrap_or_default()
}
