//! Index of buckets grouped by their current owner.

use crate::bucket::record::{Bucket, BucketMap};
use crate::node::NodeAddress;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Owner → buckets it currently serves, keyed by bucket id.
///
/// Derived from a [`BucketMap`] and rebuilt whenever that map changes. In
/// partitioned-replica mode a replica's entries shadow its coordinator's
/// buckets with their own addresses, so the records here may differ from
/// the ones in the bucket map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipMap {
    nodes: HashMap<NodeAddress, BTreeMap<usize, Bucket>>,
}

impl OwnershipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group every bucket of `map` under its temporary owner.
    pub fn from_bucket_map(map: &BucketMap) -> Self {
        let mut ownership = Self::new();
        for bucket in map {
            ownership.insert(bucket.temporary, *bucket);
        }
        ownership
    }

    /// Add `bucket` to `owner`'s list; an existing record for the same id is
    /// kept.
    pub fn insert(&mut self, owner: NodeAddress, bucket: Bucket) {
        self.nodes
            .entry(owner)
            .or_default()
            .entry(bucket.id)
            .or_insert(bucket);
    }

    /// Replace `owner`'s whole list.
    pub fn set_node(&mut self, owner: NodeAddress, buckets: BTreeMap<usize, Bucket>) {
        self.nodes.insert(owner, buckets);
    }

    pub fn node(&self, owner: &NodeAddress) -> Option<&BTreeMap<usize, Bucket>> {
        self.nodes.get(owner)
    }

    /// Record of `bucket_id` in `owner`'s list.
    #[inline]
    pub fn find(&self, owner: &NodeAddress, bucket_id: usize) -> Option<&Bucket> {
        self.nodes.get(owner).and_then(|b| b.get(&bucket_id))
    }

    pub fn find_mut(&mut self, owner: &NodeAddress, bucket_id: usize) -> Option<&mut Bucket> {
        self.nodes.get_mut(owner).and_then(|b| b.get_mut(&bucket_id))
    }

    /// Clone of `owner`'s buckets in id order.
    pub fn buckets_of(&self, owner: &NodeAddress) -> Option<Vec<Bucket>> {
        self.nodes.get(owner).map(|b| b.values().copied().collect())
    }

    pub fn owners(&self) -> impl Iterator<Item = &NodeAddress> {
        self.nodes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeAddress, &BTreeMap<usize, Bucket>)> {
        self.nodes.iter()
    }

    pub fn contains_owner(&self, owner: &NodeAddress) -> bool {
        self.nodes.contains_key(owner)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of records across all owners.
    pub fn bucket_count(&self) -> usize {
        self.nodes.values().map(BTreeMap::len).sum()
    }
}
