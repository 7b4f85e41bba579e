//! Bucket records and the cluster-wide bucket map.

use crate::bucket::status::BucketStatus;
use crate::error::{Error, Result};
use crate::node::NodeAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ownership record of one bucket.
///
/// Plain value: an update replaces the record in its map instead of
/// mutating state shared with other maps.
///
/// # Invariants
///
/// - `temporary` drives request routing
/// - `permanent` only changes when a transfer is released
/// - `permanent == temporary` whenever `status` is `Functional` after a release
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    pub id: usize,
    /// Authoritative owner once any transfer completes.
    pub permanent: NodeAddress,
    /// Node currently serving or receiving the bucket.
    pub temporary: NodeAddress,
    pub status: BucketStatus,
}

impl Bucket {
    /// A functional bucket fully owned by `owner`.
    pub fn new(id: usize, owner: NodeAddress) -> Self {
        Self {
            id,
            permanent: owner,
            temporary: owner,
            status: BucketStatus::Functional,
        }
    }

    /// No transfer in flight: both owners agree.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.permanent == self.temporary
    }

    /// Assign a new temporary owner, marking the bucket for transfer when the
    /// owner actually changes.
    pub fn reassign(&mut self, owner: NodeAddress) {
        if self.temporary != owner {
            self.status = BucketStatus::NeedTransfer;
        }
        self.temporary = owner;
    }

    /// Drop a pending transfer and hand the bucket back to its permanent owner.
    pub fn revert(&mut self) {
        self.temporary = self.permanent;
        self.status = BucketStatus::Functional;
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bucket[{} ; {} ; {} ; {}]",
            self.id, self.permanent, self.temporary, self.status
        )
    }
}

/// Fixed-size map of buckets indexed directly by bucket id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketMap {
    buckets: Vec<Bucket>,
}

impl BucketMap {
    /// Map of `total` functional buckets all owned by the founding node.
    pub fn founding(owner: NodeAddress, total: usize) -> Self {
        Self {
            buckets: (0..total).map(|id| Bucket::new(id, owner)).collect(),
        }
    }

    /// Build from records, checking that slot `i` holds bucket `i`.
    pub fn from_buckets(buckets: Vec<Bucket>) -> Result<Self> {
        let total = buckets.len();
        if let Some(misplaced) = buckets.iter().enumerate().find(|(i, b)| b.id != *i) {
            return Err(Error::InvalidBucket {
                id: misplaced.1.id,
                total,
            });
        }
        Ok(Self { buckets })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    #[inline]
    pub fn get(&self, id: usize) -> Option<&Bucket> {
        self.buckets.get(id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Bucket> {
        self.buckets.get_mut(id)
    }

    /// Bucket `id`, or `InvalidBucket` when out of range.
    pub fn bucket(&self, id: usize) -> Result<&Bucket> {
        let total = self.len();
        self.buckets.get(id).ok_or(Error::InvalidBucket { id, total })
    }

    pub fn bucket_mut(&mut self, id: usize) -> Result<&mut Bucket> {
        let total = self.len();
        self.buckets
            .get_mut(id)
            .ok_or(Error::InvalidBucket { id, total })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bucket> {
        self.buckets.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Bucket> {
        self.buckets.iter_mut()
    }

    /// True when no bucket has a transfer in flight.
    pub fn all_settled(&self) -> bool {
        self.buckets.iter().all(Bucket::is_settled)
    }

    /// Number of buckets whose permanent owner is `node`.
    pub fn permanent_count(&self, node: &NodeAddress) -> usize {
        self.buckets.iter().filter(|b| b.permanent == *node).count()
    }

    /// Number of buckets whose temporary owner is `node`.
    pub fn temporary_count(&self, node: &NodeAddress) -> usize {
        self.buckets.iter().filter(|b| b.temporary == *node).count()
    }

    /// Assign `bucket_ids` to `owner` as temporary owner (join hand-over).
    pub fn change_ownership(&mut self, bucket_ids: &[usize], owner: NodeAddress) -> Result<()> {
        for &id in bucket_ids {
            let bucket = self.bucket_mut(id)?;
            bucket.temporary = owner;
            bucket.status = BucketStatus::NeedTransfer;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a BucketMap {
    type Item = &'a Bucket;
    type IntoIter = std::slice::Iter<'a, Bucket>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.iter()
    }
}
