//! SipHash-1-3 partitioner (default).

use crate::partitioner::traits::Partitioner;
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Partitioner hashing keys with SipHash-1-3 under fixed zero keys, so every
/// node of the cluster maps a key to the same bucket.
#[derive(Clone, Debug, Default)]
pub struct SipPartitioner;

impl Partitioner for SipPartitioner {
    fn hash_code(&self, key: &[u8]) -> i32 {
        let mut hasher = SipHasher13::new();
        hasher.write(key);
        let hash = hasher.finish();
        (hash ^ (hash >> 32)) as u32 as i32
    }

    fn name(&self) -> &'static str {
        "SipPartitioner"
    }
}
