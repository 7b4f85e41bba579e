//! XXH3 partitioner.

use crate::partitioner::traits::Partitioner;
use xxhash_rust::xxh3::xxh3_64;

/// Partitioner using XXH3; faster than SipHash on long keys.
#[derive(Clone, Debug, Default)]
pub struct Xxh3Partitioner;

impl Partitioner for Xxh3Partitioner {
    fn hash_code(&self, key: &[u8]) -> i32 {
        let hash = xxh3_64(key);
        (hash ^ (hash >> 32)) as u32 as i32
    }

    fn name(&self) -> &'static str {
        "Xxh3Partitioner"
    }
}
