//! Core partitioner trait definitions.

/// A partitioner converts cache keys into signed 32-bit hash codes.
///
/// Partitioners are stateless and thread-safe, allowing concurrent key
/// routing without synchronization overhead.
pub trait Partitioner: Send + Sync + std::fmt::Debug + 'static {
    /// Hash a key into the full `i32` range.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to partition
    fn hash_code(&self, key: &[u8]) -> i32;

    /// Returns the name of this partitioner.
    fn name(&self) -> &'static str;
}

/// Width of one bucket's slice of the hash code range.
///
/// The `i32` magnitude range (2^31) is divided evenly into `total_buckets`
/// contiguous slices, rounded up so every hash code lands in a bucket.
pub fn bucket_size(total_buckets: usize) -> u32 {
    let range = (i32::MIN as i64).unsigned_abs();
    range.div_ceil(total_buckets.max(1) as u64) as u32
}

/// Map a hash code onto its bucket id, sign-normalized.
///
/// Clamped to the last bucket so the extreme `i32::MIN` code stays in range
/// for bucket counts that do not divide 2^31 exactly.
#[inline]
pub fn bucket_for_hash(hash_code: i32, bucket_size: u32, total_buckets: usize) -> usize {
    let index = (i64::from(hash_code) / i64::from(bucket_size.max(1))).unsigned_abs() as usize;
    index.min(total_buckets.saturating_sub(1))
}
