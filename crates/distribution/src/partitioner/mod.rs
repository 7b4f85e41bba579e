//! Partitioner abstraction for key routing.
//!
//! Partitioners turn keys into hash codes; the code's position in the
//! `i32` range selects one of the fixed buckets.

pub mod sip;
pub mod traits;
pub mod xxh3;

pub use sip::SipPartitioner;
pub use traits::{bucket_for_hash, bucket_size, Partitioner};
pub use xxh3::Xxh3Partitioner;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_size_for_default_cluster() {
        // ceil(2^31 / 1000)
        assert_eq!(bucket_size(1000), 2_147_484);
    }

    #[test]
    fn test_bucket_for_hash_is_sign_normalized() {
        let size = bucket_size(1000);
        assert_eq!(bucket_for_hash(0, size, 1000), 0);
        assert_eq!(bucket_for_hash(i32::MAX, size, 1000), 999);
        assert_eq!(bucket_for_hash(i32::MIN, size, 1000), 999);
        assert_eq!(
            bucket_for_hash(-5 * size as i32, size, 1000),
            bucket_for_hash(5 * size as i32, size, 1000)
        );
    }

    #[test]
    fn test_small_bucket_counts_stay_in_range() {
        for total in [1usize, 3, 7, 64] {
            let size = bucket_size(total);
            for code in [i32::MIN, -1, 0, 1, i32::MAX] {
                assert!(bucket_for_hash(code, size, total) < total);
            }
        }
    }

    #[test]
    fn test_partitioners_are_deterministic() {
        let sip = SipPartitioner;
        let xxh = Xxh3Partitioner;
        assert_eq!(sip.hash_code(b"user:42"), sip.hash_code(b"user:42"));
        assert_eq!(xxh.hash_code(b"user:42"), xxh.hash_code(b"user:42"));
        assert_eq!(sip.name(), "SipPartitioner");
        assert_eq!(xxh.name(), "Xxh3Partitioner");
    }
}
