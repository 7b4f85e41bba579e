//! Per-bucket statistics supplied by the stats collector.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Size information for one bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStatistics {
    /// Bytes held by the bucket; the balancing weight.
    pub data_size: i64,
    pub item_count: u64,
}

impl BucketStatistics {
    pub fn with_size(data_size: i64) -> Self {
        Self {
            data_size,
            item_count: 0,
        }
    }
}

/// Bucket id → statistics. Buckets without an entry weigh nothing.
pub type BucketStatsTable = HashMap<usize, BucketStatistics>;

/// Weight of `bucket_id` in `stats`, zero when unknown.
#[inline]
pub fn weight_of(stats: &BucketStatsTable, bucket_id: usize) -> i64 {
    stats.get(&bucket_id).map_or(0, |s| s.data_size)
}
