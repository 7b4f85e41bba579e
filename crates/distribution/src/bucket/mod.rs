//! Bucket records, their status and the views built over them.

pub mod latch;
pub mod ownership;
pub mod record;
pub mod stats;
pub mod status;
pub mod weighted;

pub use latch::StatusLatch;
pub use ownership::OwnershipMap;
pub use record::{Bucket, BucketMap};
pub use stats::{weight_of, BucketStatistics, BucketStatsTable};
pub use status::BucketStatus;
pub use weighted::WeightedEntry;
