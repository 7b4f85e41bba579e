//! Bucket distribution and load balancing for a clustered cache.
//!
//! The key space is split into a fixed number of buckets. This crate
//! decides which node owns each bucket and keeps that decision consistent
//! while nodes join, leave and exchange data:
//! - Key partitioning into buckets
//! - Bucket maps, ownership index and transfer status
//! - Weight-aware selection of buckets for a joining node
//! - Orphan redistribution when a node leaves
//! - Pairwise rebalancing of skewed clusters
//! - Partitioned-replica awareness

pub mod balance;
pub mod bucket;
pub mod config;
pub mod distribute;
pub mod error;
pub mod manager;
pub mod maps;
pub mod matrix;
pub mod node;
pub mod partitioner;

pub use bucket::{Bucket, BucketMap, BucketStatistics, BucketStatsTable, BucketStatus, OwnershipMap};
pub use config::{DistributionConfig, TOTAL_BUCKETS};
pub use error::{Error, Result};
pub use manager::{
    BucketLockResult, CandidateNode, DistributionManager, NoPartitioning, PartitionAwareness,
    PartitionedReplicated,
};
pub use maps::{BalancingResult, ClusterActivity, DistributionInfo, DistributionMaps, DistributionMode};
pub use node::{NodeAddress, NodeInfo};
pub use partitioner::{Partitioner, SipPartitioner, Xxh3Partitioner};
