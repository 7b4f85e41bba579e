//! Requests and results exchanged with the map planners.

use crate::bucket::{BucketMap, OwnershipMap};
use crate::node::NodeInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Membership change that triggered a planning pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterActivity {
    NodeJoin,
    NodeLeave,
    /// Periodic balance tick; membership is unchanged.
    None,
}

/// Policy used to pick the buckets handed to a joining node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionMode {
    /// First matrix row of every member; ignores weight.
    OptimalTime,
    /// Diagonal spread over every member's matrix; ignores weight.
    #[default]
    ShuffleBuckets,
    /// Weight-aware selection against the full fair share.
    OptimalWeight,
    /// Weight-aware selection against half the fair share.
    AvgWeightTime,
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistributionMode::OptimalTime => "optimal-time",
            DistributionMode::ShuffleBuckets => "shuffle",
            DistributionMode::OptimalWeight => "optimal-weight",
            DistributionMode::AvgWeightTime => "avg-weight-time",
        };
        f.write_str(name)
    }
}

/// Input of [`crate::DistributionManager::get_maps`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionInfo {
    pub activity: ClusterActivity,
    pub affected_node: NodeInfo,
    pub mode: DistributionMode,
}

impl DistributionInfo {
    pub fn new(activity: ClusterActivity, affected_node: NodeInfo) -> Self {
        Self {
            activity,
            affected_node,
            mode: DistributionMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: DistributionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Outcome of a planning pass.
///
/// `AlreadyInBalancing` and `NotRequired` are regular outcomes: the caller
/// simply tries again on a later tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalancingResult {
    /// New maps were computed.
    #[default]
    Default,
    /// A transfer is still in flight somewhere in the cluster.
    AlreadyInBalancing,
    /// The affected node already carries no more than its fair share.
    NotRequired,
}

/// Maps produced by a planning pass, ready for installation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistributionMaps {
    pub hash_map: Option<BucketMap>,
    pub ownership: Option<OwnershipMap>,
    pub result: BalancingResult,
}

impl DistributionMaps {
    pub fn new(hash_map: BucketMap, ownership: OwnershipMap) -> Self {
        Self {
            hash_map: Some(hash_map),
            ownership: Some(ownership),
            result: BalancingResult::Default,
        }
    }

    /// Result without maps.
    pub fn with_result(result: BalancingResult) -> Self {
        Self {
            hash_map: None,
            ownership: None,
            result,
        }
    }
}
