//! Pairwise rebalancing for clusters whose membership did not change.

pub mod manager;
pub mod node_data;

pub use manager::{
    balance_two_nodes, filter_candidate_nodes, sanity_check_for_all_functional, BalanceNodeMgr,
    CandidateShare,
};
pub use node_data::{BalanceDataForNode, NodeBalanceData};
