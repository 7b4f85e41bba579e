//! Weight matrices and the selection algorithms run over them on join.

pub mod distribution_data;
pub mod distribution_matrix;
pub mod selection;

pub use distribution_data::DistributionData;
pub use distribution_matrix::{ClusterShare, DistributionMatrix, MatrixDimensions};
pub use selection::{
    balance_weight, candidate_tuples, compare_and_select, individual_select,
    row_balance_gain_weight, row_balance_lose_weight, shuffle_select, BalanceAction,
    RowsBalanceResult,
};
