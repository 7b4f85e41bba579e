//! Per-node matrix of bucket weights used to pick buckets to give away.
//!
//! # Layout
//!
//! A node that owns more than its fair share of buckets must sacrifice
//! `cols = owned - fair_share` of them. Its buckets, sorted by weight, are
//! laid out row by row in a `rows × cols` grid, so every row is one
//! candidate set of exactly the right size:
//!
//! ```text
//!            col 0   col 1   col 2
//! row 0  │    w0      w1      w2   │ Σ row 0, % of node weight
//! row 1  │    w3      w4      w5   │ Σ row 1, %
//! row 2  │    w6      --      --   │ Σ row 2, %   (-- = padding)
//! ```
//!
//! The selection routines in [`super::selection`] look for the row, or the
//! blend of two rows, whose weight is closest to what this node should
//! hand over.

use crate::bucket::WeightedEntry;
use crate::config::DistributionConfig;
use crate::node::NodeAddress;
use tracing::{debug, warn};

/// Rows and columns of a [`DistributionMatrix`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatrixDimensions {
    pub rows: usize,
    pub cols: usize,
}

/// Cluster-wide figures every node's matrix is measured against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterShare {
    /// Fair bucket count per node after the change.
    pub buckets_per_node: usize,
    /// Fair data weight per node after the change.
    pub weight_per_node: i64,
    /// Total data weight of the cluster, never below 1.
    pub cache_data_sum: i64,
}

/// Bucket weights of one node arranged for selection.
///
/// Padding cells carry no bucket and no weight. All sums start at 1 so an
/// empty cluster never divides by zero.
#[derive(Clone, Debug)]
pub struct DistributionMatrix {
    address: NodeAddress,
    dims: MatrixDimensions,
    weights: Vec<i64>,
    ids: Vec<Option<usize>>,
    row_weights: Vec<i64>,
    row_percents: Vec<i64>,
    items_count: usize,
    total_weight: i64,
    weight_to_sacrifice: i64,
    percent_weight_to_sacrifice: i64,
    percent_weight_of_cluster: i64,
    cushion_factor: u32,
    weight_balance_threshold: i64,
}

impl DistributionMatrix {
    /// Build the matrix of `address` from the cluster-wide entry list.
    ///
    /// A node that owns no more than its fair share gets an empty matrix and
    /// contributes nothing.
    pub fn new(
        entries: &[WeightedEntry],
        address: NodeAddress,
        share: &ClusterShare,
        config: &DistributionConfig,
    ) -> Self {
        let mut owned: Vec<WeightedEntry> = entries
            .iter()
            .filter(|e| e.owner == address)
            .copied()
            .collect();
        owned.sort();

        let mut matrix = Self {
            address,
            dims: MatrixDimensions::default(),
            weights: Vec::new(),
            ids: Vec::new(),
            row_weights: Vec::new(),
            row_percents: Vec::new(),
            items_count: owned.len(),
            total_weight: 1,
            weight_to_sacrifice: 0,
            percent_weight_to_sacrifice: 0,
            percent_weight_of_cluster: 0,
            cushion_factor: config.cushion_factor,
            weight_balance_threshold: config.weight_balance_threshold(),
        };

        debug!(
            node = %address,
            owned = owned.len(),
            buckets_per_node = share.buckets_per_node,
            "building distribution matrix"
        );

        if owned.len() <= share.buckets_per_node {
            warn!(
                node = %address,
                owned = owned.len(),
                buckets_per_node = share.buckets_per_node,
                "node cannot sacrifice any bucket"
            );
            return matrix;
        }

        let cols = owned.len() - share.buckets_per_node;
        let rows = owned.len().div_ceil(cols);
        matrix.fill(&owned, rows, cols, share);
        matrix
    }

    fn fill(&mut self, owned: &[WeightedEntry], rows: usize, cols: usize, share: &ClusterShare) {
        self.dims = MatrixDimensions { rows, cols };
        self.weights = vec![0; rows * cols];
        self.ids = vec![None; rows * cols];
        self.row_weights = vec![0; rows];

        for (index, entry) in owned.iter().enumerate() {
            self.weights[index] = entry.weight;
            self.ids[index] = Some(entry.bucket_id);
            self.row_weights[index / cols] += entry.weight;
        }
        self.total_weight += self.row_weights.iter().sum::<i64>();

        self.row_percents = self
            .row_weights
            .iter()
            .map(|&w| ceil_percent(w, self.total_weight))
            .collect();

        // A node keeping half of the cluster's data gives away half of the
        // weight the newcomer should receive.
        self.percent_weight_of_cluster = self.total_weight * 100 / share.cache_data_sum.max(1);
        self.retarget(share.weight_per_node);
    }

    /// Recompute what this node must hand over for a new per-node weight.
    pub fn retarget(&mut self, weight_per_node: i64) {
        if self.is_empty() {
            return;
        }
        self.weight_to_sacrifice =
            (weight_per_node as f64 * self.percent_weight_of_cluster as f64 / 100.0).ceil() as i64;
        self.percent_weight_to_sacrifice = ceil_percent(self.weight_to_sacrifice, self.total_weight);
    }

    pub fn address(&self) -> NodeAddress {
        self.address
    }

    pub fn dimensions(&self) -> MatrixDimensions {
        self.dims
    }

    /// True when the node has nothing to give away.
    pub fn is_empty(&self) -> bool {
        self.dims.rows == 0 || self.dims.cols == 0
    }

    /// Number of buckets this node owned when the matrix was built.
    pub fn items_count(&self) -> usize {
        self.items_count
    }

    /// Number of buckets this node must give away.
    pub fn buckets_to_sacrifice(&self) -> usize {
        self.dims.cols
    }

    #[inline]
    pub fn weight(&self, row: usize, col: usize) -> i64 {
        self.weights[row * self.dims.cols + col]
    }

    #[inline]
    pub fn bucket_id(&self, row: usize, col: usize) -> Option<usize> {
        self.ids[row * self.dims.cols + col]
    }

    /// Bucket id at a flat (`row * cols + col`) index.
    #[inline]
    pub fn bucket_id_at(&self, index: usize) -> Option<usize> {
        self.ids.get(index).copied().flatten()
    }

    #[inline]
    pub fn is_padding(&self, row: usize, col: usize) -> bool {
        self.bucket_id(row, col).is_none()
    }

    /// Weights of one row, padding included as zero.
    pub fn row(&self, row: usize) -> &[i64] {
        let start = row * self.dims.cols;
        &self.weights[start..start + self.dims.cols]
    }

    /// Flat indices of every cell of `row`.
    pub fn row_indices(&self, row: usize) -> Vec<usize> {
        let start = row * self.dims.cols;
        (start..start + self.dims.cols).collect()
    }

    pub fn row_weight(&self, row: usize) -> i64 {
        self.row_weights[row]
    }

    /// Row weight as a ceiling percentage of the node's weight.
    pub fn row_percent(&self, row: usize) -> i64 {
        self.row_percents[row]
    }

    pub fn total_weight(&self) -> i64 {
        self.total_weight
    }

    pub fn weight_to_sacrifice(&self) -> i64 {
        self.weight_to_sacrifice
    }

    pub fn percent_weight_to_sacrifice(&self) -> i64 {
        self.percent_weight_to_sacrifice
    }

    pub fn percent_weight_of_cluster(&self) -> i64 {
        self.percent_weight_of_cluster
    }

    /// Tolerance, in percentage points, around the sacrifice target.
    pub fn cushion(&self) -> i64 {
        (self.percent_weight_to_sacrifice as f64 * self.cushion_factor as f64 / 100.0).ceil() as i64
    }

    /// Whether this node carries enough data for weight to matter.
    pub fn do_weight_balance(&self) -> bool {
        self.total_weight > self.weight_balance_threshold
    }

    pub fn weight_balance_threshold(&self) -> i64 {
        self.weight_balance_threshold
    }
}

/// `ceil(part / whole * 100)`, computed in floating point.
pub(crate) fn ceil_percent(part: i64, whole: i64) -> i64 {
    (part as f64 / whole.max(1) as f64 * 100.0).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    fn entries(owner: NodeAddress, weights: &[i64]) -> Vec<WeightedEntry> {
        weights
            .iter()
            .enumerate()
            .map(|(id, &w)| WeightedEntry::new(id, w, owner))
            .collect()
    }

    #[test]
    fn test_layout_with_padding() {
        let a = addr("10.0.0.1:7800");
        let share = ClusterShare {
            buckets_per_node: 4,
            weight_per_node: 50,
            cache_data_sum: 100,
        };
        // 7 owned, 4 fair -> 3 columns, 3 rows, last row padded twice
        let list = entries(a, &[70, 10, 60, 20, 50, 30, 40]);
        let matrix = DistributionMatrix::new(&list, a, &share, &DistributionConfig::default());

        assert_eq!(matrix.dimensions(), MatrixDimensions { rows: 3, cols: 3 });
        assert_eq!(matrix.row(0), &[10, 20, 30]);
        assert_eq!(matrix.row(1), &[40, 50, 60]);
        assert_eq!(matrix.row(2), &[70, 0, 0]);
        assert!(matrix.is_padding(2, 1));
        assert_eq!(matrix.bucket_id(0, 0), Some(1));
        assert_eq!(matrix.total_weight(), 281);
        assert_eq!(matrix.row_weight(1), 150);
        // ceil(150 / 281 * 100)
        assert_eq!(matrix.row_percent(1), 54);
    }

    #[test]
    fn test_sacrifice_targets() {
        let a = addr("10.0.0.1:7800");
        let share = ClusterShare {
            buckets_per_node: 2,
            weight_per_node: 500,
            cache_data_sum: 1000,
        };
        let list = entries(a, &[250, 250, 250, 249]);
        let matrix = DistributionMatrix::new(&list, a, &share, &DistributionConfig::default());

        assert_eq!(matrix.total_weight(), 1000);
        assert_eq!(matrix.percent_weight_of_cluster(), 100);
        assert_eq!(matrix.weight_to_sacrifice(), 500);
        assert_eq!(matrix.percent_weight_to_sacrifice(), 50);
        assert_eq!(matrix.cushion(), 5);
    }

    #[test]
    fn test_node_at_fair_share_gets_empty_matrix() {
        let a = addr("10.0.0.1:7800");
        let share = ClusterShare {
            buckets_per_node: 5,
            weight_per_node: 10,
            cache_data_sum: 10,
        };
        let list = entries(a, &[1, 2, 3, 4, 5]);
        let matrix = DistributionMatrix::new(&list, a, &share, &DistributionConfig::default());
        assert!(matrix.is_empty());
        assert_eq!(matrix.total_weight(), 1);
        assert!(!matrix.do_weight_balance());
    }

    #[test]
    fn test_only_own_entries_are_used() {
        let a = addr("10.0.0.1:7800");
        let b = addr("10.0.0.2:7800");
        let mut list = entries(a, &[1, 1, 1, 1]);
        list.push(WeightedEntry::new(4, 1, b));
        let share = ClusterShare {
            buckets_per_node: 2,
            weight_per_node: 2,
            cache_data_sum: 5,
        };
        let matrix = DistributionMatrix::new(&list, a, &share, &DistributionConfig::default());
        assert_eq!(matrix.items_count(), 4);
        assert_eq!(matrix.buckets_to_sacrifice(), 2);
    }

    #[test]
    fn test_weight_balance_threshold() {
        let a = addr("10.0.0.1:7800");
        let share = ClusterShare {
            buckets_per_node: 1,
            weight_per_node: 1_000,
            cache_data_sum: 2_000,
        };
        let config = DistributionConfig::default().with_cache_size_per_node(10_000);
        let list = entries(a, &[1_000, 1_000]);
        let matrix = DistributionMatrix::new(&list, a, &share, &config);
        assert_eq!(matrix.weight_balance_threshold(), 1_000);
        assert!(matrix.do_weight_balance());
    }
}
