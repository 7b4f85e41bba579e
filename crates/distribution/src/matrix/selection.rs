//! Selection algorithms over a [`DistributionMatrix`].
//!
//! # Algorithm
//!
//! [`compare_and_select`] runs in two passes:
//!
//! 1. **Individual**: scan rows for one whose weight percentage is within the
//!    cushion of the sacrifice target. O(rows).
//! 2. **Pairs**: otherwise, for every unordered pair of rows, swap a prefix
//!    of cells between the two rows so that one of them gets as close to the
//!    target as possible, and keep the pair with the smallest distance.
//!    O(rows² · cols).
//!
//! This is a greedy approximation; buckets are a coarse unit, so an exact
//! bin-packing answer is not needed.
//!
//! [`shuffle_select`] ignores weights and walks the matrix diagonally.
//!
//! All results are flat cell indices (`row * cols + col`).

use crate::matrix::distribution_matrix::DistributionMatrix;

/// Cells chosen for sacrifice and how far their weight is from the target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowsBalanceResult {
    /// Flat matrix indices, `cols` of them.
    pub indices: Vec<usize>,
    /// Absolute weight distance from the sacrifice target.
    pub target_distance: i64,
}

/// Whether the primary row of a pair is below or above the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalanceAction {
    LoseWeight,
    GainWeight,
}

/// Pick a spread of cells independent of weight.
///
/// Walks `(row, col) = (j, i)` diagonally; when the walk runs past the last
/// row it restarts at row 0 with the next column. A padding cell ends the
/// current diagonal early and the walk restarts at row 0 of that column.
pub fn shuffle_select(matrix: &DistributionMatrix) -> RowsBalanceResult {
    let dims = matrix.dimensions();
    let mut indices = Vec::with_capacity(dims.cols);
    let mut col = 0;
    while col < dims.cols {
        let mut row = 0;
        while row < dims.rows && col < dims.cols {
            if matrix.is_padding(row, col) {
                break;
            }
            indices.push(row * dims.cols + col);
            row += 1;
            col += 1;
        }
        // Row 0 is always complete; this only guards malformed matrices.
        if row == 0 {
            break;
        }
    }
    RowsBalanceResult {
        indices,
        target_distance: 0,
    }
}

/// Weight-aware selection of `cols` cells to sacrifice.
pub fn compare_and_select(matrix: &DistributionMatrix) -> RowsBalanceResult {
    if matrix.is_empty() {
        return RowsBalanceResult::default();
    }

    if let Some(row) = individual_select(matrix) {
        return RowsBalanceResult {
            indices: matrix.row_indices(row),
            target_distance: (matrix.row_weight(row) - matrix.weight_to_sacrifice()).abs(),
        };
    }

    let mut best: Option<RowsBalanceResult> = None;
    for pair in candidate_tuples(matrix.dimensions().rows) {
        let current = balance_weight(pair, matrix);
        match &best {
            Some(kept) if current.target_distance >= kept.target_distance => {}
            _ => best = Some(current),
        }
    }

    // Single-row matrices have no pairs; hand over that row.
    best.unwrap_or_else(|| RowsBalanceResult {
        indices: matrix.row_indices(0),
        target_distance: (matrix.row_weight(0) - matrix.weight_to_sacrifice()).abs(),
    })
}

/// First row whose percentage is within the cushion of the target.
pub fn individual_select(matrix: &DistributionMatrix) -> Option<usize> {
    let target = matrix.percent_weight_to_sacrifice();
    let cushion = matrix.cushion();
    (0..matrix.dimensions().rows).find(|&row| {
        let percent = matrix.row_percent(row);
        if percent < target {
            percent + cushion >= target
        } else {
            percent - cushion <= target
        }
    })
}

/// All unordered pairs `(i, j)`, `i < j`, of `rows` row indices.
pub fn candidate_tuples(rows: usize) -> Vec<(usize, usize)> {
    let mut tuples = Vec::with_capacity(rows * rows.saturating_sub(1) / 2);
    for i in 0..rows {
        for j in i + 1..rows {
            tuples.push((i, j));
        }
    }
    tuples
}

/// Balance a pair of rows against the target.
pub fn balance_weight(pair: (usize, usize), matrix: &DistributionMatrix) -> RowsBalanceResult {
    let target = matrix.percent_weight_to_sacrifice();
    let primary_percent = matrix.row_percent(pair.0);

    let (action, percent_delta) = if primary_percent < target {
        (BalanceAction::GainWeight, target - primary_percent)
    } else {
        (BalanceAction::LoseWeight, primary_percent - target)
    };
    let weight_to_move = percent_delta * matrix.total_weight() / 100;

    match action {
        BalanceAction::GainWeight => row_balance_gain_weight(pair, weight_to_move, matrix),
        BalanceAction::LoseWeight => row_balance_lose_weight(pair, weight_to_move, matrix),
    }
}

/// Primary row is below target: swap cells in from the secondary row.
///
/// Walks the columns once, swapping cell `i` of both rows and tracking the
/// running weight of each. The first time the primary overshoots the target
/// (or the secondary undershoots it) the walk locks the swap boundary that
/// leaves the smaller error. The row with the smaller error wins.
pub fn row_balance_gain_weight(
    pair: (usize, usize),
    weight_to_gain: i64,
    matrix: &DistributionMatrix,
) -> RowsBalanceResult {
    let (first, second) = pair;
    let primary = matrix.row(first);
    let secondary = matrix.row(second);

    let mut primary_weight = matrix.row_weight(first);
    let mut secondary_weight = matrix.row_weight(second);
    let weight_to_achieve = primary_weight + weight_to_gain;

    // A secondary already lighter than the goal can never get there by
    // losing weight.
    let secondary_needs_to_lose = secondary_weight >= weight_to_achieve;

    // Number of leading cells swapped, once locked.
    let mut primary_lock: Option<usize> = None;
    let mut secondary_lock: Option<usize> = None;
    let mut primary_distance = 0;
    let mut secondary_distance = 0;

    for i in 0..primary.len() {
        let difference = secondary[i] - primary[i];
        primary_weight += difference;
        secondary_weight -= difference;

        if primary_lock.is_none() && primary_weight > weight_to_achieve {
            let after = primary_weight - weight_to_achieve;
            let before = weight_to_achieve - (primary_weight - difference);
            if after >= before {
                primary_lock = Some(i);
                primary_distance = before;
            } else {
                primary_lock = Some(i + 1);
                primary_distance = after;
            }
        }

        if secondary_needs_to_lose
            && secondary_lock.is_none()
            && secondary_weight < weight_to_achieve
        {
            let after = weight_to_achieve - secondary_weight;
            let before = (secondary_weight + difference) - weight_to_achieve;
            if after >= before {
                secondary_lock = Some(i);
                secondary_distance = before;
            } else {
                secondary_lock = Some(i + 1);
                secondary_distance = after;
            }
        }
    }

    let (primary_selected, swap_count, distance) = match (primary_lock, secondary_lock) {
        (Some(p), Some(s)) => {
            if primary_distance <= secondary_distance {
                (true, p, primary_distance)
            } else {
                (false, s, secondary_distance)
            }
        }
        (Some(p), None) => (true, p, primary_distance),
        (None, Some(s)) => (false, s, secondary_distance),
        // Nothing reached the goal: give the primary row back as is.
        (None, None) => (true, 0, (weight_to_achieve - primary_weight).abs()),
    };

    let mut primary_indices = matrix.row_indices(first);
    let mut secondary_indices = matrix.row_indices(second);
    for i in 0..swap_count {
        std::mem::swap(&mut primary_indices[i], &mut secondary_indices[i]);
    }

    RowsBalanceResult {
        indices: if primary_selected {
            primary_indices
        } else {
            secondary_indices
        },
        target_distance: distance,
    }
}

/// Primary row is above target: the secondary is heavier still, so no swap
/// can help and the primary row is sacrificed whole.
// TODO: try dropping the heaviest primary cells in favour of lighter ones
// from rows outside the pair instead of returning the full row.
pub fn row_balance_lose_weight(
    pair: (usize, usize),
    weight_to_lose: i64,
    matrix: &DistributionMatrix,
) -> RowsBalanceResult {
    RowsBalanceResult {
        indices: matrix.row_indices(pair.0),
        target_distance: weight_to_lose,
    }
}
