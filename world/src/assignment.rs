//! Minimum-cost rectangular assignment (Hungarian method).
//!
//! The solver works on a square matrix. Missing rows and columns are padded
//! with a constant cost, which leaves the optimum among the real pairs
//! untouched. Runs in O(n³) and is fully deterministic.

const PADDING_COST: f64 = 0.0;
const NON_FINITE_COST: f64 = 1.0e18;

/// Solves the assignment problem for a row-major cost matrix.
///
/// Returns, for every row, the column assigned to it. A row is `None` only
/// when there are more rows than columns and it lost out to cheaper rows.
#[must_use]
pub fn solve(costs: &[Vec<f64>]) -> Vec<Option<usize>> {
    let rows = costs.len();
    if rows == 0 {
        return Vec::new();
    }
    let columns = costs.iter().map(Vec::len).max().unwrap_or(0);
    let size = rows.max(columns);

    let cost = |row: usize, column: usize| -> f64 {
        match costs.get(row).and_then(|values| values.get(column)) {
            Some(value) if value.is_finite() => *value,
            Some(_) => NON_FINITE_COST,
            None => PADDING_COST,
        }
    };

    // Potentials and matching are 1-based; index 0 is the virtual source.
    let mut u = vec![0.0_f64; size + 1];
    let mut v = vec![0.0_f64; size + 1];
    let mut matched_row = vec![0_usize; size + 1];
    let mut way = vec![0_usize; size + 1];

    for row in 1..=size {
        matched_row[0] = row;
        let mut current = 0_usize;
        let mut min_slack = vec![f64::INFINITY; size + 1];
        let mut used = vec![false; size + 1];

        loop {
            used[current] = true;
            let active_row = matched_row[current];
            let mut delta = f64::INFINITY;
            let mut next = 0_usize;

            for column in 1..=size {
                if used[column] {
                    continue;
                }
                let reduced = cost(active_row - 1, column - 1) - u[active_row] - v[column];
                if reduced < min_slack[column] {
                    min_slack[column] = reduced;
                    way[column] = current;
                }
                if min_slack[column] < delta {
                    delta = min_slack[column];
                    next = column;
                }
            }

            for column in 0..=size {
                if used[column] {
                    u[matched_row[column]] += delta;
                    v[column] -= delta;
                } else {
                    min_slack[column] -= delta;
                }
            }

            current = next;
            if matched_row[current] == 0 {
                break;
            }
        }

        while current != 0 {
            let previous = way[current];
            matched_row[current] = matched_row[previous];
            current = previous;
        }
    }

    let mut assignment = vec![None; rows];
    for column in 1..=size {
        let row = matched_row[column];
        if row >= 1 && row <= rows && column <= columns {
            assignment[row - 1] = Some(column - 1);
        }
    }
    assignment
}

/// Sum of the costs selected by an assignment.
#[must_use]
pub fn total_cost(costs: &[Vec<f64>], assignment: &[Option<usize>]) -> f64 {
    assignment
        .iter()
        .enumerate()
        .filter_map(|(row, column)| {
            column.and_then(|column| costs.get(row).and_then(|values| values.get(column)))
        })
        .sum()
}
