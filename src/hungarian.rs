use nalgebra::DMatrix;

use crate::error::TrackError::{self, InvalidCost};

/* -----------------------------------------------------------------------------
 * hungarian.rs - Kuhn-Munkres minimum cost assignment
 * ----------------------------------------------------------------------------- */

/// Solve the rectangular assignment problem for `cost` and return a boolean
/// mask of the chosen cells.
///
/// With `rows <= cols` every row gets exactly one column and no column is
/// used twice. With `rows > cols` the transpose is solved, so every column
/// gets exactly one row. Ties resolve towards the lowest column index.
pub fn solve(cost: &DMatrix<f32>) -> Result<DMatrix<bool>, TrackError> {
    let (rows, cols) = cost.shape();
    let mut assignment = DMatrix::from_element(rows, cols, false);
    if rows == 0 || cols == 0 {
        return Ok(assignment);
    }
    check_cost(cost)?;

    if rows <= cols {
        let col_of_row = solve_wide(rows, cols, |i, j| cost[(i, j)] as f64);
        for (i, j) in col_of_row.into_iter().enumerate() {
            assignment[(i, j)] = true;
        }
    } else {
        let row_of_col = solve_wide(cols, rows, |i, j| cost[(j, i)] as f64);
        for (j, i) in row_of_col.into_iter().enumerate() {
            assignment[(i, j)] = true;
        }
    }
    Ok(assignment)
}

fn check_cost(cost: &DMatrix<f32>) -> Result<(), TrackError> {
    for i in 0..cost.nrows() {
        for j in 0..cost.ncols() {
            let c = cost[(i, j)];
            if !c.is_finite() {
                return Err(InvalidCost(format!(
                    "cost[{}, {}] = {} is not finite",
                    i, j, c
                )));
            }
        }
    }
    Ok(())
}

/// Shortest augmenting path with row/column potentials for an `n x m`
/// problem, `n <= m`. Returns the column assigned to each row.
fn solve_wide<F>(n: usize, m: usize, a: F) -> Vec<usize>
where
    F: Fn(usize, usize) -> f64,
{
    debug_assert!(n <= m, "rows ({}) must not exceed cols ({})", n, m);

    // 1-based; row/column 0 is the virtual start of each augmenting path
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = a(i0 - 1, j - 1) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            debug_assert!(j1 != 0, "no free column left for row {}", i);
            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut col_of_row = vec![0usize; n];
    for j in 1..=m {
        if p[j] != 0 {
            col_of_row[p[j] - 1] = j - 1;
        }
    }
    col_of_row
}
