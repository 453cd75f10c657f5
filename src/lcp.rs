//! Linear complementarity solver: Lemke's complementary pivoting with a
//! regularized fallback for degenerate problems.
//!
//! Given a square matrix `M` and a vector `q`, find `z ≥ 0` such that
//! `w = Mz + q ≥ 0` and `zᵀw = 0`.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{FrictionError, Result};

/// Configuration for Lemke's algorithm and its regularized retries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LemkeOptions {
    /// Maximum number of pivots per attempt. `None` uses `min(1000, 50·n)`.
    pub max_pivots: Option<usize>,
    /// Smallest admissible pivot element. `None` scales `ε·n·max(1, ‖M‖∞)`.
    pub pivot_tolerance: Option<f64>,
    /// Tolerance used when verifying a candidate solution. `None` scales
    /// `√ε·max(1, ‖M‖∞, ‖q‖∞)`.
    pub feasibility_tolerance: Option<f64>,
    /// Smallest regularization exponent tried (`M + 10^e I`).
    pub min_exponent: i32,
    /// Exponent increment between regularized attempts.
    pub exponent_step: i32,
    /// Largest regularization exponent tried.
    pub max_exponent: i32,
}

impl Default for LemkeOptions {
    fn default() -> Self {
        Self {
            max_pivots: None,
            pivot_tolerance: None,
            feasibility_tolerance: None,
            min_exponent: -20,
            exponent_step: 4,
            max_exponent: 20,
        }
    }
}

impl LemkeOptions {
    /// Disable the regularized retries so only the plain pivoting attempt runs.
    pub fn without_regularization(mut self) -> Self {
        self.min_exponent = 1;
        self.max_exponent = 0;
        self
    }

    fn regularization_exponents(&self) -> impl Iterator<Item = i32> {
        let step = self.exponent_step.max(1) as usize;
        (self.min_exponent..=self.max_exponent).step_by(step)
    }
}

/// Verified solution of a linear complementarity problem.
#[derive(Clone, Debug)]
pub struct LcpSolution {
    /// Primal vector `z ≥ 0`.
    pub z: DVector<f64>,
    /// Complementary slack `w = Mz + q` (with the applied regularization).
    pub w: DVector<f64>,
    /// Pivots performed by the successful attempt.
    pub pivots: usize,
    /// Diagonal shift `10^e` added to `M`, if the plain attempt failed.
    pub regularization: Option<f64>,
}

/// Solves the LCP `(M, q)`, retrying with `M + 10^e I` when plain pivoting fails.
pub fn solve(m: &DMatrix<f64>, q: &DVector<f64>, options: &LemkeOptions) -> Result<LcpSolution> {
    let n = q.len();
    if m.nrows() != n || m.ncols() != n {
        return Err(FrictionError::invalid_dimension("LCP matrix", n, m.nrows().max(m.ncols())));
    }

    let mut attempts = 1usize;
    if let Some(solution) = attempt(m, q, options) {
        return Ok(solution);
    }

    for exponent in options.regularization_exponents() {
        attempts += 1;
        let shift = 10f64.powi(exponent);
        let mut regularized = m.clone();
        for i in 0..n {
            regularized[(i, i)] += shift;
        }
        if let Some(mut solution) = attempt(&regularized, q, options) {
            debug!("LCP of size {n} solved with regularization {shift:e}");
            solution.regularization = Some(shift);
            return Ok(solution);
        }
    }

    Err(FrictionError::LcpUnsolved { size: n, attempts })
}

/// One plain Lemke attempt followed by verification.
fn attempt(m: &DMatrix<f64>, q: &DVector<f64>, options: &LemkeOptions) -> Option<LcpSolution> {
    let (z, pivots) = lemke(m, q, options)?;
    let w = m * &z + q;
    let tolerance = options
        .feasibility_tolerance
        .unwrap_or_else(|| f64::EPSILON.sqrt() * 1f64.max(inf_norm(m)).max(q.amax()));
    if is_complementary(&z, &w, tolerance) {
        Some(LcpSolution {
            z,
            w,
            pivots,
            regularization: None,
        })
    } else {
        None
    }
}

/// Checks `z ≥ -tol`, `w ≥ -tol` and `|zᵀw| ≤ tol·n`.
pub fn is_complementary(z: &DVector<f64>, w: &DVector<f64>, tolerance: f64) -> bool {
    if z.iter().chain(w.iter()).any(|value| !value.is_finite()) {
        return false;
    }
    let n = z.len().max(1) as f64;
    z.iter().all(|&zi| zi >= -tolerance)
        && w.iter().all(|&wi| wi >= -tolerance)
        && z.dot(w).abs() <= tolerance * n
}

/// Dense-tableau Lemke pivoting with the all-ones covering vector.
///
/// The tableau rows encode `I·w − M·z − e·z0 = q`; columns are laid out as
/// `[w (n) | z (n) | z0 | rhs]`.
fn lemke(
    m: &DMatrix<f64>,
    q: &DVector<f64>,
    options: &LemkeOptions,
) -> Option<(DVector<f64>, usize)> {
    let n = q.len();
    if q.iter().all(|&qi| qi >= 0.0) {
        return Some((DVector::zeros(n), 0));
    }

    let artificial = 2 * n;
    let rhs = 2 * n + 1;
    let mut tableau = DMatrix::zeros(n, 2 * n + 2);
    for i in 0..n {
        tableau[(i, i)] = 1.0;
        for j in 0..n {
            tableau[(i, n + j)] = -m[(i, j)];
        }
        tableau[(i, artificial)] = -1.0;
        tableau[(i, rhs)] = q[i];
    }

    let pivot_tolerance = options
        .pivot_tolerance
        .unwrap_or_else(|| f64::EPSILON * n as f64 * 1f64.max(inf_norm(m)));
    let max_pivots = options.max_pivots.unwrap_or_else(|| (50 * n).min(1000));

    let mut basis: Vec<usize> = (0..n).collect();

    // The artificial variable enters at the row with the most negative q.
    let first_row = (0..n).fold(0, |best, i| if q[i] < q[best] { i } else { best });
    pivot(&mut tableau, first_row, artificial);
    let mut leaving = basis[first_row];
    basis[first_row] = artificial;
    let mut pivots = 1usize;

    while pivots < max_pivots {
        let entering = complement(leaving, n);
        let row = ratio_test(&tableau, &basis, entering, rhs, artificial, pivot_tolerance)?;
        pivot(&mut tableau, row, entering);
        leaving = basis[row];
        basis[row] = entering;
        pivots += 1;

        if leaving == artificial {
            let mut z = DVector::zeros(n);
            for (row, &variable) in basis.iter().enumerate() {
                if (n..2 * n).contains(&variable) {
                    z[variable - n] = tableau[(row, rhs)];
                }
            }
            return Some((z, pivots));
        }
    }

    debug!("Lemke pivoting exhausted {max_pivots} pivots on an LCP of size {n}");
    None
}

/// Minimum-ratio row for the entering column; `None` signals ray termination.
fn ratio_test(
    tableau: &DMatrix<f64>,
    basis: &[usize],
    entering: usize,
    rhs: usize,
    artificial: usize,
    pivot_tolerance: f64,
) -> Option<usize> {
    // Increasing the entering variable decreases basic variables whose column entry is positive.
    let mut best: Option<(usize, f64)> = None;
    for row in 0..tableau.nrows() {
        let coefficient = tableau[(row, entering)];
        if coefficient > pivot_tolerance {
            let ratio = tableau[(row, rhs)].max(0.0) / coefficient;
            if best.map_or(true, |(_, current)| ratio < current) {
                best = Some((row, ratio));
            }
        }
    }
    let (_, min_ratio) = best?;

    // Among ties, let the artificial variable leave, otherwise take the largest pivot.
    let slack = pivot_tolerance.max(f64::EPSILON * min_ratio.abs().max(1.0)) * 10.0;
    let mut chosen: Option<usize> = None;
    for row in 0..tableau.nrows() {
        let coefficient = tableau[(row, entering)];
        if coefficient <= pivot_tolerance {
            continue;
        }
        let ratio = tableau[(row, rhs)].max(0.0) / coefficient;
        if ratio > min_ratio + slack {
            continue;
        }
        if basis[row] == artificial {
            return Some(row);
        }
        chosen = match chosen {
            Some(current) if tableau[(current, entering)] >= coefficient => Some(current),
            _ => Some(row),
        };
    }
    chosen
}

/// Makes `column` basic in `row` by Gauss-Jordan elimination on the tableau.
fn pivot(tableau: &mut DMatrix<f64>, row: usize, column: usize) {
    let element = tableau[(row, column)];
    let columns = tableau.ncols();
    for j in 0..columns {
        tableau[(row, j)] /= element;
    }
    for i in 0..tableau.nrows() {
        if i == row {
            continue;
        }
        let factor = tableau[(i, column)];
        if factor == 0.0 {
            continue;
        }
        for j in 0..columns {
            let delta = factor * tableau[(row, j)];
            tableau[(i, j)] -= delta;
        }
    }
}

fn complement(variable: usize, n: usize) -> usize {
    if variable < n {
        variable + n
    } else {
        variable - n
    }
}

fn inf_norm(m: &DMatrix<f64>) -> f64 {
    m.row_iter()
        .map(|row| row.iter().map(|value| value.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}
