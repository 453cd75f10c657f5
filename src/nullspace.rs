//! Numerical nullspace of a symmetric positive semidefinite matrix via SVD.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::error::{FrictionError, Result};

/// Orthonormal basis for the directions along which a quadratic form is flat.
#[derive(Clone, Debug)]
pub struct Nullspace {
    basis: DMatrix<f64>,
    singular_values: DVector<f64>,
    tolerance: f64,
}

impl Nullspace {
    /// Extracts the nullspace of `matrix`.
    ///
    /// Singular values are sorted in descending order here, regardless of the
    /// ordering the decomposition returns. Values at or below the tolerance are
    /// counted from the smallest upward; the matching trailing right singular
    /// vectors form the basis. Without an explicit `tolerance` the threshold is
    /// `ε · rows · σ_max`. Only square matrices are accepted.
    pub fn of(matrix: &DMatrix<f64>, tolerance: Option<f64>) -> Result<Self> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(FrictionError::invalid_dimension(
                "nullspace matrix columns",
                n,
                matrix.ncols(),
            ));
        }
        if n == 0 {
            return Ok(Self {
                basis: DMatrix::zeros(0, 0),
                singular_values: DVector::zeros(0),
                tolerance: 0.0,
            });
        }

        let svd = matrix.clone().svd(false, true);
        let v_t = svd.v_t.ok_or(FrictionError::DecompositionFailed {
            context: "nullspace SVD",
        })?;

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));
        let singular_values =
            DVector::from_iterator(n, order.iter().map(|&i| svd.singular_values[i]));

        let sigma_max = singular_values[0];
        let tolerance = tolerance.unwrap_or(f64::EPSILON * n as f64 * sigma_max);
        let nullity = singular_values
            .iter()
            .rev()
            .take_while(|&&sigma| sigma <= tolerance)
            .count();
        debug!("nullspace: sigma_max {sigma_max:e}, tolerance {tolerance:e}, nullity {nullity}");

        // Trailing right singular vectors in descending singular value order.
        let mut basis = DMatrix::zeros(n, nullity);
        for (target, &source) in order[n - nullity..].iter().enumerate() {
            basis.set_column(target, &v_t.row(source).transpose());
        }

        Ok(Self {
            basis,
            singular_values,
            tolerance,
        })
    }

    /// Number of zero singular values (the nullity `m`).
    pub fn nullity(&self) -> usize {
        self.basis.ncols()
    }

    /// Whether the matrix has full rank, i.e. no ambiguity to resolve.
    pub fn is_trivial(&self) -> bool {
        self.nullity() == 0
    }

    /// Basis `P` with one orthonormal column per null direction.
    pub fn basis(&self) -> &DMatrix<f64> {
        &self.basis
    }

    /// Singular values in descending order.
    pub fn singular_values(&self) -> &DVector<f64> {
        &self.singular_values
    }

    /// Threshold at or below which a singular value is treated as zero.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}
