//! Convex quadratic programs solved by reduction to a linear complementarity problem.

use nalgebra::{DMatrix, DVector};

use crate::error::{FrictionError, Result};
use crate::lcp::{self, LemkeOptions};

/// `minimize ½xᵀQx + cᵀx subject to Ax ≥ b` with `x` unrestricted in sign.
#[derive(Clone, Debug)]
pub struct QuadraticProgram {
    /// Symmetric positive semidefinite Hessian (`n × n`).
    pub hessian: DMatrix<f64>,
    /// Linear cost (`n`).
    pub linear: DVector<f64>,
    /// Inequality constraint matrix (`m × n`).
    pub constraints: DMatrix<f64>,
    /// Inequality lower bounds (`m`).
    pub bounds: DVector<f64>,
}

/// Minimizer together with the constraint multipliers recovered from the LCP.
#[derive(Clone, Debug)]
pub struct QpSolution {
    /// Primal minimizer `x = z⁺ − z⁻`.
    pub x: DVector<f64>,
    /// Multipliers `λ ≥ 0` of the inequality constraints.
    pub multipliers: DVector<f64>,
    /// Diagonal shift applied by the LCP solver, if any.
    pub regularization: Option<f64>,
}

impl QuadraticProgram {
    /// Builds a program after checking that all blocks agree on `n` and `m`.
    pub fn new(
        hessian: DMatrix<f64>,
        linear: DVector<f64>,
        constraints: DMatrix<f64>,
        bounds: DVector<f64>,
    ) -> Result<Self> {
        let n = hessian.nrows();
        if hessian.ncols() != n {
            return Err(FrictionError::invalid_dimension("QP hessian columns", n, hessian.ncols()));
        }
        if linear.len() != n {
            return Err(FrictionError::invalid_dimension("QP linear cost", n, linear.len()));
        }
        if constraints.ncols() != n {
            return Err(FrictionError::invalid_dimension(
                "QP constraint columns",
                n,
                constraints.ncols(),
            ));
        }
        if bounds.len() != constraints.nrows() {
            return Err(FrictionError::invalid_dimension(
                "QP constraint bounds",
                constraints.nrows(),
                bounds.len(),
            ));
        }
        Ok(Self {
            hessian,
            linear,
            constraints,
            bounds,
        })
    }

    /// Number of decision variables.
    pub fn variable_count(&self) -> usize {
        self.hessian.nrows()
    }

    /// Number of inequality constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.nrows()
    }

    /// Assembles the bordered LCP `(M, q)` of size `2n + m`:
    ///
    /// ```text
    /// M = [ Q  -Q  -Aᵀ]     q = [ c]
    ///     [-Q   Q   Aᵀ]         [-c]
    ///     [ A  -A   0 ]         [-b]
    /// ```
    pub fn to_lcp(&self) -> (DMatrix<f64>, DVector<f64>) {
        let n = self.variable_count();
        let m = self.constraint_count();
        let size = 2 * n + m;
        let q_mat = &self.hessian;
        let a_t = self.constraints.transpose();

        let mut matrix = DMatrix::zeros(size, size);
        matrix.view_mut((0, 0), (n, n)).copy_from(q_mat);
        matrix.view_mut((n, n), (n, n)).copy_from(q_mat);
        matrix.view_mut((0, n), (n, n)).copy_from(&(-q_mat));
        matrix.view_mut((n, 0), (n, n)).copy_from(&(-q_mat));
        matrix.view_mut((0, 2 * n), (n, m)).copy_from(&(-&a_t));
        matrix.view_mut((n, 2 * n), (n, m)).copy_from(&a_t);
        matrix.view_mut((2 * n, 0), (m, n)).copy_from(&self.constraints);
        matrix.view_mut((2 * n, n), (m, n)).copy_from(&(-&self.constraints));

        let mut vector = DVector::zeros(size);
        vector.rows_mut(0, n).copy_from(&self.linear);
        vector.rows_mut(n, n).copy_from(&(-&self.linear));
        vector.rows_mut(2 * n, m).copy_from(&(-&self.bounds));

        (matrix, vector)
    }

    /// Solves the program through its LCP reformulation.
    ///
    /// An unsolvable LCP is returned as [`FrictionError::LcpUnsolved`]; the caller
    /// decides whether the failure is fatal.
    pub fn solve(&self, options: &LemkeOptions) -> Result<QpSolution> {
        let n = self.variable_count();
        let m = self.constraint_count();
        let (matrix, vector) = self.to_lcp();
        let solution = lcp::solve(&matrix, &vector, options)?;

        let x = solution.z.rows(0, n) - solution.z.rows(n, n);
        let multipliers = solution.z.rows(2 * n, m).into_owned();
        Ok(QpSolution {
            x,
            multipliers,
            regularization: solution.regularization,
        })
    }

    /// Objective value `½xᵀQx + cᵀx`.
    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.hessian * x)) + self.linear.dot(x)
    }

    /// Largest violation `max(b − Ax, 0)` over all constraints.
    pub fn max_violation(&self, x: &DVector<f64>) -> f64 {
        let slack = &self.constraints * x - &self.bounds;
        slack.iter().fold(0.0, |worst, &value| worst.max(-value))
    }
}
