//! Verification hook comparing an estimate against an externally supplied
//! reference contact-force vector (for example the simulator's own impulses).

use nalgebra::{DMatrix, DVector};

use crate::contact::ContactBasis;
use crate::error::{FrictionError, Result};

/// What a reference contact-force vector implies for the same cycle.
#[derive(Clone, Debug)]
pub struct CrossCheck {
    /// Generalized impulse `R·cf_ref`.
    pub generalized_impulse: DVector<f64>,
    /// Velocity change `M⁻¹·R·cf_ref` the reference forces would cause.
    pub velocity_change: DVector<f64>,
    /// `R·cf_ref − jstar`.
    pub residual: DVector<f64>,
    /// `‖R·cf_ref − jstar‖`, comparable to the estimator's norm error.
    pub norm_error: f64,
}

/// Evaluates `reference` (laid out like the decision vector of `basis`)
/// against the momentum residual `jstar`.
pub fn cross_check(
    basis: &ContactBasis,
    mass: &DMatrix<f64>,
    jstar: &DVector<f64>,
    reference: &DVector<f64>,
) -> Result<CrossCheck> {
    let ngc = basis.matrix().nrows();
    if reference.len() != basis.variable_count() {
        return Err(FrictionError::invalid_dimension(
            "reference contact forces",
            basis.variable_count(),
            reference.len(),
        ));
    }
    if mass.nrows() != ngc || mass.ncols() != ngc {
        return Err(FrictionError::invalid_dimension("mass matrix", ngc, mass.nrows()));
    }
    if jstar.len() != ngc {
        return Err(FrictionError::invalid_dimension("momentum residual length", ngc, jstar.len()));
    }

    let generalized_impulse = basis.generalized_impulse(reference);
    let cholesky = nalgebra::linalg::Cholesky::new(mass.clone())
        .ok_or_else(|| FrictionError::singular("mass matrix"))?;
    let velocity_change = cholesky.solve(&generalized_impulse);
    let residual = &generalized_impulse - jstar;
    let norm_error = residual.norm();

    Ok(CrossCheck {
        generalized_impulse,
        velocity_change,
        residual,
        norm_error,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::contact::ContactJacobians;
    use crate::options::Representation;

    fn basis() -> ContactBasis {
        let normal = DMatrix::from_column_slice(3, 1, &[0.0, 0.0, 1.0]);
        ContactBasis::assemble(
            &ContactJacobians::new(normal, DMatrix::zeros(3, 2)).unwrap(),
            Representation::Reduced,
        )
    }

    #[test]
    fn reference_forces_map_to_velocity_change() {
        let mass = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0, 4.0]));
        let jstar = DVector::from_vec(vec![0.0, 0.0, 2.0]);
        let reference = DVector::from_vec(vec![2.0, 0.0]);
        let check = cross_check(&basis(), &mass, &jstar, &reference).unwrap();
        assert_relative_eq!(check.velocity_change[2], 0.5, epsilon = 1e-12);
        assert_relative_eq!(check.norm_error, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_mass_matrix_is_reported() {
        let mass = DMatrix::zeros(3, 3);
        let jstar = DVector::zeros(3);
        let result = cross_check(&basis(), &mass, &jstar, &DVector::zeros(2));
        assert!(matches!(result, Err(FrictionError::SingularMatrix { .. })));
    }
}
