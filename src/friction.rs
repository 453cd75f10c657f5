//! Per-contact force layout and Coulomb friction ratios.

use nalgebra::{DMatrix, DVector};

use crate::contact::ContactBasis;
use crate::options::Representation;

/// Resolved contact forces and the friction ratio they imply at each contact.
#[derive(Clone, Debug)]
pub struct FrictionEstimate {
    /// `[normals (nc), pair-0 tangents (nc), pair-1 tangents (nc), …]`.
    pub contact_forces: DVector<f64>,
    /// One ratio per contact; NaN where the contact is not compressive.
    pub coefficients: DVector<f64>,
    /// `nc × nk/2` matrix with each contact's ratio repeated across its row.
    pub mu: DMatrix<f64>,
}

impl FrictionEstimate {
    /// Derives contact forces and friction ratios from a decision vector.
    pub fn from_impulses(basis: &ContactBasis, impulses: &DVector<f64>) -> Self {
        let nc = basis.contact_count();
        let pairs = basis.tangent_pairs();
        let contact_forces = contact_forces(basis, impulses);
        let coefficients = friction_coefficients(&contact_forces, nc, pairs);
        let mu = coefficient_matrix(&coefficients, pairs);
        Self {
            contact_forces,
            coefficients,
            mu,
        }
    }

    /// Number of contacts covered by this estimate.
    pub fn contact_count(&self) -> usize {
        self.coefficients.len()
    }
}

/// Maps `z` onto the representation-independent force layout.
///
/// The reduced basis already stores signed tangents. The full basis stores
/// nonnegative magnitudes along `nk` directions; pair `k` of contact `i` is the
/// difference between direction `k` and its antipode `k + nk/2`.
pub fn contact_forces(basis: &ContactBasis, impulses: &DVector<f64>) -> DVector<f64> {
    match basis.representation() {
        Representation::Reduced => impulses.clone(),
        Representation::Full => {
            let nc = basis.contact_count();
            let nk = basis.directions_per_contact();
            let pairs = basis.tangent_pairs();
            let mut forces = DVector::zeros(nc + nc * pairs);
            for i in 0..nc {
                forces[i] = impulses[i];
                let first = nc + nk * i;
                for k in 0..pairs {
                    forces[nc + k * nc + i] = impulses[first + k] - impulses[first + k + pairs];
                }
            }
            forces
        }
    }
}

/// Coulomb ratio `‖t‖ / n` for each contact, NaN when `n ≤ 0`.
///
/// With two tangent pairs this is `sqrt(t1² + t2²) / n`, the circular cone
/// matching the polyhedral discretization.
pub fn friction_coefficients(
    contact_forces: &DVector<f64>,
    contacts: usize,
    pairs: usize,
) -> DVector<f64> {
    DVector::from_fn(contacts, |i, _| {
        let normal = contact_forces[i];
        if normal > 0.0 {
            let tangential = (0..pairs)
                .map(|k| contact_forces[contacts + k * contacts + i].powi(2))
                .sum::<f64>()
                .sqrt();
            tangential / normal
        } else {
            f64::NAN
        }
    })
}

/// Broadcasts each contact's ratio across `pairs` columns.
pub fn coefficient_matrix(coefficients: &DVector<f64>, pairs: usize) -> DMatrix<f64> {
    DMatrix::from_fn(coefficients.len(), pairs.max(1), |i, _| coefficients[i])
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::contact::ContactJacobians;

    #[test]
    fn ratio_matches_circular_cone_formula() {
        // Two contacts: (n, t1, t2) = (2, 0.3, 0.4) and (1, -0.6, 0.8).
        let forces = DVector::from_vec(vec![2.0, 1.0, 0.3, -0.6, 0.4, 0.8]);
        let mu = friction_coefficients(&forces, 2, 2);
        assert_relative_eq!(mu[0], 0.25, epsilon = 1e-15);
        assert_relative_eq!(mu[1], 1.0, epsilon = 1e-15);
    }

    #[test]
    fn non_compressive_contact_yields_nan() {
        let forces = DVector::from_vec(vec![0.0, -1.0, 0.5, 0.5, 0.1, 0.1]);
        let mu = friction_coefficients(&forces, 2, 2);
        assert!(mu[0].is_nan());
        assert!(mu[1].is_nan());
    }

    #[test]
    fn full_representation_differences_antipodal_pairs() {
        let normal = DMatrix::from_column_slice(3, 1, &[0.0, 0.0, 1.0]);
        #[rustfmt::skip]
        let tangent = DMatrix::from_row_slice(3, 4, &[
            1.0, 0.0, -1.0,  0.0,
            0.0, 1.0,  0.0, -1.0,
            0.0, 0.0,  0.0,  0.0,
        ]);
        let jacobians = ContactJacobians::new(normal, tangent).unwrap();
        let basis = ContactBasis::assemble(&jacobians, Representation::Full);

        let z = DVector::from_vec(vec![5.0, 1.0, 0.0, 4.0, 3.0]);
        let estimate = FrictionEstimate::from_impulses(&basis, &z);
        assert_eq!(estimate.contact_forces, DVector::from_vec(vec![5.0, -3.0, -3.0]));
        assert_relative_eq!(estimate.coefficients[0], 18f64.sqrt() / 5.0, epsilon = 1e-15);
        assert_eq!(estimate.mu.shape(), (1, 2));
        assert_eq!(estimate.mu[(0, 1)], estimate.mu[(0, 0)]);
    }
}
