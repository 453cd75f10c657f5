//! Seeded synthetic contact scenarios with a known ground truth.
//!
//! A scenario draws random contact Jacobians, a symmetric positive definite
//! mass matrix and a ground-truth impulse vector (in the reduced layout) whose
//! normal components are strictly positive. The post-event velocity is then
//! chosen so that the momentum residual is reproduced exactly by that impulse.

use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::contact::{ContactBasis, ContactJacobians};
use crate::error::{FrictionError, Result};
use crate::options::Representation;

/// One synthetic estimation cycle.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub jacobians: ContactJacobians,
    pub mass: DMatrix<f64>,
    pub dt: f64,
    /// External generalized force sampled before the event.
    pub force: DVector<f64>,
    pub previous_velocity: DVector<f64>,
    pub velocity: DVector<f64>,
    /// Ground-truth impulses `[normals, pair tangents…]` in the reduced layout.
    pub impulses: DVector<f64>,
}

impl Scenario {
    /// Friction ratio of the ground truth at each contact.
    pub fn true_coefficients(&self) -> DVector<f64> {
        let nc = self.jacobians.contact_count();
        crate::friction::friction_coefficients(&self.impulses, nc, self.jacobians.tangent_pairs())
    }
}

/// Builder for [`Scenario`]s.
#[derive(Clone, Debug)]
pub struct ScenarioBuilder {
    generalized_dim: usize,
    contacts: usize,
    directions: usize,
    dt: f64,
    max_ratio: f64,
}

impl ScenarioBuilder {
    /// Start from `ngc` generalized coordinates and `nc` contacts with four
    /// friction directions each.
    pub fn new(generalized_dim: usize, contacts: usize) -> Self {
        Self {
            generalized_dim,
            contacts,
            directions: 4,
            dt: 0.01,
            max_ratio: 0.8,
        }
    }

    /// Number of polyhedral directions per contact (even, at least 2).
    pub fn directions(mut self, directions: usize) -> Self {
        self.directions = directions;
        self
    }

    pub fn timestep(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Upper bound on the per-pair tangent/normal ratio of the ground truth.
    pub fn max_ratio(mut self, max_ratio: f64) -> Self {
        self.max_ratio = max_ratio;
        self
    }

    /// Draws a scenario from a seeded generator.
    pub fn build(&self, seed: u64) -> Result<Scenario> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let ngc = self.generalized_dim;
        let nc = self.contacts;
        let nk = self.directions;
        let pairs = nk / 2;

        let normal = gaussian_matrix(&mut rng, ngc, nc);
        // Direction k + nk/2 is the antipode of direction k.
        let mut tangent = DMatrix::zeros(ngc, nc * nk);
        for i in 0..nc {
            for k in 0..pairs {
                let column = gaussian_matrix(&mut rng, ngc, 1);
                tangent.set_column(nk * i + k, &column.column(0));
                tangent.set_column(nk * i + k + pairs, &(-column.column(0)));
            }
        }
        let jacobians = ContactJacobians::new(normal, tangent)?;

        let root = gaussian_matrix(&mut rng, ngc, ngc);
        let mass = &root * root.transpose() + DMatrix::identity(ngc, ngc) * ngc as f64;

        let mut impulses = DVector::zeros(nc + nc * pairs);
        for i in 0..nc {
            let normal_impulse: f64 = rng.gen_range(0.5..2.0);
            impulses[i] = normal_impulse;
            for k in 0..pairs {
                let ratio: f64 = if self.max_ratio > 0.0 {
                    rng.gen_range(-self.max_ratio..self.max_ratio)
                } else {
                    0.0
                };
                impulses[nc + k * nc + i] = ratio * normal_impulse;
            }
        }

        let force = gaussian_matrix(&mut rng, ngc, 1).column(0).into_owned();
        let previous_velocity = gaussian_matrix(&mut rng, ngc, 1).column(0).into_owned();

        // M(v − v_) = R·z + f·dt  ⇒  v = v_ + M⁻¹(R·z + f·dt).
        let basis = ContactBasis::assemble(&jacobians, Representation::Reduced);
        let target = basis.generalized_impulse(&impulses) + &force * self.dt;
        let cholesky = nalgebra::linalg::Cholesky::new(mass.clone())
            .ok_or_else(|| FrictionError::singular("synthetic mass matrix"))?;
        let velocity = &previous_velocity + cholesky.solve(&target);

        Ok(Scenario {
            jacobians,
            mass,
            dt: self.dt,
            force,
            previous_velocity,
            velocity,
            impulses,
        })
    }
}

fn gaussian_matrix(rng: &mut SmallRng, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| StandardNormal.sample(&mut *rng))
}
