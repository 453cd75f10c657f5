//! Two-phase orchestration of the estimation pipeline.
//!
//! A control loop samples the external generalized force before the contact
//! event (`pre_event`) and the resulting velocity after it (`post_event`). The
//! estimator carries the pending force and the previous velocity between the
//! two calls; nothing else persists across cycles.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

use crate::contact::{ContactBasis, ContactJacobians};
use crate::error::{ensure_finite, FrictionError, Result};
use crate::estimation::{momentum_residual, solve_contact_impulses, Refinement};
use crate::friction::FrictionEstimate;
use crate::options::EstimatorOptions;

/// Norm error reported when no estimation was performed.
pub const NOT_ESTIMATED: f64 = -1.0;

/// Which sample the estimator expects next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    AwaitingPreEvent,
    AwaitingPostEvent,
}

/// What happened during a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleStatus {
    /// Pre-event sample stored, or no active contacts.
    Skipped,
    /// Stage I succeeded; the refinement outcome is attached.
    Solved { refinement: Refinement },
    /// Stage I could not be solved; previous outputs were kept.
    StageOneFailed,
}

/// Output of one call to the estimator.
#[derive(Clone, Debug)]
pub struct EstimationReport {
    /// Residual norm `‖Rz − jstar‖`, or [`NOT_ESTIMATED`].
    pub norm_error: f64,
    /// Friction ratios, one row per contact (latest successful estimate).
    pub mu: DMatrix<f64>,
    /// Contact forces of the latest successful estimate.
    pub contact_forces: DVector<f64>,
    pub status: CycleStatus,
    /// Diagonal shift the LCP solver needed in this cycle, if any.
    pub regularization: Option<f64>,
}

impl EstimationReport {
    /// Whether this call produced a fresh estimate.
    pub fn is_estimated(&self) -> bool {
        matches!(self.status, CycleStatus::Solved { .. })
    }
}

/// Contact force and friction estimator with explicit per-instance state.
///
/// Each robot (or independent estimation stream) owns its own instance.
#[derive(Clone, Debug)]
pub struct FrictionEstimator {
    options: EstimatorOptions,
    pending_force: Option<DVector<f64>>,
    previous_velocity: Option<DVector<f64>>,
    last: Option<FrictionEstimate>,
    cycles: usize,
}

impl Default for FrictionEstimator {
    fn default() -> Self {
        Self::new(EstimatorOptions::default())
    }
}

impl FrictionEstimator {
    pub fn new(options: EstimatorOptions) -> Self {
        Self {
            options,
            pending_force: None,
            previous_velocity: None,
            last: None,
            cycles: 0,
        }
    }

    /// Accessor for the configuration.
    pub fn options(&self) -> &EstimatorOptions {
        &self.options
    }

    /// Replaces the configuration; the carried force and velocity are kept.
    pub fn set_options(&mut self, options: EstimatorOptions) {
        self.options = options;
    }

    /// Phase implied by whether a pre-event force is pending.
    pub fn phase(&self) -> Phase {
        if self.pending_force.is_some() {
            Phase::AwaitingPostEvent
        } else {
            Phase::AwaitingPreEvent
        }
    }

    /// Number of post-event cycles that attempted an estimation.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Latest successful estimate, if any.
    pub fn last_estimate(&self) -> Option<&FrictionEstimate> {
        self.last.as_ref()
    }

    /// Forgets the carried force, velocity and outputs.
    pub fn reset(&mut self) {
        self.pending_force = None;
        self.previous_velocity = None;
        self.last = None;
        self.cycles = 0;
    }

    /// Stores the external generalized force sampled before the contact event.
    ///
    /// A second call before `post_event` replaces the pending sample.
    pub fn pre_event(&mut self, force: DVector<f64>) -> Result<EstimationReport> {
        ensure_finite(force.iter(), "external force")?;
        self.pending_force = Some(force);
        Ok(self.report(NOT_ESTIMATED, CycleStatus::Skipped))
    }

    /// Estimates contact forces from the velocity sampled after the event.
    ///
    /// Inputs are validated before any state changes. Without a preceding
    /// `pre_event` the external force is taken as zero; on the first cycle the
    /// previous velocity is taken as zero.
    pub fn post_event(
        &mut self,
        velocity: DVector<f64>,
        jacobians: &ContactJacobians,
        mass: &DMatrix<f64>,
        dt: f64,
    ) -> Result<EstimationReport> {
        let ngc = self.validate(&velocity, jacobians, mass, dt)?;

        if jacobians.contact_count() == 0 {
            debug!("no active contacts; skipping estimation");
            self.pending_force = None;
            self.previous_velocity = Some(velocity);
            return Ok(self.report(NOT_ESTIMATED, CycleStatus::Skipped));
        }

        let force = self.pending_force.take().unwrap_or_else(|| {
            warn!("post-event sample without a preceding pre-event force; assuming zero force");
            DVector::zeros(ngc)
        });
        let previous = self
            .previous_velocity
            .replace(velocity.clone())
            .unwrap_or_else(|| DVector::zeros(ngc));
        self.cycles += 1;

        let jstar = momentum_residual(mass, &velocity, &previous, &force, dt)?;
        debug!(
            "cycle {}: {} contacts, {} directions each, dt {dt}, |jstar| {:e}",
            self.cycles,
            jacobians.contact_count(),
            jacobians.directions_per_contact(),
            jstar.norm()
        );

        let basis = ContactBasis::assemble(jacobians, self.options.representation);
        let solution = match solve_contact_impulses(
            &basis,
            &jstar,
            &self.options.lcp,
            self.options.rank_tolerance,
            self.options.refine,
        ) {
            Ok(solution) => solution,
            Err(error) if error.is_solver_failure() => {
                warn!("friction estimation failed in cycle {}: {error}", self.cycles);
                return Ok(self.report(NOT_ESTIMATED, CycleStatus::StageOneFailed));
            }
            Err(error) => return Err(error),
        };

        let estimate = FrictionEstimate::from_impulses(&basis, &solution.impulses);
        info!(
            "cycle {}: norm error {:e}, mu {:?}",
            self.cycles,
            solution.norm_error,
            estimate.coefficients.as_slice()
        );
        self.last = Some(estimate);
        Ok(EstimationReport {
            regularization: solution.regularization,
            ..self.report(
                solution.norm_error,
                CycleStatus::Solved {
                    refinement: solution.refinement,
                },
            )
        })
    }

    /// Single-call entry point: stores `force` when `post_event` is false,
    /// otherwise estimates from `velocity` and the contact Jacobians `n`, `d`.
    #[allow(clippy::too_many_arguments)]
    pub fn estimate(
        &mut self,
        velocity: &DVector<f64>,
        force: &DVector<f64>,
        dt: f64,
        n: &DMatrix<f64>,
        d: &DMatrix<f64>,
        mass: &DMatrix<f64>,
        post_event: bool,
    ) -> Result<EstimationReport> {
        if post_event {
            let jacobians = ContactJacobians::new(n.clone(), d.clone())?;
            self.post_event(velocity.clone(), &jacobians, mass, dt)
        } else {
            self.pre_event(force.clone())
        }
    }

    fn validate(
        &self,
        velocity: &DVector<f64>,
        jacobians: &ContactJacobians,
        mass: &DMatrix<f64>,
        dt: f64,
    ) -> Result<usize> {
        let ngc = mass.nrows();
        if mass.ncols() != ngc {
            return Err(FrictionError::invalid_dimension("mass matrix columns", ngc, mass.ncols()));
        }
        if velocity.len() != ngc {
            return Err(FrictionError::invalid_dimension("velocity length", ngc, velocity.len()));
        }
        if jacobians.generalized_dim() != ngc {
            return Err(FrictionError::invalid_dimension(
                "contact Jacobian rows",
                ngc,
                jacobians.generalized_dim(),
            ));
        }
        if let Some(force) = &self.pending_force {
            if force.len() != ngc {
                return Err(FrictionError::invalid_dimension(
                    "external force length",
                    ngc,
                    force.len(),
                ));
            }
        }
        if let Some(previous) = &self.previous_velocity {
            if previous.len() != ngc {
                return Err(FrictionError::invalid_dimension(
                    "previous velocity length",
                    ngc,
                    previous.len(),
                ));
            }
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(FrictionError::InvalidTimestep { dt });
        }
        ensure_finite(mass.iter(), "mass matrix")?;
        ensure_finite(velocity.iter(), "velocity")?;
        Ok(ngc)
    }

    fn report(&self, norm_error: f64, status: CycleStatus) -> EstimationReport {
        let (mu, contact_forces) = match &self.last {
            Some(estimate) => (estimate.mu.clone(), estimate.contact_forces.clone()),
            None => (DMatrix::zeros(0, 0), DVector::zeros(0)),
        };
        EstimationReport {
            norm_error,
            mu,
            contact_forces,
            status,
            regularization: None,
        }
    }
}
