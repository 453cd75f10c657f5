//! Contact force and Coulomb friction estimation for legged robots.
//!
//! Given the generalized velocity before and after a discrete dynamics update,
//! the external generalized force applied during the step and the contact
//! Jacobians of the active feet, this crate infers the per-contact impulses
//! that best explain the observed momentum change and the friction ratio each
//! contact implies. The pipeline consists of
//!
//! - a least-squares quadratic program with nonnegative normal impulses,
//!   solved by reduction to a linear complementarity problem (`qp`, `lcp`),
//! - a nullspace refinement that selects the minimum-norm solution when the
//!   contact basis is redundant (`nullspace`, `estimation`),
//! - extraction of one Coulomb ratio per contact (`friction`), and
//! - a two-phase estimator that carries the pre-event force and the previous
//!   velocity between calls (`estimator`).
//!
//! # Quick start
//!
//! ```no_run
//! use frictionest::{ContactJacobians, EstimatorOptions, FrictionEstimator};
//! use nalgebra::{DMatrix, DVector};
//!
//! let ngc = 6;
//! let mass = DMatrix::<f64>::identity(ngc, ngc);
//! let mut normal = DMatrix::zeros(ngc, 1);
//! normal[(2, 0)] = 1.0;
//! let jacobians = ContactJacobians::new(normal, DMatrix::zeros(ngc, 4)).expect("valid Jacobians");
//!
//! let mut estimator = FrictionEstimator::new(EstimatorOptions::default());
//! estimator.pre_event(DVector::zeros(ngc)).expect("finite force");
//!
//! let mut velocity = DVector::zeros(ngc);
//! velocity[2] = 0.1;
//! let report = estimator
//!     .post_event(velocity, &jacobians, &mass, 0.01)
//!     .expect("well-formed inputs");
//! println!("norm error {}, mu {}", report.norm_error, report.mu);
//! ```

pub mod contact;
pub mod diagnostics;
pub mod error;
pub mod estimation;
pub mod estimator;
pub mod friction;
pub mod lcp;
pub mod nullspace;
pub mod options;
pub mod qp;
pub mod synthetic;

pub use contact::{ContactBasis, ContactJacobians};
pub use error::{FrictionError, Result};
pub use estimation::{ContactSolution, Refinement};
pub use estimator::{CycleStatus, EstimationReport, FrictionEstimator, Phase, NOT_ESTIMATED};
pub use friction::FrictionEstimate;
pub use lcp::LemkeOptions;
pub use options::{EstimatorOptions, Representation};
