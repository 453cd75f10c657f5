//! Two-stage contact impulse estimation: a least-squares QP that explains the
//! momentum residual, then a minimum-norm refinement inside the nullspace of
//! its Hessian.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::contact::ContactBasis;
use crate::error::{FrictionError, Result};
use crate::lcp::LemkeOptions;
use crate::nullspace::Nullspace;
use crate::qp::QuadraticProgram;

/// Generalized impulse left unexplained by the known external force:
/// `jstar = M(v − v_) − f·dt`.
pub fn momentum_residual(
    mass: &DMatrix<f64>,
    velocity: &DVector<f64>,
    previous_velocity: &DVector<f64>,
    force: &DVector<f64>,
    dt: f64,
) -> Result<DVector<f64>> {
    let ngc = mass.nrows();
    if mass.ncols() != ngc {
        return Err(FrictionError::invalid_dimension("mass matrix columns", ngc, mass.ncols()));
    }
    for (context, len) in [
        ("velocity length", velocity.len()),
        ("previous velocity length", previous_velocity.len()),
        ("external force length", force.len()),
    ] {
        if len != ngc {
            return Err(FrictionError::invalid_dimension(context, ngc, len));
        }
    }
    Ok(mass * (velocity - previous_velocity) - force * dt)
}

/// Outcome of the nullspace refinement for one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refinement {
    /// The Stage I Hessian had full rank (or refinement was disabled).
    NotNeeded,
    /// The correction `P·w` was applied.
    Applied { nullity: usize },
    /// The refinement QP failed; the Stage I impulses were kept.
    Failed { nullity: usize },
}

/// Contact impulses that best reproduce a momentum residual.
#[derive(Clone, Debug)]
pub struct ContactSolution {
    /// Decision vector `z` laid out as in [`ContactBasis`].
    pub impulses: DVector<f64>,
    /// `R·z − jstar`.
    pub residual: DVector<f64>,
    /// `‖R·z − jstar‖`.
    pub norm_error: f64,
    /// Refinement outcome.
    pub refinement: Refinement,
    /// Largest diagonal shift any stage needed before its LCP was solved.
    pub regularization: Option<f64>,
}

/// Stage I program: `min ½‖Rz − jstar‖²` with `Q = RᵀR`, `c = −Rᵀjstar` and
/// the sign constraints of the basis.
pub fn stage_one_program(basis: &ContactBasis, jstar: &DVector<f64>) -> Result<QuadraticProgram> {
    let r = basis.matrix();
    if jstar.len() != r.nrows() {
        return Err(FrictionError::invalid_dimension(
            "momentum residual length",
            r.nrows(),
            jstar.len(),
        ));
    }
    let r_t = r.transpose();
    let hessian = &r_t * r;
    let linear = -(&r_t * jstar);
    let constraints = basis.sign_constraints();
    let bounds = DVector::zeros(constraints.nrows());
    QuadraticProgram::new(hessian, linear, constraints, bounds)
}

/// Solves Stage I and reports the impulses with their residual.
pub fn stage_one(
    basis: &ContactBasis,
    jstar: &DVector<f64>,
    options: &LemkeOptions,
) -> Result<ContactSolution> {
    let program = stage_one_program(basis, jstar)?;
    solve_stage_one(basis, jstar, &program, options)
}

fn solve_stage_one(
    basis: &ContactBasis,
    jstar: &DVector<f64>,
    program: &QuadraticProgram,
    options: &LemkeOptions,
) -> Result<ContactSolution> {
    let solution = program.solve(options)?;
    if let Some(shift) = solution.regularization {
        warn!("stage I LCP accepted only after regularizing by {shift:e}");
    }
    Ok(ContactSolution {
        regularization: solution.regularization,
        ..evaluate(basis, jstar, solution.x, Refinement::NotNeeded)
    })
}

/// Stage II program over the nullspace coordinates `w`:
///
/// - objective `½‖z + Pw‖²`, i.e. `Q₂ = PᵀP`, `c₂ = Pᵀz`;
/// - row 0: `(Pᵀc)ᵀw ≥ 0`, with `c` the Stage I linear cost;
/// - remaining rows: `P[i, :]·w ≥ −z[i]` for every sign-constrained entry `i`.
pub fn refinement_program(
    basis: &ContactBasis,
    stage_one: &QuadraticProgram,
    impulses: &DVector<f64>,
    nullspace: &Nullspace,
) -> Result<QuadraticProgram> {
    let p = nullspace.basis();
    let m = p.ncols();
    let constrained = basis.constrained_count();
    let p_t = p.transpose();

    let hessian = &p_t * p;
    let linear = &p_t * impulses;

    let mut constraints = DMatrix::zeros(constrained + 1, m);
    let mut bounds = DVector::zeros(constrained + 1);
    constraints.set_row(0, &(&p_t * &stage_one.linear).transpose());
    constraints.rows_mut(1, constrained).copy_from(&p.rows(0, constrained));
    bounds.rows_mut(1, constrained).copy_from(&(-impulses.rows(0, constrained)));

    QuadraticProgram::new(hessian, linear, constraints, bounds)
}

/// Stage I followed, when `Q` is rank deficient, by the nullspace refinement.
///
/// A Stage I failure is returned as an error. A refinement failure is not: the
/// Stage I impulses are returned with [`Refinement::Failed`].
pub fn solve_contact_impulses(
    basis: &ContactBasis,
    jstar: &DVector<f64>,
    options: &LemkeOptions,
    rank_tolerance: Option<f64>,
    refine: bool,
) -> Result<ContactSolution> {
    let program = stage_one_program(basis, jstar)?;
    let stage_one = solve_stage_one(basis, jstar, &program, options)?;
    debug!(
        "stage I: {} variables, norm error {:e}",
        basis.variable_count(),
        stage_one.norm_error
    );
    if !refine {
        return Ok(stage_one);
    }
    refine_impulses(basis, jstar, &program, stage_one, options, rank_tolerance)
}

/// Moves `stage_one` within the nullspace of the Stage I Hessian towards the
/// minimum-norm impulse with the same residual.
///
/// A solver failure in the refinement keeps `stage_one` and marks it
/// [`Refinement::Failed`].
pub fn refine_impulses(
    basis: &ContactBasis,
    jstar: &DVector<f64>,
    program: &QuadraticProgram,
    stage_one: ContactSolution,
    options: &LemkeOptions,
    rank_tolerance: Option<f64>,
) -> Result<ContactSolution> {
    let nullspace = Nullspace::of(&program.hessian, rank_tolerance)?;
    let nullity = nullspace.nullity();
    debug!("stage II: nullity {nullity}");
    if nullspace.is_trivial() {
        return Ok(stage_one);
    }

    let second = refinement_program(basis, program, &stage_one.impulses, &nullspace)?;
    match second.solve(options) {
        Ok(solution) => {
            if let Some(shift) = solution.regularization {
                warn!("stage II LCP accepted only after regularizing by {shift:e}");
            }
            let regularization = stage_one
                .regularization
                .into_iter()
                .chain(solution.regularization)
                .reduce(f64::max);
            let impulses = &stage_one.impulses + nullspace.basis() * solution.x;
            let refined = ContactSolution {
                regularization,
                ..evaluate(basis, jstar, impulses, Refinement::Applied { nullity })
            };
            debug!("stage II: norm error {:e}", refined.norm_error);
            Ok(refined)
        }
        Err(error) if error.is_solver_failure() => {
            warn!("nullspace refinement failed ({error}); keeping stage I impulses");
            Ok(ContactSolution {
                refinement: Refinement::Failed { nullity },
                ..stage_one
            })
        }
        Err(error) => Err(error),
    }
}

fn evaluate(
    basis: &ContactBasis,
    jstar: &DVector<f64>,
    impulses: DVector<f64>,
    refinement: Refinement,
) -> ContactSolution {
    let residual = basis.generalized_impulse(&impulses) - jstar;
    let norm_error = residual.norm();
    ContactSolution {
        impulses,
        residual,
        norm_error,
        refinement,
        regularization: None,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::contact::ContactJacobians;
    use crate::options::Representation;

    /// One contact on a point mass in 3D: normal +z, directions ±x, ±y.
    fn point_contact() -> ContactJacobians {
        let normal = DMatrix::from_column_slice(3, 1, &[0.0, 0.0, 1.0]);
        #[rustfmt::skip]
        let tangent = DMatrix::from_row_slice(3, 4, &[
            1.0, 0.0, -1.0,  0.0,
            0.0, 1.0,  0.0, -1.0,
            0.0, 0.0,  0.0,  0.0,
        ]);
        ContactJacobians::new(normal, tangent).unwrap()
    }

    #[test]
    fn momentum_residual_subtracts_scaled_force() {
        let mass = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 2.0]));
        let v = DVector::from_vec(vec![1.0, 0.5]);
        let v_prev = DVector::from_vec(vec![0.0, 0.5]);
        let f = DVector::from_vec(vec![10.0, -10.0]);
        let jstar = momentum_residual(&mass, &v, &v_prev, &f, 0.1).unwrap();
        assert_relative_eq!(jstar, DVector::from_vec(vec![1.0, 1.0]), epsilon = 1e-12);
    }

    #[test]
    fn momentum_residual_rejects_short_force() {
        let mass = DMatrix::identity(3, 3);
        let v = DVector::zeros(3);
        let result = momentum_residual(&mass, &v, &v, &DVector::zeros(2), 0.01);
        assert!(matches!(
            result,
            Err(FrictionError::InvalidDimension { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn stage_one_recovers_reproducible_impulse() {
        let basis = ContactBasis::assemble(&point_contact(), Representation::Reduced);
        // normal 2, tangents (0.5, -0.25).
        let jstar = DVector::from_vec(vec![0.5, -0.25, 2.0]);
        let solution = stage_one(&basis, &jstar, &LemkeOptions::default()).unwrap();
        assert_relative_eq!(
            solution.impulses,
            DVector::from_vec(vec![2.0, 0.5, -0.25]),
            epsilon = 1e-9
        );
        assert_relative_eq!(solution.norm_error, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn stage_one_keeps_normal_impulse_nonnegative() {
        let basis = ContactBasis::assemble(&point_contact(), Representation::Reduced);
        // A pulling impulse cannot be explained; the best feasible normal is zero.
        let jstar = DVector::from_vec(vec![0.0, 0.0, -1.0]);
        let solution = stage_one(&basis, &jstar, &LemkeOptions::default()).unwrap();
        assert_relative_eq!(solution.impulses[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(solution.norm_error, 1.0, epsilon = 1e-9);

        let program = stage_one_program(&basis, &jstar).unwrap();
        assert!(program.max_violation(&solution.impulses) <= 1e-9);
    }

    #[test]
    fn refinement_picks_minimum_norm_polyhedral_impulse() {
        let basis = ContactBasis::assemble(&point_contact(), Representation::Full);
        let jstar = DVector::from_vec(vec![0.3, 0.0, 1.0]);
        let solution =
            solve_contact_impulses(&basis, &jstar, &LemkeOptions::default(), None, true).unwrap();

        // Antipodal directions make Q rank deficient by two.
        assert_eq!(solution.refinement, Refinement::Applied { nullity: 2 });
        assert_relative_eq!(solution.norm_error, 0.0, epsilon = 1e-8);
        // The minimum-norm split pushes only along +x.
        assert_relative_eq!(
            solution.impulses,
            DVector::from_vec(vec![1.0, 0.3, 0.0, 0.0, 0.0]),
            epsilon = 1e-8
        );
        assert!(solution.impulses.iter().all(|&value| value >= -1e-9));
    }

    #[test]
    fn full_rank_problem_skips_refinement() {
        let basis = ContactBasis::assemble(&point_contact(), Representation::Reduced);
        let jstar = DVector::from_vec(vec![0.1, 0.2, 1.0]);
        let solution =
            solve_contact_impulses(&basis, &jstar, &LemkeOptions::default(), None, true).unwrap();
        assert_eq!(solution.refinement, Refinement::NotNeeded);
    }

    #[test]
    fn refinement_constraints_bound_the_normal_rows() {
        let basis = ContactBasis::assemble(&point_contact(), Representation::Reduced);
        let jstar = DVector::from_vec(vec![0.0, 0.0, 1.0]);
        let program = stage_one_program(&basis, &jstar).unwrap();
        let impulses = DVector::from_vec(vec![1.0, 0.0, 0.0]);

        // Treat the two tangential axes as null directions to inspect the layout.
        let flat = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 0.0, 0.0]));
        let nullspace = Nullspace::of(&flat, None).unwrap();
        let second = refinement_program(&basis, &program, &impulses, &nullspace).unwrap();
        assert_eq!(second.variable_count(), 2);
        assert_eq!(second.constraint_count(), 2);
        assert_relative_eq!(second.bounds[0], 0.0);
        assert_relative_eq!(second.bounds[1], -1.0);
        assert_relative_eq!(second.hessian, DMatrix::identity(2, 2), epsilon = 1e-12);
    }

    /// Full-basis impulse that explains `(0.3, 0, 1)` but pushes 0.8 along +x
    /// and 0.5 along -x instead of 0.3 along +x alone.
    fn redundant_stage_one(basis: &ContactBasis, jstar: &DVector<f64>) -> ContactSolution {
        let impulses = DVector::from_vec(vec![1.0, 0.8, 0.0, 0.5, 0.0]);
        ContactSolution {
            regularization: Some(1e-8),
            ..evaluate(basis, jstar, impulses, Refinement::NotNeeded)
        }
    }

    #[test]
    fn refinement_failure_keeps_stage_one_impulses() {
        let basis = ContactBasis::assemble(&point_contact(), Representation::Full);
        let jstar = DVector::from_vec(vec![0.3, 0.0, 1.0]);
        let program = stage_one_program(&basis, &jstar).unwrap();
        let first = redundant_stage_one(&basis, &jstar);
        assert_relative_eq!(first.norm_error, 0.0, epsilon = 1e-12);

        // One pivot only admits LCPs with q ≥ 0; the correction here needs more.
        let starved = LemkeOptions {
            max_pivots: Some(1),
            ..Default::default()
        }
        .without_regularization();
        let solution =
            refine_impulses(&basis, &jstar, &program, first.clone(), &starved, None).unwrap();

        assert_eq!(solution.refinement, Refinement::Failed { nullity: 2 });
        assert_eq!(solution.impulses, first.impulses);
        assert_eq!(solution.norm_error, first.norm_error);
        assert_eq!(solution.regularization, Some(1e-8));
    }

    #[test]
    fn refinement_from_redundant_start_reaches_minimum_norm() {
        let basis = ContactBasis::assemble(&point_contact(), Representation::Full);
        let jstar = DVector::from_vec(vec![0.3, 0.0, 1.0]);
        let program = stage_one_program(&basis, &jstar).unwrap();
        let first = redundant_stage_one(&basis, &jstar);
        let solution =
            refine_impulses(&basis, &jstar, &program, first, &LemkeOptions::default(), None)
                .unwrap();

        assert_eq!(solution.refinement, Refinement::Applied { nullity: 2 });
        assert_relative_eq!(
            solution.impulses,
            DVector::from_vec(vec![1.0, 0.3, 0.0, 0.0, 0.0]),
            epsilon = 1e-8
        );
        // The stage I shift is still reported after a successful refinement.
        assert!(solution.regularization >= Some(1e-8));
    }
}
