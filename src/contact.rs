//! Contact Jacobians and the combined normal/tangential basis `R`.

use nalgebra::{DMatrix, DVector};

use crate::error::{ensure_finite, FrictionError, Result};
use crate::options::Representation;

/// Normal (`N`) and polyhedral tangent (`D`) Jacobians of the active contacts.
///
/// Column `i` of `N` is the normal direction of contact `i`. Columns
/// `nk·i .. nk·(i+1)` of `D` hold its `nk` friction directions, where direction
/// `j + nk/2` is the antipode of direction `j`.
#[derive(Clone, Debug)]
pub struct ContactJacobians {
    normal: DMatrix<f64>,
    tangent: DMatrix<f64>,
    directions: usize,
}

impl ContactJacobians {
    /// Validates shapes and derives the number of friction directions per contact.
    pub fn new(normal: DMatrix<f64>, tangent: DMatrix<f64>) -> Result<Self> {
        let ngc = normal.nrows();
        if tangent.nrows() != ngc {
            return Err(FrictionError::invalid_dimension("D rows", ngc, tangent.nrows()));
        }
        ensure_finite(normal.iter(), "normal Jacobian")?;
        ensure_finite(tangent.iter(), "tangent Jacobian")?;

        let nc = normal.ncols();
        let directions = if nc == 0 {
            if tangent.ncols() != 0 {
                return Err(FrictionError::invalid_dimension("D columns", 0, tangent.ncols()));
            }
            0
        } else {
            if tangent.ncols() % nc != 0 {
                let next_multiple = (tangent.ncols() / nc + 1) * nc;
                return Err(FrictionError::invalid_dimension(
                    "D columns",
                    next_multiple,
                    tangent.ncols(),
                ));
            }
            let nk = tangent.ncols() / nc;
            if nk < 2 || nk % 2 != 0 {
                return Err(FrictionError::OddDirectionCount { directions: nk });
            }
            nk
        };

        Ok(Self {
            normal,
            tangent,
            directions,
        })
    }

    /// Number of active contacts (`nc`).
    pub fn contact_count(&self) -> usize {
        self.normal.ncols()
    }

    /// Polyhedral friction directions per contact (`nk`); zero without contacts.
    pub fn directions_per_contact(&self) -> usize {
        self.directions
    }

    /// Antipodal direction pairs per contact (`nk / 2`).
    pub fn tangent_pairs(&self) -> usize {
        self.directions / 2
    }

    /// Number of generalized coordinates (`ngc`).
    pub fn generalized_dim(&self) -> usize {
        self.normal.nrows()
    }

    /// Normal Jacobian `N`.
    pub fn normal(&self) -> &DMatrix<f64> {
        &self.normal
    }

    /// Polyhedral tangent Jacobian `D`.
    pub fn tangent(&self) -> &DMatrix<f64> {
        &self.tangent
    }

    /// Reduced tangent basis `ST`: direction `k < nk/2` of contact `i` lands in
    /// column `k·nc + i`, so for `nk = 4` the result is the two-block `[S T]`.
    pub fn reduced_tangent(&self) -> DMatrix<f64> {
        let nc = self.contact_count();
        let nk = self.directions;
        let pairs = self.tangent_pairs();
        let mut reduced = DMatrix::zeros(self.generalized_dim(), nc * pairs);
        for i in 0..nc {
            for k in 0..pairs {
                reduced.set_column(k * nc + i, &self.tangent.column(nk * i + k));
            }
        }
        reduced
    }
}

/// The contact basis `R = [N | T]`, with `T` chosen by the [`Representation`].
///
/// The decision vector `z` has the normal magnitudes first, followed by one
/// entry per column of `T`.
#[derive(Clone, Debug)]
pub struct ContactBasis {
    matrix: DMatrix<f64>,
    representation: Representation,
    contacts: usize,
    directions: usize,
}

impl ContactBasis {
    /// Assembles `R` from validated Jacobians.
    pub fn assemble(jacobians: &ContactJacobians, representation: Representation) -> Self {
        let tangent = match representation {
            Representation::Full => jacobians.tangent().clone(),
            Representation::Reduced => jacobians.reduced_tangent(),
        };
        let nc = jacobians.contact_count();
        let mut matrix = DMatrix::zeros(jacobians.generalized_dim(), nc + tangent.ncols());
        matrix.columns_mut(0, nc).copy_from(jacobians.normal());
        matrix.columns_mut(nc, tangent.ncols()).copy_from(&tangent);

        Self {
            matrix,
            representation,
            contacts: nc,
            directions: jacobians.directions_per_contact(),
        }
    }

    /// The assembled matrix `R` (`ngc × n`).
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn contact_count(&self) -> usize {
        self.contacts
    }

    pub fn directions_per_contact(&self) -> usize {
        self.directions
    }

    pub fn tangent_pairs(&self) -> usize {
        self.directions / 2
    }

    /// Length of the decision vector `z`.
    pub fn variable_count(&self) -> usize {
        self.matrix.ncols()
    }

    /// Leading entries of `z` that must stay nonnegative: the normal magnitudes
    /// for the reduced basis, every entry for the full polyhedral basis.
    pub fn constrained_count(&self) -> usize {
        match self.representation {
            Representation::Full => self.variable_count(),
            Representation::Reduced => self.contacts,
        }
    }

    /// Selector `A` with `A[i, i] = 1` for each sign-constrained entry.
    pub fn sign_constraints(&self) -> DMatrix<f64> {
        DMatrix::identity(self.constrained_count(), self.variable_count())
    }

    /// Generalized impulse `R·z` produced by a contact impulse vector.
    pub fn generalized_impulse(&self, z: &DVector<f64>) -> DVector<f64> {
        &self.matrix * z
    }
}
