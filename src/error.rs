use thiserror::Error;

/// Unified error type for `frictionest` operations.
#[derive(Debug, Error)]
pub enum FrictionError {
    /// Raised when provided matrices or vectors have incompatible dimensions.
    #[error("invalid dimension in {context}: expected {expected} but found {found}")]
    InvalidDimension {
        /// Human-readable context describing the operand.
        context: &'static str,
        /// The required dimension, usually implied by the mass matrix or contact count.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when a contact does not carry an even number (≥ 2) of friction directions.
    #[error("contacts need an even number (at least 2) of friction directions, found {directions}")]
    OddDirectionCount { directions: usize },

    /// Raised when an input contains NaN or infinite entries.
    #[error("non-finite value in {context}")]
    NonFiniteInput { context: &'static str },

    /// Raised when the integration timestep is not strictly positive.
    #[error("timestep must be positive and finite, found {dt}")]
    InvalidTimestep { dt: f64 },

    /// Raised when no plain or regularized Lemke attempt produced a verified solution.
    #[error("LCP of size {size} unsolved after {attempts} attempts")]
    LcpUnsolved {
        /// Number of complementarity pairs.
        size: usize,
        /// Plain attempt plus every regularization tried.
        attempts: usize,
    },

    /// Raised when linear algebra operations encounter a singular system.
    #[error("matrix in {context} is singular")]
    SingularMatrix { context: &'static str },

    /// Raised when a matrix decomposition does not return the requested factors.
    #[error("decomposition of {context} did not produce the requested factors")]
    DecompositionFailed { context: &'static str },
}

impl FrictionError {
    /// Helper to format an [`InvalidDimension`](FrictionError::InvalidDimension) error.
    pub fn invalid_dimension(context: &'static str, expected: usize, found: usize) -> Self {
        Self::InvalidDimension {
            context,
            expected,
            found,
        }
    }

    /// Helper to raise when a matrix factorization fails due to singularity.
    pub fn singular(context: &'static str) -> Self {
        Self::SingularMatrix { context }
    }

    /// Whether the error stems from a solver failure rather than malformed input.
    pub fn is_solver_failure(&self) -> bool {
        matches!(
            self,
            Self::LcpUnsolved { .. }
                | Self::SingularMatrix { .. }
                | Self::DecompositionFailed { .. }
        )
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, FrictionError>;

/// Rejects matrices containing NaN or infinite entries.
pub(crate) fn ensure_finite<'a, I>(values: I, context: &'static str) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    if values.into_iter().all(|value| value.is_finite()) {
        Ok(())
    } else {
        Err(FrictionError::NonFiniteInput { context })
    }
}
