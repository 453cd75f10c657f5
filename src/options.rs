//! Configuration for the estimation pipeline, loadable from any serde format.

use serde::{Deserialize, Serialize};

use crate::lcp::LemkeOptions;

/// How the tangential part of the contact basis `R` is assembled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Every polyhedral direction of `D`, with nonnegative magnitudes.
    Full,
    /// One direction per antipodal pair (`ST`), with signed magnitudes.
    #[default]
    Reduced,
}

/// Aggregated configuration used by [`FrictionEstimator`](crate::FrictionEstimator).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorOptions {
    /// Tangent basis used for both stages and the friction extraction.
    pub representation: Representation,
    /// Configuration of the LCP solver behind both quadratic programs.
    pub lcp: LemkeOptions,
    /// Explicit zero threshold for singular values; `None` uses `ε · rows · σ_max`.
    pub rank_tolerance: Option<f64>,
    /// Whether a rank-deficient Stage I result is refined in the nullspace.
    pub refine: bool,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            representation: Representation::Reduced,
            lcp: LemkeOptions::default(),
            rank_tolerance: None,
            refine: true,
        }
    }
}

impl EstimatorOptions {
    /// Override the tangent representation while preserving other defaults.
    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Override the LCP solver settings.
    pub fn with_lcp(mut self, lcp: LemkeOptions) -> Self {
        self.lcp = lcp;
        self
    }

    /// Use a fixed singular value threshold instead of the scaled default.
    pub fn with_rank_tolerance(mut self, tolerance: f64) -> Self {
        self.rank_tolerance = Some(tolerance);
        self
    }

    /// Enable or disable the nullspace refinement stage.
    pub fn with_refinement(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }
}
