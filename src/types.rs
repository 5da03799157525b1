use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Sentinel for an unknown pairwise score.
pub const MISSING: f64 = f64::NAN;

#[inline]
pub fn is_missing(value: f64) -> bool {
    value.is_nan()
}

pub fn default_dim() -> usize {
    3
}

pub fn default_round_decimals() -> Option<u32> {
    Some(4)
}

pub fn default_hypothesis_tolerance() -> f64 {
    1e-5
}

pub fn default_max_hypothesis_passes() -> usize {
    1000
}

pub fn default_max_outer_iterations() -> usize {
    20
}

pub fn default_outer_tolerance() -> f64 {
    1e-6
}

/// Settings of the per-row trust-region least-squares refiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeastSquaresOptions {
    /// Relative cost-reduction tolerance.
    pub ftol: f64,
    /// Relative step-norm tolerance.
    pub xtol: f64,
    /// Sup-norm tolerance on the gradient `Jᵗf`.
    pub gtol: f64,
    /// Residual evaluations allowed per unknown; the budget is this times the dimension.
    pub max_evaluations_per_parameter: usize,
    /// Relative accuracy `|‖p‖ - Δ| < rtol·Δ` demanded of the damped step.
    pub subproblem_rtol: f64,
    pub max_subproblem_iterations: usize,
}

impl Default for LeastSquaresOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            max_evaluations_per_parameter: 100,
            subproblem_rtol: 0.01,
            max_subproblem_iterations: 10,
        }
    }
}

impl LeastSquaresOptions {
    pub fn evaluation_budget(&self, dimension: usize) -> usize {
        self.max_evaluations_per_parameter
            .saturating_mul(dimension)
            .max(1)
    }
}

/// Engine configuration for one embedding run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingOptions {
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Decimals the private working copy is rounded to before use.
    #[serde(default = "default_round_decimals")]
    pub round_decimals: Option<u32>,
    #[serde(default = "default_hypothesis_tolerance")]
    pub hypothesis_tolerance: f64,
    #[serde(default = "default_max_hypothesis_passes")]
    pub max_hypothesis_passes: usize,
    #[serde(default = "default_max_outer_iterations")]
    pub max_outer_iterations: usize,
    #[serde(default = "default_outer_tolerance")]
    pub outer_tolerance: f64,
    /// Reject inputs where some item has fewer than `dim` observed neighbours.
    #[serde(default)]
    pub check_connectivity: bool,
    #[serde(default)]
    pub least_squares: LeastSquaresOptions,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            dim: default_dim(),
            round_decimals: default_round_decimals(),
            hypothesis_tolerance: default_hypothesis_tolerance(),
            max_hypothesis_passes: default_max_hypothesis_passes(),
            max_outer_iterations: default_max_outer_iterations(),
            outer_tolerance: default_outer_tolerance(),
            check_connectivity: false,
            least_squares: LeastSquaresOptions::default(),
        }
    }
}

impl EmbeddingOptions {
    pub fn with_dim(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }
}

/// One line of the outer refinement progress trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationTrace {
    /// 1-based pass index.
    pub iteration: usize,
    /// RMSD of the approximation against the observed scores.
    pub rmsd: f64,
    /// Largest single-coordinate change relative to the previous pass.
    pub max_change: f64,
    /// RMSD of the approximation against the previous pass's approximation.
    pub rmsd_vs_previous: f64,
}

/// Final output of an embedding run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResult {
    /// `N x dim` coordinates, one row per item.
    pub coordinates: Array2<f64>,
    /// `dim` eigenvalues; entries past the first are divided by `correction_factor`.
    pub eigenvalues: Array1<f64>,
    /// Fraction of cells that were observed in the input.
    pub correction_factor: f64,
    /// RMSD of the spectral starting point against the observed scores.
    pub initial_rmsd: f64,
    /// RMSD of the returned coordinates against the observed scores.
    pub final_rmsd: f64,
    pub trace: Vec<IterationTrace>,
    /// True when the outer loop stopped on the change tolerance rather than the pass cap.
    pub converged: bool,
    /// Cells whose completed value came from the hypothesis rather than the input.
    pub estimated_positions: Vec<(usize, usize)>,
}
