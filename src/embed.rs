//! End-to-end embedding of a partially observed similarity matrix.
//!
//! Completion and the spectral step only produce a starting point. The
//! coordinates are then refined one row at a time by nonlinear least squares
//! against the observed scores alone (block coordinate descent), for a bounded
//! number of passes.
//!
//! Precondition, not enforced unless `check_connectivity` is set: every item
//! should have at least `dim` other items with an observed score. Below that
//! the row magnitudes used by completion are poorly determined and the result
//! degrades silently.

use crate::completion::{complete_matrix, observed_fraction};
use crate::linalg::faer_ndarray::FaerLinalgError;
use crate::linalg::utils::{gram, max_abs_difference, rmsd_ignoring_missing, round_to_decimals};
use crate::solver::{LeastSquaresProblem, Termination, solve_least_squares};
use crate::spectral::spectral_embedding;
use crate::types::{
    EmbeddingOptions, EmbeddingResult, IterationTrace, LeastSquaresOptions, is_missing,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Similarity matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("At least two items are required, got {n}")]
    TooFewItems { n: usize },

    #[error("Target dimension must lie in 1..={n}, got {dim}")]
    InvalidDimension { dim: usize, n: usize },

    #[error("Score at ({row}, {col}) is {value}; only finite values or NaN (missing) are allowed")]
    NonFiniteScore { row: usize, col: usize, value: f64 },

    #[error(
        "Item {item} has {known} observed neighbours but at least {required} are required"
    )]
    InsufficientConnectivity {
        item: usize,
        known: usize,
        required: usize,
    },

    #[error("Eigendecomposition of the completed matrix failed: {0}")]
    EigendecompositionFailed(FaerLinalgError),
}

/// Reject malformed input before any work is done.
pub fn validate_input(scores: &Array2<f64>, dim: usize) -> Result<(), EmbeddingError> {
    let (rows, cols) = scores.dim();
    if rows != cols {
        return Err(EmbeddingError::NotSquare { rows, cols });
    }
    if rows < 2 {
        return Err(EmbeddingError::TooFewItems { n: rows });
    }
    if dim == 0 || dim > rows {
        return Err(EmbeddingError::InvalidDimension { dim, n: rows });
    }
    if let Some(((row, col), &value)) = scores
        .indexed_iter()
        .find(|(_, v)| v.is_infinite())
    {
        return Err(EmbeddingError::NonFiniteScore { row, col, value });
    }
    Ok(())
}

/// Observed off-diagonal cells per row.
pub fn known_neighbor_counts(scores: &Array2<f64>) -> Vec<usize> {
    scores
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .filter(|&(j, &v)| j != i && !is_missing(v))
                .count()
        })
        .collect()
}

pub fn check_connectivity(scores: &Array2<f64>, dim: usize) -> Result<(), EmbeddingError> {
    match known_neighbor_counts(scores)
        .into_iter()
        .enumerate()
        .find(|&(_, known)| known < dim)
    {
        Some((item, known)) => Err(EmbeddingError::InsufficientConnectivity {
            item,
            known,
            required: dim,
        }),
        None => Ok(()),
    }
}

/// Residuals `x · rep_j - score_ij` of one row over its observed scores,
/// with every other row of the representative matrix held fixed.
pub struct RowResidual<'a> {
    representatives: ArrayView2<'a, f64>,
    observed: Vec<(usize, f64)>,
}

impl<'a> RowResidual<'a> {
    pub fn new(representatives: ArrayView2<'a, f64>, scores: &Array2<f64>, row: usize) -> Self {
        let observed = scores
            .row(row)
            .iter()
            .enumerate()
            .filter(|(_, v)| !is_missing(**v))
            .map(|(j, &v)| (j, v))
            .collect();
        Self {
            representatives,
            observed,
        }
    }
}

impl LeastSquaresProblem for RowResidual<'_> {
    fn residual_dim(&self) -> usize {
        self.observed.len()
    }

    fn residuals(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        Array1::from_iter(
            self.observed
                .iter()
                .map(|&(j, score)| x.dot(&self.representatives.row(j)) - score),
        )
    }
}

/// Best coordinates for `row` given the rest of `representatives`, fitted to
/// the observed entries of `scores` only.
pub fn refine_row(
    representatives: &Array2<f64>,
    scores: &Array2<f64>,
    row: usize,
    options: &LeastSquaresOptions,
) -> Array1<f64> {
    let problem = RowResidual::new(representatives.view(), scores, row);
    let x0 = representatives.row(row).to_owned();
    let result = solve_least_squares(&problem, x0, options);
    if result.termination == Termination::Budget {
        log::debug!(
            "Row {} used its full budget of {} evaluations (cost {:.3e}).",
            row,
            result.evaluations,
            result.cost
        );
    }
    result.x
}

/// Outcome of the outer block-coordinate loop.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub coordinates: Array2<f64>,
    pub initial_rmsd: f64,
    pub final_rmsd: f64,
    pub trace: Vec<IterationTrace>,
    pub converged: bool,
}

/// Sweep [`refine_row`] over every row until the largest coordinate change in
/// a pass is at most `outer_tolerance`, or `max_outer_iterations` passes ran.
///
/// Rows are updated sequentially, so later rows already see earlier updates.
/// When a pass changes nothing beyond the tolerance its result is dropped and
/// the coordinates from before that pass are returned.
pub fn refine_embedding(
    mut representatives: Array2<f64>,
    scores: &Array2<f64>,
    options: &EmbeddingOptions,
) -> Refinement {
    let n = representatives.nrows();
    let mut approximation = gram(&representatives);
    let initial_rmsd = rmsd_ignoring_missing(scores, &approximation);
    let mut final_rmsd = initial_rmsd;
    let mut trace = Vec::new();
    let mut converged = false;

    log::debug!("Refinement start: rmsd {:.6e}", initial_rmsd);

    for iteration in 1..=options.max_outer_iterations {
        let previous = representatives.clone();
        let previous_approximation = approximation;

        for row in 0..n {
            let updated = refine_row(&representatives, scores, row, &options.least_squares);
            representatives.row_mut(row).assign(&updated);
        }

        approximation = gram(&representatives);
        let rmsd = rmsd_ignoring_missing(scores, &approximation);
        let max_change = max_abs_difference(&representatives, &previous);
        let rmsd_vs_previous = rmsd_ignoring_missing(&previous_approximation, &approximation);
        trace.push(IterationTrace {
            iteration,
            rmsd,
            max_change,
            rmsd_vs_previous,
        });
        log::debug!(
            "Refinement pass {:>2}: rmsd {:.6e}, max change {:.3e}, rmsd vs previous {:.3e}",
            iteration,
            rmsd,
            max_change,
            rmsd_vs_previous
        );

        if max_change <= options.outer_tolerance {
            representatives = previous;
            converged = true;
            break;
        }
        final_rmsd = rmsd;
    }

    if !converged {
        log::warn!(
            "Refinement stopped after {} passes without reaching max change <= {:.1e}.",
            options.max_outer_iterations,
            options.outer_tolerance
        );
    }

    Refinement {
        coordinates: representatives,
        initial_rmsd,
        final_rmsd,
        trace,
        converged,
    }
}

/// Embed a square similarity matrix (NaN = unknown) into `options.dim` dimensions.
///
/// The caller's matrix is only read; rounding and completion work on a
/// private copy.
pub fn embed_similarity_matrix(
    scores: &Array2<f64>,
    options: &EmbeddingOptions,
) -> Result<EmbeddingResult, EmbeddingError> {
    validate_input(scores, options.dim)?;
    if options.check_connectivity {
        check_connectivity(scores, options.dim)?;
    }

    let mut observed = scores.to_owned();
    if let Some(decimals) = options.round_decimals {
        round_to_decimals(&mut observed, decimals);
    }
    let n = observed.nrows();
    let correction_factor = observed_fraction(&observed);
    log::info!(
        "Embedding {} items into {} dimensions ({:.1}% of scores observed).",
        n,
        options.dim,
        100.0 * correction_factor
    );

    let completed = complete_matrix(&observed, options);
    let spectral = spectral_embedding(&completed.matrix, options.dim, correction_factor)
        .map_err(EmbeddingError::EigendecompositionFailed)?;
    let refinement = refine_embedding(spectral.coordinates, &observed, options);

    log::info!(
        "Embedding finished after {} passes: rmsd {:.6e} -> {:.6e}{}.",
        refinement.trace.len(),
        refinement.initial_rmsd,
        refinement.final_rmsd,
        if refinement.converged { "" } else { " (pass cap reached)" }
    );

    Ok(EmbeddingResult {
        coordinates: refinement.coordinates,
        eigenvalues: spectral.eigenvalues,
        correction_factor,
        initial_rmsd: refinement.initial_rmsd,
        final_rmsd: refinement.final_rmsd,
        trace: refinement.trace,
        converged: refinement.converged,
        estimated_positions: completed.estimated_positions,
    })
}
