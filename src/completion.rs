//! Backfilling of unknown similarity scores.
//!
//! Every item gets a scalar hypothesis value `h_i = sign_i * magnitude_i` so
//! that `h_i * h_j` approximates the score between `i` and `j`. Signs come
//! from a hill-climb over sign contradictions, magnitudes from the mean
//! observed score of each row. Missing cells (and the whole diagonal) are then
//! filled with hypothesis products and the hypothesis is refined against the
//! completed matrix until it stops moving.

use crate::types::{EmbeddingOptions, is_missing};
use ndarray::{Array1, Array2};

/// A completed copy of the similarity matrix together with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CompletedMatrix {
    pub matrix: Array2<f64>,
    /// Cells whose value came from the hypothesis. Always contains the diagonal.
    pub estimated_positions: Vec<(usize, usize)>,
    pub hypothesis: Array1<f64>,
    /// Number of sign flips made by the hill-climb.
    pub flips: usize,
    pub hypothesis_passes: usize,
    pub hypothesis_converged: bool,
}

/// Fraction of cells in `scores` that carry an observed value.
pub fn observed_fraction(scores: &Array2<f64>) -> f64 {
    let total = scores.len();
    if total == 0 {
        return 0.0;
    }
    let missing = scores.iter().filter(|&&v| is_missing(v)).count();
    1.0 - missing as f64 / total as f64
}

#[inline]
fn cell_sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Sign votes only come from observed, non-zero off-diagonal cells.
#[inline]
fn votes(value: f64) -> bool {
    !is_missing(value) && cell_sign(value) != 0
}

pub fn initial_signs(n: usize) -> Vec<i8> {
    vec![1; n]
}

/// Contradicting minus supporting observed cells per item under `signs`.
pub fn distrust_scores(scores: &Array2<f64>, signs: &[i8]) -> Vec<i64> {
    let n = scores.nrows();
    let mut distrust = vec![0i64; n];
    for i in 0..n {
        for j in 0..n {
            let value = scores[[i, j]];
            if i == j || !votes(value) {
                continue;
            }
            if cell_sign(value) == signs[i] * signs[j] {
                distrust[i] -= 1;
            } else {
                distrust[i] += 1;
            }
        }
    }
    distrust
}

/// Steepest-improvement hill-climb over item signs.
///
/// Repeatedly flips the most distrusted item while its distrust is positive.
/// Each flip strictly lowers the total contradiction count; the loop is still
/// capped at `n²` flips. Returns the number of flips made.
pub fn hill_climb_signs(scores: &Array2<f64>, signs: &mut [i8]) -> usize {
    let n = scores.nrows();
    let mut distrust = distrust_scores(scores, signs);
    let cap = n.saturating_mul(n).max(1);
    let mut flips = 0usize;

    loop {
        let Some((worst, &max_distrust)) = distrust
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        else {
            break;
        };
        if max_distrust <= 0 {
            break;
        }
        if flips >= cap {
            log::warn!(
                "Sign hill-climb hit its cap of {} flips with distrust {} remaining.",
                cap,
                max_distrust
            );
            break;
        }

        signs[worst] = -signs[worst];
        distrust[worst] = -distrust[worst];
        for j in 0..n {
            let value = scores[[j, worst]];
            if j == worst || !votes(value) {
                continue;
            }
            if cell_sign(value) == signs[j] * signs[worst] {
                distrust[j] -= 2;
            } else {
                distrust[j] += 2;
            }
        }
        flips += 1;
    }
    flips
}

/// `sqrt(mean |observed row cells|)` per item; 0 for rows with nothing observed.
pub fn hypothesis_magnitudes(scores: &Array2<f64>) -> Array1<f64> {
    Array1::from_iter(scores.rows().into_iter().map(|row| {
        let (sum, count) = row
            .iter()
            .filter(|v| !is_missing(**v))
            .fold((0.0, 0usize), |(s, c), v| (s + v.abs(), c + 1));
        if count == 0 {
            0.0
        } else {
            (sum / count as f64).sqrt()
        }
    }))
}

/// Write `h_i * h_j` into every listed position.
pub fn fill_estimated(
    matrix: &mut Array2<f64>,
    hypothesis: &Array1<f64>,
    positions: &[(usize, usize)],
) {
    for &(i, j) in positions {
        matrix[[i, j]] = hypothesis[i] * hypothesis[j];
    }
}

/// Positions to backfill: every off-diagonal cell that is missing on either
/// side of the pair, plus the full diagonal.
pub fn estimated_positions(scores: &Array2<f64>) -> Vec<(usize, usize)> {
    let n = scores.nrows();
    let mut positions = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i == j || is_missing(scores[[i, j]]) || is_missing(scores[[j, i]]) {
                positions.push((i, j));
            }
        }
    }
    positions
}

/// One Gauss-Seidel sweep of `h_i <- Σ_j h_j M_ij / Σ_j h_j²`.
///
/// The estimated cells are refreshed after every item update, so later items
/// in the sweep already see the new value.
pub fn refine_hypothesis_pass(
    matrix: &mut Array2<f64>,
    hypothesis: &mut Array1<f64>,
    positions: &[(usize, usize)],
) {
    let n = hypothesis.len();
    for i in 0..n {
        let numerator = hypothesis.dot(&matrix.row(i));
        let denominator = hypothesis.dot(hypothesis);
        hypothesis[i] = if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        };
        fill_estimated(matrix, hypothesis, positions);
    }
}

fn hypothesis_settled(previous: &Array1<f64>, current: &Array1<f64>, tol: f64) -> bool {
    previous
        .iter()
        .zip(current.iter())
        .all(|(a, b)| (a - b).abs() <= tol + tol * b.abs())
}

/// Backfill `scores` into a new, fully populated matrix.
///
/// Observed off-diagonal pairs are copied untouched. A pair with only one side
/// missing is filled on both sides, so the result is always symmetric.
/// Diagonal cells are always replaced by `h_i²`, even when the caller
/// supplied them.
pub fn complete_matrix(scores: &Array2<f64>, options: &EmbeddingOptions) -> CompletedMatrix {
    let n = scores.nrows();

    let mut signs = initial_signs(n);
    let flips = hill_climb_signs(scores, &mut signs);
    let magnitudes = hypothesis_magnitudes(scores);
    let mut hypothesis = Array1::from_iter(
        signs
            .iter()
            .zip(magnitudes.iter())
            .map(|(&s, &m)| f64::from(s) * m),
    );

    let positions = estimated_positions(scores);
    let mut matrix = scores.clone();
    fill_estimated(&mut matrix, &hypothesis, &positions);

    let mut passes = 0usize;
    let mut converged = false;
    while passes < options.max_hypothesis_passes {
        let previous = hypothesis.clone();
        refine_hypothesis_pass(&mut matrix, &mut hypothesis, &positions);
        passes += 1;
        if hypothesis_settled(&previous, &hypothesis, options.hypothesis_tolerance) {
            converged = true;
            break;
        }
    }
    if !converged {
        log::warn!(
            "Hypothesis refinement stopped after {} passes without settling.",
            passes
        );
    }
    log::debug!(
        "Completed {}x{} matrix: {} estimated cells, {} sign flips, {} hypothesis passes.",
        n,
        n,
        positions.len(),
        flips,
        passes
    );

    CompletedMatrix {
        matrix,
        estimated_positions: positions,
        hypothesis,
        flips,
        hypothesis_passes: passes,
        hypothesis_converged: converged,
    }
}
