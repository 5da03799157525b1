//! Trust-region pieces of the least-squares solver: the exact subproblem
//! solved through the Jacobian's SVD, radius updates and termination tests.

use super::Termination;
use ndarray::{Array1, Array2, Zip};

/// Step returned by [`solve_subproblem`].
#[derive(Debug, Clone)]
pub struct SubproblemStep {
    pub step: Array1<f64>,
    /// Levenberg-Marquardt parameter the step was computed with.
    pub alpha: f64,
    /// Newton iterations spent on the secular equation.
    pub iterations: usize,
}

/// `φ(α) = ‖p(α)‖ - Δ` and its derivative, with `p(α) = -V (s·Uᵗf) / (s² + α)`.
fn phi_and_derivative(alpha: f64, suf: &Array1<f64>, s: &Array1<f64>, delta: f64) -> (f64, f64) {
    let mut norm_sq = 0.0;
    let mut weighted = 0.0;
    Zip::from(suf).and(s).for_each(|&sufi, &si| {
        let denom = si * si + alpha;
        norm_sq += (sufi / denom).powi(2);
        weighted += sufi * sufi / denom.powi(3);
    });
    let p_norm = norm_sq.sqrt();
    (p_norm - delta, -weighted / p_norm)
}

fn safeguarded_alpha(alpha_lower: f64, alpha_upper: f64) -> f64 {
    (0.001 * alpha_upper).max((alpha_lower * alpha_upper).sqrt())
}

/// Solve `min ‖J p + f‖` subject to `‖p‖ <= Δ` given `J = U diag(s) Vᵗ`.
///
/// `uf = Uᵗf`, `s` holds the singular values in descending order and `v` the
/// right singular vectors column-wise; `m` is the residual count. When `J` has
/// full column rank and the Gauss-Newton step fits inside the region it is
/// returned with `alpha = 0`. Otherwise Newton iterations on the secular
/// equation find `alpha` with `|‖p‖ - Δ| < rtol·Δ` (or run out of
/// `max_iter`), and the step is rescaled to lie on the boundary.
pub fn solve_subproblem(
    uf: &Array1<f64>,
    s: &Array1<f64>,
    v: &Array2<f64>,
    m: usize,
    delta: f64,
    initial_alpha: f64,
    rtol: f64,
    max_iter: usize,
) -> SubproblemStep {
    let n = v.nrows();
    let suf = s * uf;

    let full_rank = m >= n
        && s.len() == n
        && n > 0
        && s[n - 1] > f64::EPSILON * m as f64 * s[0];

    if full_rank {
        let p = -v.dot(&(uf / s));
        if norm(&p) <= delta {
            return SubproblemStep {
                step: p,
                alpha: 0.0,
                iterations: 0,
            };
        }
    }

    let mut alpha_upper = norm(&suf) / delta;
    let mut alpha_lower = if full_rank {
        let (phi, phi_prime) = phi_and_derivative(0.0, &suf, s, delta);
        -phi / phi_prime
    } else {
        0.0
    };

    let mut alpha = if !full_rank && initial_alpha == 0.0 {
        safeguarded_alpha(alpha_lower, alpha_upper)
    } else {
        initial_alpha
    };

    let mut iterations = 0usize;
    for _ in 0..max_iter {
        iterations += 1;
        if alpha < alpha_lower || alpha > alpha_upper {
            alpha = safeguarded_alpha(alpha_lower, alpha_upper);
        }
        let (phi, phi_prime) = phi_and_derivative(alpha, &suf, s, delta);
        if phi < 0.0 {
            alpha_upper = alpha;
        }
        let ratio = phi / phi_prime;
        alpha_lower = alpha_lower.max(alpha - ratio);
        alpha -= (phi + delta) * ratio / delta;
        if phi.abs() < rtol * delta {
            break;
        }
    }

    let denom = s.mapv(|si| si * si + alpha);
    let mut p = -v.dot(&(&suf / &denom));
    let p_norm = norm(&p);
    if p_norm > 0.0 && p_norm.is_finite() {
        p *= delta / p_norm;
    } else {
        p.fill(0.0);
    }
    SubproblemStep {
        step: p,
        alpha,
        iterations,
    }
}

/// Value of the quadratic model `½‖J s‖² + gᵗs`.
pub fn evaluate_quadratic(jac: &Array2<f64>, g: &Array1<f64>, step: &Array1<f64>) -> f64 {
    let js = jac.dot(step);
    0.5 * js.dot(&js) + step.dot(g)
}

/// New radius and agreement ratio after a trial step.
///
/// A ratio below 0.25 shrinks the radius to a quarter of the step; a ratio
/// above 0.75 doubles it, but only when the step reached the boundary.
pub fn update_radius(
    delta: f64,
    actual_reduction: f64,
    predicted_reduction: f64,
    step_norm: f64,
    bound_hit: bool,
) -> (f64, f64) {
    let ratio = if predicted_reduction > 0.0 {
        actual_reduction / predicted_reduction
    } else if predicted_reduction == actual_reduction {
        1.0
    } else {
        0.0
    };

    let delta = if ratio < 0.25 {
        0.25 * step_norm
    } else if ratio > 0.75 && bound_hit {
        delta * 2.0
    } else {
        delta
    };
    (delta, ratio)
}

pub fn check_termination(
    actual_reduction: f64,
    cost: f64,
    step_norm: f64,
    x_norm: f64,
    ratio: f64,
    ftol: f64,
    xtol: f64,
) -> Option<Termination> {
    let ftol_satisfied = actual_reduction < ftol * cost && ratio > 0.25;
    let xtol_satisfied = step_norm < xtol * (xtol + x_norm);
    if ftol_satisfied {
        Some(Termination::Function)
    } else if xtol_satisfied {
        Some(Termination::Parameter)
    } else {
        None
    }
}

#[inline]
pub(crate) fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}
