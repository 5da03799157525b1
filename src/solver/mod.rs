//! Unconstrained nonlinear least squares by the trust-region-reflective
//! method with an exact, SVD-based subproblem solve.
//!
//! Minimises `½‖r(x)‖²` for any [`LeastSquaresProblem`]. The Jacobian is
//! approximated by forward differences and recomputed only after an accepted
//! step. There is no failure mode: the solver always hands back the best point
//! it reached within the evaluation budget.

pub mod jacobian;
pub mod trust_region;

use crate::linalg::faer_ndarray::{FaerSvd, ThinSvd};
use crate::types::LeastSquaresOptions;
use jacobian::forward_difference_jacobian;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use trust_region::{check_termination, evaluate_quadratic, norm, solve_subproblem, update_radius};

/// Residual vector `r(x)` of a least-squares problem.
pub trait LeastSquaresProblem {
    fn residual_dim(&self) -> usize;

    /// Must return `residual_dim()` values; non-finite entries mark `x` as unusable.
    fn residuals(&self, x: ArrayView1<'_, f64>) -> Array1<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// `‖Jᵗr‖∞` fell below `gtol`.
    Gradient,
    /// Relative cost reduction fell below `ftol` on a trusted step.
    Function,
    /// Step norm fell below `xtol` relative to `‖x‖`.
    Parameter,
    /// The residual evaluation budget ran out.
    Budget,
    /// Nothing to fit, an unusable start point, or a failed SVD.
    Degenerate,
}

#[derive(Debug, Clone)]
pub struct LeastSquaresResult {
    pub x: Array1<f64>,
    pub residuals: Array1<f64>,
    /// `½‖r(x)‖²`.
    pub cost: f64,
    pub evaluations: usize,
    pub jacobian_evaluations: usize,
    pub iterations: usize,
    pub termination: Termination,
}

fn all_finite(v: &Array1<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

pub fn solve_least_squares<P>(
    problem: &P,
    x0: Array1<f64>,
    options: &LeastSquaresOptions,
) -> LeastSquaresResult
where
    P: LeastSquaresProblem + ?Sized,
{
    let n = x0.len();
    let m = problem.residual_dim();
    let mut x = x0;
    let mut f = problem.residuals(x.view());
    let mut evaluations = 1usize;

    if m == 0 || n == 0 || !all_finite(&f) {
        let cost = if all_finite(&f) { 0.5 * f.dot(&f) } else { f64::NAN };
        return LeastSquaresResult {
            x,
            residuals: f,
            cost,
            evaluations,
            jacobian_evaluations: 0,
            iterations: 0,
            termination: Termination::Degenerate,
        };
    }

    let mut jac = forward_difference_jacobian(problem, &x, &f);
    let mut jacobian_evaluations = 1usize;
    let mut cost = 0.5 * f.dot(&f);
    let mut g = jac.t().dot(&f);

    let mut delta = norm(&x);
    if delta == 0.0 {
        delta = 1.0;
    }
    let max_evaluations = options.evaluation_budget(n);
    let mut alpha = 0.0;
    let mut termination = None;
    let mut iterations = 0usize;

    loop {
        let g_norm = g.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if g_norm < options.gtol {
            termination = Some(Termination::Gradient);
        }
        if termination.is_some() || evaluations >= max_evaluations {
            break;
        }

        let ThinSvd { u, s, v } = match jac.thin_svd() {
            Ok(svd) => svd,
            Err(e) => {
                log::warn!("Jacobian SVD failed ({e}); keeping the current point.");
                termination = Some(Termination::Degenerate);
                break;
            }
        };
        let uf = u.t().dot(&f);

        let mut actual_reduction = -1.0;
        let mut candidate = None;
        while actual_reduction <= 0.0 && evaluations < max_evaluations {
            let sub = solve_subproblem(
                &uf,
                &s,
                &v,
                m,
                delta,
                alpha,
                options.subproblem_rtol,
                options.max_subproblem_iterations,
            );
            alpha = sub.alpha;
            let step = sub.step;
            let predicted_reduction = -evaluate_quadratic(&jac, &g, &step);

            let x_new = &x + &step;
            let f_new = problem.residuals(x_new.view());
            evaluations += 1;

            let step_norm = norm(&step);
            if !all_finite(&f_new) {
                delta = 0.25 * step_norm;
                continue;
            }

            let cost_new = 0.5 * f_new.dot(&f_new);
            actual_reduction = cost - cost_new;
            let (delta_new, ratio) = update_radius(
                delta,
                actual_reduction,
                predicted_reduction,
                step_norm,
                step_norm > 0.95 * delta,
            );
            termination = check_termination(
                actual_reduction,
                cost,
                step_norm,
                norm(&x),
                ratio,
                options.ftol,
                options.xtol,
            );
            candidate = Some((x_new, f_new, cost_new));
            if termination.is_some() {
                break;
            }
            alpha *= delta / delta_new;
            delta = delta_new;
        }

        if actual_reduction > 0.0
            && let Some((x_new, f_new, cost_new)) = candidate
        {
            x = x_new;
            f = f_new;
            cost = cost_new;
            jac = forward_difference_jacobian(problem, &x, &f);
            jacobian_evaluations += 1;
            g = jac.t().dot(&f);
        }
        iterations += 1;
    }

    LeastSquaresResult {
        x,
        residuals: f,
        cost,
        evaluations,
        jacobian_evaluations,
        iterations,
        termination: termination.unwrap_or(Termination::Budget),
    }
}
