use super::LeastSquaresProblem;
use ndarray::{Array1, Array2};

/// Forward-difference step for one coordinate: `sqrt(eps) * sign(x) * max(|x|, 1)`,
/// with `sign(0) = +1`. The step is re-derived from `(x + h) - x` so it is
/// exactly representable.
#[inline]
pub fn forward_difference_step(x: f64) -> f64 {
    let sign = if x >= 0.0 { 1.0 } else { -1.0 };
    let h = f64::EPSILON.sqrt() * sign * x.abs().max(1.0);
    (x + h) - x
}

/// Jacobian of `problem` at `x` by forward differences, reusing `f0 = r(x)`.
pub fn forward_difference_jacobian<P>(problem: &P, x: &Array1<f64>, f0: &Array1<f64>) -> Array2<f64>
where
    P: LeastSquaresProblem + ?Sized,
{
    let m = f0.len();
    let n = x.len();
    let mut jac = Array2::<f64>::zeros((m, n));
    let mut shifted = x.clone();
    for k in 0..n {
        let h = forward_difference_step(x[k]);
        shifted[k] = x[k] + h;
        let fk = problem.residuals(shifted.view());
        jac.column_mut(k).assign(&((&fk - f0) / h));
        shifted[k] = x[k];
    }
    jac
}
