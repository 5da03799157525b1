use crate::types::is_missing;
use ndarray::{Array2, ArrayBase, Data, Ix2};

#[derive(Default, Clone, Copy)]
pub(crate) struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub(crate) fn add(&mut self, value: f64) {
        let y = value - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub(crate) fn sum(self) -> f64 {
        self.sum
    }
}

/// Round every finite entry to `decimals` places, leaving missing cells as they are.
///
/// Entries too large to scale without overflowing are left unrounded; at that
/// magnitude they carry no fractional digits anyway.
pub fn round_to_decimals(matrix: &mut Array2<f64>, decimals: u32) {
    let scale = 10f64.powi(decimals as i32);
    matrix.mapv_inplace(|v| {
        let scaled = v * scale;
        if scaled.is_finite() {
            scaled.round() / scale
        } else {
            v
        }
    });
}

/// Root-mean-square deviation between `observed` and `approx` over the cells
/// that are present in `observed`. Returns 0 when nothing is observed.
pub fn rmsd_ignoring_missing<S1, S2>(
    observed: &ArrayBase<S1, Ix2>,
    approx: &ArrayBase<S2, Ix2>,
) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    debug_assert_eq!(observed.dim(), approx.dim());
    let mut acc = KahanSum::default();
    let mut count = 0usize;
    for (&o, &a) in observed.iter().zip(approx.iter()) {
        if is_missing(o) || is_missing(a) {
            continue;
        }
        let d = o - a;
        acc.add(d * d);
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (acc.sum() / count as f64).sqrt()
}

/// Largest absolute elementwise difference of two equally-shaped matrices.
pub fn max_abs_difference<S1, S2>(a: &ArrayBase<S1, Ix2>, b: &ArrayBase<S2, Ix2>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    debug_assert_eq!(a.dim(), b.dim());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// `A Aᵗ`: all pairwise row dot products.
#[inline]
pub fn gram<S: Data<Elem = f64>>(a: &ArrayBase<S, Ix2>) -> Array2<f64> {
    a.dot(&a.t())
}
