use dyn_stack::{MemBuffer, MemStack};
use faer::diag::{Diag, DiagRef};
use faer::linalg::evd::{self, ComputeEigenvectors, EvdError};
use faer::linalg::svd::{self, ComputeSvdVectors};
use faer::{Mat, MatRef, Par, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2, s};
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("SVD failed to converge")]
    SvdNoConvergence,
    #[error("Self-adjoint eigendecomposition failed: {0:?}")]
    SelfAdjointEigen(EvdError),
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((mat.nrows(), mat.ncols()));
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            out[[i, j]] = mat[(i, j)];
        }
    }
    out
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    let mut out = Array1::<f64>::zeros(mat.nrows());
    for i in 0..mat.nrows() {
        out[i] = mat[(i, 0)];
    }
    out
}

/// Borrowed faer view over an ndarray matrix.
///
/// Layouts with non-positive strides are copied into a compact owned buffer
/// first; everything else is viewed in place.
pub struct FaerArrayView<'a> {
    ptr: *const f64,
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
    owned: Option<Array2<f64>>,
    _marker: PhantomData<&'a f64>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let strides = array.strides();
        if strides[0] <= 0 || strides[1] <= 0 {
            let owned = array.as_standard_layout().to_owned();
            let owned_strides = owned.strides();
            return Self {
                ptr: owned.as_ptr(),
                rows,
                cols,
                row_stride: owned_strides[0],
                col_stride: owned_strides[1],
                owned: Some(owned),
                _marker: PhantomData,
            };
        }

        Self {
            ptr: array.as_ptr(),
            rows,
            cols,
            row_stride: strides[0],
            col_stride: strides[1],
            owned: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        let (ptr, rows, cols, row_stride, col_stride) = if let Some(owned) = &self.owned {
            let strides = owned.strides();
            (
                owned.as_ptr(),
                owned.nrows(),
                owned.ncols(),
                strides[0],
                strides[1],
            )
        } else {
            (
                self.ptr,
                self.rows,
                self.cols,
                self.row_stride,
                self.col_stride,
            )
        };
        // SAFETY: pointer/shape/strides either come directly from a live ndarray
        // view with positive strides, or from the owned compact copy stored in
        // this wrapper, which outlives the returned view.
        unsafe { MatRef::from_raw_parts(ptr, rows, cols, row_stride, col_stride) }
    }
}

/// Economy-size singular value decomposition `A = U diag(s) Vᵗ`.
///
/// For an `m x n` input with `k = min(m, n)` this yields `U: m x k`,
/// `s: k` (descending) and `V: n x k`. Note `V` is returned untransposed.
pub struct ThinSvd {
    pub u: Array2<f64>,
    pub s: Array1<f64>,
    pub v: Array2<f64>,
}

pub trait FaerSvd {
    fn thin_svd(&self) -> Result<ThinSvd, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerSvd for ArrayBase<S, Ix2> {
    fn thin_svd(&self) -> Result<ThinSvd, FaerLinalgError> {
        let (rows, cols) = self.dim();
        let k = rows.min(cols);
        if k == 0 {
            return Ok(ThinSvd {
                u: Array2::zeros((rows, 0)),
                s: Array1::zeros(0),
                v: Array2::zeros((cols, 0)),
            });
        }

        let faer_view = FaerArrayView::new(self);
        let faer_mat = faer_view.as_ref();

        let mut singular = Diag::<f64>::zeros(k);
        let mut u_storage = Mat::<f64>::zeros(rows, rows);
        let mut v_storage = Mat::<f64>::zeros(cols, cols);

        // Jacobians here are tiny; keep the decomposition on the calling thread.
        let par = Par::Seq;
        let mut mem = MemBuffer::new(svd::svd_scratch::<f64>(
            rows,
            cols,
            ComputeSvdVectors::Full,
            ComputeSvdVectors::Full,
            par,
            Default::default(),
        ));
        let stack = MemStack::new(&mut mem);

        svd::svd(
            faer_mat,
            singular.as_mut(),
            Some(u_storage.as_mut()),
            Some(v_storage.as_mut()),
            par,
            stack,
            Default::default(),
        )
        .map_err(|_| FaerLinalgError::SvdNoConvergence)?;

        let s = diag_to_array(singular.as_ref());
        let u = mat_to_array(u_storage.as_ref()).slice(s![.., ..k]).to_owned();
        let v = mat_to_array(v_storage.as_ref()).slice(s![.., ..k]).to_owned();
        if s.iter().any(|v| !v.is_finite()) {
            return Err(FaerLinalgError::SvdNoConvergence);
        }
        Ok(ThinSvd { u, s, v })
    }
}

pub trait FaerEigh {
    /// Eigenvalues in ascending order with eigenvectors stored column-wise.
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerEigh for ArrayBase<S, Ix2> {
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError> {
        let n = self.nrows();
        let faer_view = FaerArrayView::new(self);
        let mut mat = faer_view.as_ref();
        if side == Side::Upper {
            mat = mat.transpose();
        }

        let mut values = Diag::<f64>::zeros(n);
        let mut vectors = Mat::<f64>::zeros(n, n);

        // Runs on the calling thread regardless of faer's global setting.
        let par = Par::Seq;
        let mut mem = MemBuffer::new(evd::self_adjoint_evd_scratch::<f64>(
            n,
            ComputeEigenvectors::Yes,
            par,
            Default::default(),
        ));
        let stack = MemStack::new(&mut mem);

        evd::self_adjoint_evd(
            mat,
            values.as_mut(),
            Some(vectors.as_mut()),
            par,
            stack,
            Default::default(),
        )
        .map_err(FaerLinalgError::SelfAdjointEigen)?;

        Ok((diag_to_array(values.as_ref()), mat_to_array(vectors.as_ref())))
    }
}
