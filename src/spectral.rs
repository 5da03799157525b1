use crate::linalg::faer_ndarray::{FaerEigh, FaerLinalgError};
use faer::Side;
use ndarray::{Array1, Array2};

/// Initial coordinates read off the leading eigenpairs of a completed matrix.
#[derive(Debug, Clone)]
pub struct SpectralEmbedding {
    /// `N x dim`, one row per item.
    pub coordinates: Array2<f64>,
    /// Selected eigenvalues after correction, largest first.
    pub eigenvalues: Array1<f64>,
    /// The same eigenvalues before correction.
    pub raw_eigenvalues: Array1<f64>,
}

/// Embed a completed symmetric matrix into `dim` dimensions.
///
/// Eigenvalues past the leading one are divided by `correction_factor` (the
/// observed fraction of the input) to undo the shrinkage the rank-1 backfill
/// introduces along those axes. An axis whose corrected eigenvalue is negative
/// has no real square root and contributes all-zero coordinates.
pub fn spectral_embedding(
    completed: &Array2<f64>,
    dim: usize,
    correction_factor: f64,
) -> Result<SpectralEmbedding, FaerLinalgError> {
    let n = completed.nrows();
    let (values, vectors) = completed.eigh(Side::Lower)?;

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    let mut coordinates = Array2::<f64>::zeros((n, dim));
    let mut eigenvalues = Array1::<f64>::zeros(dim);
    let mut raw_eigenvalues = Array1::<f64>::zeros(dim);

    for (rank, &idx) in order.iter().take(dim).enumerate() {
        let raw = values[idx];
        let lambda = if rank >= 1 && correction_factor > 0.0 {
            raw / correction_factor
        } else {
            raw
        };
        raw_eigenvalues[rank] = raw;
        eigenvalues[rank] = lambda;
        if lambda < 0.0 {
            continue;
        }
        let scale = -lambda.sqrt();
        coordinates
            .column_mut(rank)
            .assign(&vectors.column(idx).mapv(|v| scale * v));
    }

    log::debug!(
        "Spectral embedding: eigenvalues {:?} (correction factor {:.4}).",
        eigenvalues.as_slice().unwrap_or(&[]),
        correction_factor
    );

    Ok(SpectralEmbedding {
        coordinates,
        eigenvalues,
        raw_eigenvalues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::utils::gram;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn all_ones_matrix_has_one_dominant_axis() {
        let m = Array2::<f64>::ones((4, 4));
        let emb = spectral_embedding(&m, 1, 1.0).expect("eigh");
        assert_abs_diff_eq!(emb.eigenvalues[0], 4.0, epsilon = 1e-10);
        let first = emb.coordinates[[0, 0]];
        assert_abs_diff_eq!(first.abs(), 1.0, epsilon = 1e-10);
        for i in 0..4 {
            assert_abs_diff_eq!(emb.coordinates[[i, 0]], first, epsilon = 1e-10);
        }
    }

    #[test]
    fn eigenvalues_come_out_descending_before_correction() {
        let m = array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 1.0]];
        let emb = spectral_embedding(&m, 3, 0.5).expect("eigh");
        for w in emb.raw_eigenvalues.as_slice().expect("contiguous").windows(2) {
            assert!(w[0] >= w[1]);
        }
        assert_eq!(emb.eigenvalues[0], emb.raw_eigenvalues[0]);
        assert_abs_diff_eq!(emb.eigenvalues[1], emb.raw_eigenvalues[1] / 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(emb.eigenvalues[2], emb.raw_eigenvalues[2] / 0.5, epsilon = 1e-12);
    }

    #[test]
    fn negative_axis_is_clamped_to_zero() {
        // Eigenvalues 3 and -1.
        let m = array![[1.0, 2.0], [2.0, 1.0]];
        let emb = spectral_embedding(&m, 2, 1.0).expect("eigh");
        assert_abs_diff_eq!(emb.eigenvalues[1], -1.0, epsilon = 1e-12);
        assert_eq!(emb.coordinates[[0, 1]], 0.0);
        assert_eq!(emb.coordinates[[1, 1]], 0.0);
        assert!(emb.coordinates[[0, 0]].abs() > 0.0);
    }

    #[test]
    fn full_rank_positive_matrix_is_reproduced() {
        let m = array![[2.0, 0.5, 0.1], [0.5, 1.5, 0.2], [0.1, 0.2, 1.0]];
        let emb = spectral_embedding(&m, 3, 1.0).expect("eigh");
        let rebuilt = gram(&emb.coordinates);
        for (a, b) in rebuilt.iter().zip(m.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }
}
