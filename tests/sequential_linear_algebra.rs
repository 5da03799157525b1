//! Runs in its own test binary: faer's parallelism switch is process-wide.

use approx::assert_abs_diff_eq;
use ccembed::linalg::faer_ndarray::{FaerEigh, FaerSvd};
use ccembed::{EmbeddingOptions, MISSING, embed_similarity_matrix};
use faer::Side;
use ndarray::array;

#[test]
fn decompositions_do_not_consult_global_parallelism() {
    faer::disable_global_parallelism();

    let sym = array![[2.0, 1.0, 0.0], [1.0, 2.0, 0.5], [0.0, 0.5, 1.0]];
    let (values, vectors) = sym.eigh(Side::Lower).expect("eigh");
    assert_eq!(values.len(), 3);
    assert_eq!(vectors.dim(), (3, 3));
    let rebuilt = vectors.dot(&ndarray::Array2::from_diag(&values)).dot(&vectors.t());
    for (a, b) in rebuilt.iter().zip(sym.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-10);
    }

    let (upper_values, _) = sym.eigh(Side::Upper).expect("eigh upper");
    for (a, b) in upper_values.iter().zip(values.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }

    let tall = array![[1.0, 2.0], [3.0, 4.0], [0.5, -1.0]];
    let svd = tall.thin_svd().expect("svd");
    assert_eq!(svd.s.len(), 2);

    let scores = array![
        [MISSING, 0.6, 0.3],
        [0.6, MISSING, 0.2],
        [0.3, 0.2, MISSING]
    ];
    let result = embed_similarity_matrix(&scores, &EmbeddingOptions::with_dim(2))
        .expect("embedding runs without global parallelism");
    assert!(result.coordinates.iter().all(|v| v.is_finite()));
}
