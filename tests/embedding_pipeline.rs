use approx::assert_abs_diff_eq;
use ccembed::{
    EmbeddingError, EmbeddingOptions, EmbeddingReport, MISSING, complete_matrix,
    embed_similarity_matrix, is_missing, observed_fraction, spectral_embedding,
};
use ndarray::{Array2, array};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

/// Symmetric scores from random `rank`-dimensional coordinates with the diagonal
/// and a random share of off-diagonal pairs removed. Every item keeps at least
/// `min_known` observed neighbours.
fn random_partial_matrix(
    seed: u64,
    n: usize,
    rank: usize,
    drop_probability: f64,
    min_known: usize,
) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut coords = Array2::<f64>::zeros((n, rank));
    for v in coords.iter_mut() {
        *v = rng.random_range(-1.0..1.0);
    }
    let mut scores = coords.dot(&coords.t());
    let mut known = vec![n - 1; n];
    for i in 0..n {
        scores[[i, i]] = MISSING;
        for j in (i + 1)..n {
            if rng.random::<f64>() < drop_probability && known[i] > min_known && known[j] > min_known
            {
                scores[[i, j]] = MISSING;
                scores[[j, i]] = MISSING;
                known[i] -= 1;
                known[j] -= 1;
            }
        }
    }
    scores
}

#[test]
fn all_ones_matrix_embeds_on_a_single_axis() {
    let mut scores = Array2::<f64>::ones((4, 4));
    for i in 0..4 {
        scores[[i, i]] = MISSING;
    }
    let completed = complete_matrix(&scores, &EmbeddingOptions::with_dim(1));
    // Only the diagonal is estimated; off-diagonal cells were all observed.
    assert_eq!(completed.estimated_positions, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);

    let result = embed_similarity_matrix(&scores, &EmbeddingOptions::with_dim(1))
        .expect("embedding should succeed");

    // The diagonal is rebuilt as h² = 1, so the completed matrix is all ones.
    assert_abs_diff_eq!(result.eigenvalues[0], 4.0, epsilon = 1e-9);
    let first = result.coordinates[[0, 0]];
    assert_abs_diff_eq!(first.abs(), 1.0, epsilon = 1e-9);
    for i in 1..4 {
        assert_abs_diff_eq!(result.coordinates[[i, 0]], first, epsilon = 1e-9);
    }
    assert_abs_diff_eq!(result.initial_rmsd, 0.0, epsilon = 1e-12);
    assert!(result.converged);
    assert_eq!(result.trace.len(), 1);
    assert_abs_diff_eq!(result.final_rmsd, 0.0, epsilon = 1e-12);
}

#[test]
fn frustrated_triangle_clamps_its_negative_axis() {
    let scores = array![
        [MISSING, 0.9, 0.9],
        [0.9, MISSING, -0.9],
        [0.9, -0.9, MISSING]
    ];
    let options = EmbeddingOptions::with_dim(3);
    let completed = complete_matrix(&scores, &options);
    let spectral =
        spectral_embedding(&completed.matrix, 3, observed_fraction(&scores)).expect("eigh");

    assert!(spectral.eigenvalues[2] < 0.0);
    for i in 0..3 {
        assert_eq!(spectral.coordinates[[i, 2]], 0.0);
    }
    for w in spectral.raw_eigenvalues.as_slice().expect("contiguous").windows(2) {
        assert!(w[0] >= w[1]);
    }

    let result = embed_similarity_matrix(&scores, &options).expect("embedding should succeed");
    assert_eq!(result.coordinates.dim(), (3, 3));
    assert!(result.coordinates.iter().all(|v| v.is_finite()));
    assert!(result.final_rmsd <= result.initial_rmsd + 1e-12);
}

#[test]
fn caller_matrix_is_not_rounded_in_place() {
    let scores = array![
        [MISSING, 0.123456, 0.654321],
        [0.123456, MISSING, 0.333333],
        [0.654321, 0.333333, MISSING]
    ];
    let before = scores.clone();
    embed_similarity_matrix(&scores, &EmbeddingOptions::with_dim(2)).expect("embedding");
    for (a, b) in scores.iter().zip(before.iter()) {
        assert!(a == b || (is_missing(*a) && is_missing(*b)));
    }
}

#[test]
fn malformed_input_is_rejected_before_work() {
    let scores = Array2::<f64>::zeros((3, 3));
    let err = embed_similarity_matrix(&scores, &EmbeddingOptions::with_dim(5))
        .expect_err("dim larger than N must fail");
    assert!(matches!(err, EmbeddingError::InvalidDimension { dim: 5, n: 3 }));
    assert!(err.to_string().contains("1..=3"));

    let rect = Array2::<f64>::zeros((3, 2));
    assert!(matches!(
        embed_similarity_matrix(&rect, &EmbeddingOptions::with_dim(1)),
        Err(EmbeddingError::NotSquare { .. })
    ));
}

#[test]
fn connectivity_check_is_opt_in() {
    let scores = array![
        [MISSING, 0.5, MISSING, MISSING],
        [0.5, MISSING, 0.4, 0.3],
        [MISSING, 0.4, MISSING, 0.2],
        [MISSING, 0.3, 0.2, MISSING]
    ];
    let mut options = EmbeddingOptions::with_dim(2);
    assert!(embed_similarity_matrix(&scores, &options).is_ok());

    options.check_connectivity = true;
    assert!(matches!(
        embed_similarity_matrix(&scores, &options),
        Err(EmbeddingError::InsufficientConnectivity {
            item: 0,
            known: 1,
            required: 2
        })
    ));
}

#[test]
fn terminates_with_non_increasing_rmsd_on_random_inputs() {
    for (seed, &n) in [2usize, 3, 7, 15, 30, 50].iter().enumerate() {
        let dim = 3usize.min(n - 1);
        let scores = random_partial_matrix(seed as u64 + 7, n, 3, 0.25, dim);
        let options = EmbeddingOptions::with_dim(dim);
        let result = embed_similarity_matrix(&scores, &options)
            .unwrap_or_else(|e| panic!("n={n}: embedding failed: {e}"));

        assert_eq!(result.coordinates.dim(), (n, dim));
        assert_eq!(result.eigenvalues.len(), dim);
        assert!(result.coordinates.iter().all(|v| v.is_finite()), "n={n}");
        assert!(result.trace.len() <= options.max_outer_iterations);

        // With an unobserved diagonal every row update can only lower the
        // total squared error, so the trace never climbs.
        let mut last = result.initial_rmsd;
        for t in &result.trace {
            assert!(
                t.rmsd <= last * (1.0 + 1e-9) + 1e-12,
                "n={n}: rmsd rose from {last:e} to {:e} at pass {}",
                t.rmsd,
                t.iteration
            );
            last = t.rmsd;
        }
        assert!(result.final_rmsd <= result.initial_rmsd * (1.0 + 1e-9) + 1e-12);
    }
}

#[test]
fn low_rank_input_is_recovered_closely() {
    let scores = random_partial_matrix(42, 20, 2, 0.2, 4);
    let result = embed_similarity_matrix(&scores, &EmbeddingOptions::with_dim(2))
        .expect("embedding should succeed");
    assert!(result.final_rmsd < result.initial_rmsd);
    assert!(result.final_rmsd < 0.05, "final rmsd {:e}", result.final_rmsd);
}

#[test]
fn estimated_positions_are_the_missing_cells_and_diagonal() {
    let scores = random_partial_matrix(3, 10, 3, 0.3, 3);
    let result = embed_similarity_matrix(&scores, &EmbeddingOptions::default()).expect("embed");
    let expected: Vec<(usize, usize)> = scores
        .indexed_iter()
        .filter(|&((i, j), &v)| i == j || is_missing(v))
        .map(|(idx, _)| idx)
        .collect();
    assert_eq!(result.estimated_positions, expected);
    let missing = scores.iter().filter(|v| is_missing(**v)).count();
    assert_abs_diff_eq!(
        result.correction_factor,
        1.0 - missing as f64 / 100.0,
        epsilon = 1e-15
    );
}

#[test]
fn report_renders_a_trace_line_per_pass() {
    let scores = random_partial_matrix(9, 6, 2, 0.2, 2);
    let result = embed_similarity_matrix(&scores, &EmbeddingOptions::with_dim(2)).expect("embed");
    let text = EmbeddingReport::new(&scores, &result).to_string();
    assert!(text.contains("Input matrix (6 x 6):"));
    assert!(text.contains("Coordinates (2 dimensions):"));
    let trace_lines = text
        .lines()
        .skip_while(|l| !l.trim_start().starts_with("iter"))
        .skip(1)
        .take_while(|l| !l.starts_with("Final"))
        .count();
    assert_eq!(trace_lines, result.trace.len());
}

#[test]
fn options_round_trip_through_json() {
    let options = EmbeddingOptions {
        dim: 2,
        check_connectivity: true,
        ..EmbeddingOptions::default()
    };
    let json = serde_json::to_string(&options).expect("serialize");
    let back: EmbeddingOptions = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, options);

    let sparse: EmbeddingOptions = serde_json::from_str(r#"{"dim": 2}"#).expect("defaults");
    assert_eq!(sparse, EmbeddingOptions::with_dim(2));
}
