#![deny(dead_code)]
#![deny(unused_imports)]

//! Low-dimensional embedding of partially observed similarity matrices.
//!
//! Given an `N x N` matrix of pairwise scores with unknown cells encoded as
//! NaN, the engine backfills the unknown cells from a rank-1 hypothesis,
//! takes a spectral embedding of the completed matrix and refines it row by
//! row with a trust-region least-squares solver so that dot products of the
//! coordinates reproduce the observed scores.

pub mod completion;
pub mod embed;
pub mod linalg;
pub mod report;
pub mod solver;
pub mod spectral;
pub mod types;

pub use completion::{CompletedMatrix, complete_matrix, observed_fraction};
pub use embed::{
    EmbeddingError, Refinement, RowResidual, check_connectivity, embed_similarity_matrix,
    known_neighbor_counts, refine_embedding, refine_row, validate_input,
};
pub use report::EmbeddingReport;
pub use solver::{LeastSquaresProblem, LeastSquaresResult, Termination, solve_least_squares};
pub use spectral::{SpectralEmbedding, spectral_embedding};
pub use types::{
    EmbeddingOptions, EmbeddingResult, IterationTrace, LeastSquaresOptions, MISSING, is_missing,
};
