use crate::types::{EmbeddingResult, is_missing};
use ndarray::Array2;
use std::fmt;

/// Text rendering of an embedding run for a results pane.
pub struct EmbeddingReport<'a> {
    pub input: &'a Array2<f64>,
    pub result: &'a EmbeddingResult,
}

impl<'a> EmbeddingReport<'a> {
    pub fn new(input: &'a Array2<f64>, result: &'a EmbeddingResult) -> Self {
        Self { input, result }
    }
}

impl fmt::Display for EmbeddingReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, _) = self.input.dim();
        let dim = self.result.coordinates.ncols();

        writeln!(f, "Input matrix ({n} x {n}):")?;
        for row in self.input.rows() {
            for &v in row {
                if is_missing(v) {
                    write!(f, " {:>10}", "-")?;
                } else {
                    write!(f, " {v:>10.4}")?;
                }
            }
            writeln!(f)?;
        }

        writeln!(f)?;
        writeln!(
            f,
            "Eigenvalues (correction factor {:.4}):",
            self.result.correction_factor
        )?;
        for (rank, lambda) in self.result.eigenvalues.iter().enumerate() {
            writeln!(f, "  {:>3} {:15.4e}", rank + 1, lambda)?;
        }

        writeln!(f)?;
        writeln!(f, "Coordinates ({dim} dimensions):")?;
        for (item, row) in self.result.coordinates.rows().into_iter().enumerate() {
            write!(f, "  {item:>4}")?;
            for &v in row {
                write!(f, " {v:12.6}")?;
            }
            writeln!(f)?;
        }

        writeln!(f)?;
        writeln!(f, "Refinement (initial rmsd {:.6e}):", self.result.initial_rmsd)?;
        writeln!(
            f,
            "  {:>4} {:>15} {:>15} {:>15}",
            "iter", "rmsd", "max change", "rmsd vs prev"
        )?;
        for t in &self.result.trace {
            writeln!(
                f,
                "  {:>4} {:15.6e} {:15.6e} {:15.6e}",
                t.iteration, t.rmsd, t.max_change, t.rmsd_vs_previous
            )?;
        }
        writeln!(
            f,
            "Final rmsd {:.6e}{}",
            self.result.final_rmsd,
            if self.result.converged {
                ""
            } else {
                " (pass cap reached)"
            }
        )
    }
}
