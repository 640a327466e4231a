use thiserror::Error;

/// An error type for the dense linear algebra routines.
#[derive(Error, Debug, PartialEq)]
pub enum LinalgError {
    /// The arguments have incompatible dimensions or invalid values.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// A pivot was exactly zero, or a row was entirely zero before pivoting.
    #[error("Singular matrix")]
    SingularMatrix,

    /// The iterative diagonalization did not converge or produced non-finite values.
    #[error("No convergence: {0}")]
    NoConvergence(String),
}

impl LinalgError {
    /// Create an error for a vector whose length does not match the expected one.
    pub fn length_mismatch(what: &str, expected: usize, actual: usize) -> Self {
        Self::IllegalArgument(format!(
            "{what} has length {actual}, expected {expected}"
        ))
    }

    /// Create an error for an operation that needs a square matrix.
    pub fn not_square(rows: usize, cols: usize) -> Self {
        Self::IllegalArgument(format!("matrix must be square, got {rows}x{cols}"))
    }

    /// Create an error for a pair of matrices with incompatible shapes.
    pub fn shape_mismatch(expected: (usize, usize), actual: (usize, usize)) -> Self {
        Self::IllegalArgument(format!(
            "shape mismatch: expected {}x{}, got {}x{}",
            expected.0, expected.1, actual.0, actual.1
        ))
    }
}
