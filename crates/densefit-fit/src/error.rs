use densefit_linalg::LinalgError;
use thiserror::Error;

/// An error type for the fitting routines.
#[derive(Error, Debug, PartialEq)]
pub enum FitError {
    /// Error raised by the underlying linear algebra.
    #[error(transparent)]
    Linalg(#[from] LinalgError),

    /// The design matrix was solved before every row was filled.
    #[error("Incomplete design matrix: {filled} of {expected} rows filled")]
    IncompleteDesign {
        /// Number of completed rows.
        filled: usize,
        /// Number of rows reserved at construction.
        expected: usize,
    },

    /// The observation protocol was not followed.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The damped normal equations of a Levenberg-Marquardt step are singular.
    #[error("Singular normal equations at iteration {iteration} (lambda = {lambda})")]
    SingularNormalEquations {
        /// Iteration at which the solve failed.
        iteration: usize,
        /// Damping factor in use.
        lambda: f64,
    },

    /// The query requires at least one completed step.
    #[error("No step has been taken yet")]
    NotStepped,
}
