#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error type for the fitting routines.
pub mod error;
pub use error::FitError;

pub mod linear;
pub use linear::{LeastSquaresFit, LinearFitSolution, DEFAULT_SVD_TOLERANCE};

pub mod nonlinear;
pub use nonlinear::{NonlinearFit, NonlinearFitConfig, StepOutcome};
