#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error type shared by the linear algebra routines.
pub mod error;
pub use error::LinalgError;

/// LU decomposition with scaled partial pivoting.
pub mod lu;
pub use lu::LUDecomposition;

/// Dense row-major matrix.
pub mod matrix;
pub use matrix::Matrix;

pub mod svd;
pub use svd::{SingularValueDecomposition, MAX_QR_ITERATIONS};

/// Serialization of [`Matrix`] when the `serde` feature is enabled.
#[cfg(feature = "serde")]
pub mod serde;
