#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use densefit_linalg as linalg;

#[doc(inline)]
pub use densefit_fit as fit;
