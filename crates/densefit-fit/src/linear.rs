//! Linear least-squares fitting through the singular value decomposition.
//!
//! The fit solves the overdetermined system `A * c ≈ y` where row `i` of the
//! design matrix `A` holds the basis functions evaluated at observation `i`.
//! Each row and its measurement are divided by the observation's standard
//! deviation before solving.

use densefit_linalg::{LinalgError, Matrix, SingularValueDecomposition};
use log::debug;

use crate::error::FitError;

/// Default relative tolerance below which singular values are discarded.
pub const DEFAULT_SVD_TOLERANCE: f64 = 1e-10;

/// Result of a linear least-squares fit.
#[derive(Debug, Clone)]
pub struct LinearFitSolution {
    /// Best-fit coefficient of each basis function.
    pub coefficients: Vec<f64>,
    /// Covariance of the coefficients, `nterms x nterms`.
    pub covariance: Matrix,
    /// Weighted sum of squared residuals at the solution.
    pub chi_squared: f64,
    /// Singular values of the weighted design matrix after clipping, unsorted.
    pub singular_values: Vec<f64>,
}

/// Incremental builder for a weighted linear least-squares problem.
///
/// Each observation is fed as: an optional [`add_error`](Self::add_error), then
/// exactly `nterms` calls to [`add_function_value`](Self::add_function_value),
/// then one call to [`add_measured_value`](Self::add_measured_value).
///
/// Example:
///
/// ```
/// use densefit_fit::LeastSquaresFit;
///
/// // y = 2x + 1
/// let mut fit = LeastSquaresFit::new(3, 2).unwrap();
/// for x in [0.0, 1.0, 2.0] {
///     fit.add_row(&[x, 1.0], 2.0 * x + 1.0).unwrap();
/// }
/// let c = fit.fit().unwrap();
/// assert!((c[0] - 2.0).abs() < 1e-9);
/// assert!((c[1] - 1.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct LeastSquaresFit {
    design: Matrix,
    rhs: Vec<f64>,
    row: usize,
    col: usize,
    sigma: f64,
    tolerance: f64,
}

impl LeastSquaresFit {
    /// Reserve a problem with `npoints` observations of `nterms` basis functions.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::Linalg`] with an illegal argument unless
    /// `npoints >= nterms >= 1`.
    pub fn new(npoints: usize, nterms: usize) -> Result<Self, FitError> {
        Self::with_tolerance(npoints, nterms, DEFAULT_SVD_TOLERANCE)
    }

    /// Same as [`LeastSquaresFit::new`] with an explicit singular value tolerance.
    pub fn with_tolerance(npoints: usize, nterms: usize, tolerance: f64) -> Result<Self, FitError> {
        if nterms == 0 {
            return Err(LinalgError::IllegalArgument("at least one term is required".into()).into());
        }
        if npoints < nterms {
            return Err(LinalgError::IllegalArgument(format!(
                "{npoints} points cannot determine {nterms} terms"
            ))
            .into());
        }
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(LinalgError::IllegalArgument(format!(
                "tolerance must be finite and non-negative, got {tolerance}"
            ))
            .into());
        }
        Ok(Self {
            design: Matrix::zeros(npoints, nterms),
            rhs: vec![0.0; npoints],
            row: 0,
            col: 0,
            sigma: 1.0,
            tolerance,
        })
    }

    /// Number of observations reserved.
    pub fn npoints(&self) -> usize {
        self.design.rows()
    }

    /// Number of basis functions.
    pub fn nterms(&self) -> usize {
        self.design.cols()
    }

    /// Number of completed observations.
    pub fn points_added(&self) -> usize {
        self.row
    }

    /// Whether every reserved observation has been completed.
    pub fn is_complete(&self) -> bool {
        self.row == self.npoints()
    }

    /// Set the standard deviation of the next observation only.
    pub fn add_error(&mut self, sigma: f64) -> Result<(), FitError> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(FitError::ProtocolViolation(format!(
                "standard deviation must be finite and positive, got {sigma}"
            )));
        }
        if self.col != 0 {
            return Err(FitError::ProtocolViolation(
                "the error must be set before the function values of a point".into(),
            ));
        }
        self.sigma = sigma;
        Ok(())
    }

    /// Append the next basis function value of the current observation.
    pub fn add_function_value(&mut self, value: f64) -> Result<(), FitError> {
        if self.is_complete() {
            return Err(FitError::ProtocolViolation(format!(
                "all {} points have already been added",
                self.npoints()
            )));
        }
        if self.col == self.nterms() {
            return Err(FitError::ProtocolViolation(format!(
                "point {} already has {} function values",
                self.row,
                self.nterms()
            )));
        }
        self.design[(self.row, self.col)] = value / self.sigma;
        self.col += 1;
        Ok(())
    }

    /// Complete the current observation with its measured value.
    pub fn add_measured_value(&mut self, value: f64) -> Result<(), FitError> {
        if self.is_complete() {
            return Err(FitError::ProtocolViolation(format!(
                "all {} points have already been added",
                self.npoints()
            )));
        }
        if self.col != self.nterms() {
            return Err(FitError::ProtocolViolation(format!(
                "point {} has {} of {} function values",
                self.row,
                self.col,
                self.nterms()
            )));
        }
        self.rhs[self.row] = value / self.sigma;
        self.row += 1;
        self.col = 0;
        self.sigma = 1.0;
        Ok(())
    }

    /// Add a complete observation: its basis function values and the measurement.
    pub fn add_row(&mut self, function_values: &[f64], measured: f64) -> Result<(), FitError> {
        if function_values.len() != self.nterms() {
            return Err(LinalgError::length_mismatch(
                "function values",
                self.nterms(),
                function_values.len(),
            )
            .into());
        }
        for &v in function_values {
            self.add_function_value(v)?;
        }
        self.add_measured_value(measured)
    }

    /// Solve the problem, returning coefficients, covariance and chi-squared.
    ///
    /// # Errors
    ///
    /// - [`FitError::IncompleteDesign`] if some observations are missing.
    /// - [`FitError::Linalg`] if the decomposition fails.
    pub fn solve(&self) -> Result<LinearFitSolution, FitError> {
        if !self.is_complete() {
            return Err(FitError::IncompleteDesign {
                filled: self.row,
                expected: self.npoints(),
            });
        }

        let mut svd = SingularValueDecomposition::new(&self.design)?;
        let clipped = svd.clip_singular_values(self.tolerance);
        if clipped > 0 {
            debug!(
                "clipped {clipped} of {} singular values below relative tolerance {}",
                self.nterms(),
                self.tolerance
            );
        }

        let coefficients = svd.solve(&self.rhs)?;
        let predicted = self.design.multiply(&coefficients)?;
        let chi_squared = predicted
            .iter()
            .zip(&self.rhs)
            .map(|(p, y)| (p - y) * (p - y))
            .sum();

        Ok(LinearFitSolution {
            coefficients,
            covariance: svd.covariance(),
            chi_squared,
            singular_values: svd.w().to_vec(),
        })
    }

    /// Solve the problem and return the best-fit coefficients.
    pub fn fit(&self) -> Result<Vec<f64>, FitError> {
        self.solve().map(|s| s.coefficients)
    }
}
