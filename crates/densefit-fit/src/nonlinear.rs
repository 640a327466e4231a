//! Levenberg-Marquardt optimizer for non-linear least squares, driven by the caller.
//!
//! The fitter never evaluates the model itself. Each iteration the caller
//! evaluates the model at [`NonlinearFit::params`], feeds one observation per
//! data point (the partial derivatives of the residual, then the residual) and
//! calls [`NonlinearFit::step`]. The step compares chi-squared against the last
//! accepted baseline, adapts the damping factor, and proposes new trial
//! parameters by solving the damped normal equations
//! `(J^T J + λ diag(J^T J)) δ = -J^T r`.
//!
//! Stopping is up to the caller, typically once every
//! [`NonlinearFit::step_size`] falls below a tolerance.

use densefit_linalg::{LUDecomposition, LinalgError, Matrix};
use log::debug;

use crate::error::FitError;

/// Levenberg-Marquardt damping configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct NonlinearFitConfig {
    /// Damping factor used for the first step.
    pub initial_lambda: f64,
    /// Factor applied to lambda after an accepted step.
    pub lambda_decrease: f64,
    /// Factor applied to lambda after a rejected step.
    pub lambda_increase: f64,
}

impl Default for NonlinearFitConfig {
    fn default() -> Self {
        Self {
            initial_lambda: 1e-3,
            lambda_decrease: 0.1,
            lambda_increase: 10.0,
        }
    }
}

impl NonlinearFitConfig {
    fn validate(&self) -> Result<(), FitError> {
        for (name, value) in [
            ("initial_lambda", self.initial_lambda),
            ("lambda_decrease", self.lambda_decrease),
            ("lambda_increase", self.lambda_increase),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(LinalgError::IllegalArgument(format!(
                    "{name} must be finite and positive, got {value}"
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Outcome of a single [`NonlinearFit::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Whether the evaluated trial improved on the previous baseline.
    ///
    /// The first step always accepts the initial parameters.
    pub accepted: bool,
    /// Chi-squared of the accepted baseline.
    pub chi_squared: f64,
    /// Damping factor used to compute the new trial.
    pub lambda: f64,
}

/// Normal equations accumulated at one parameter vector.
#[derive(Debug, Clone)]
struct Accumulation {
    alpha: Matrix,
    beta: Vec<f64>,
    chi_squared: f64,
    params: Vec<f64>,
}

/// Caller-driven Levenberg-Marquardt fitter.
///
/// Example:
///
/// ```
/// use densefit_fit::NonlinearFit;
///
/// // fit y = a * x to (1, 2), (2, 4)
/// let data = [(1.0, 2.0), (2.0, 4.0)];
/// let mut fit = NonlinearFit::new(vec![0.0]).unwrap();
/// for _ in 0..50 {
///     let a = fit.params()[0];
///     for &(x, y) in &data {
///         fit.add_error_derivative(x).unwrap();
///         fit.add_error(a * x - y).unwrap();
///     }
///     fit.step().unwrap();
///     if fit.is_converged(1e-12) {
///         break;
///     }
/// }
/// assert!((fit.best_params()[0] - 2.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct NonlinearFit {
    config: NonlinearFitConfig,
    current: Accumulation,
    baseline: Option<Accumulation>,
    derivatives: Vec<f64>,
    lambda: f64,
    increment: Vec<f64>,
    iterations: usize,
}

impl NonlinearFit {
    /// Create a fitter starting at `initial_params` with the default damping schedule.
    pub fn new(initial_params: Vec<f64>) -> Result<Self, FitError> {
        Self::with_config(initial_params, NonlinearFitConfig::default())
    }

    /// Create a fitter starting at `initial_params` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::Linalg`] with an illegal argument if there are no
    /// parameters or a configuration value is not finite and positive.
    pub fn with_config(
        initial_params: Vec<f64>,
        config: NonlinearFitConfig,
    ) -> Result<Self, FitError> {
        if initial_params.is_empty() {
            return Err(LinalgError::IllegalArgument("at least one parameter is required".into()).into());
        }
        config.validate()?;

        let n = initial_params.len();
        Ok(Self {
            lambda: config.initial_lambda,
            config,
            current: Accumulation {
                alpha: Matrix::zeros(n, n),
                beta: vec![0.0; n],
                chi_squared: 0.0,
                params: initial_params,
            },
            baseline: None,
            derivatives: Vec::with_capacity(n),
            increment: vec![0.0; n],
            iterations: 0,
        })
    }

    /// Number of parameters.
    pub fn nparams(&self) -> usize {
        self.current.params.len()
    }

    /// Trial parameters at which the next observations must be evaluated.
    pub fn params(&self) -> &[f64] {
        &self.current.params
    }

    /// Best parameters accepted so far, or the initial ones before the first step.
    pub fn best_params(&self) -> &[f64] {
        self.baseline
            .as_ref()
            .map_or(&self.current.params, |b| &b.params)
    }

    /// Chi-squared of the accepted baseline.
    ///
    /// Before the first step this is the running sum of the observations fed so far.
    pub fn chi_squared(&self) -> f64 {
        self.baseline
            .as_ref()
            .map_or(self.current.chi_squared, |b| b.chi_squared)
    }

    /// Current damping factor.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Number of completed steps.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Magnitude of the last proposed increment of parameter `index`, or `None`
    /// if `index >= nparams()`.
    pub fn step_size(&self, index: usize) -> Option<f64> {
        self.increment.get(index).map(|d| d.abs())
    }

    /// Magnitudes of the last proposed increment of every parameter.
    pub fn step_sizes(&self) -> Vec<f64> {
        self.increment.iter().map(|d| d.abs()).collect()
    }

    /// Whether a step was taken and every proposed increment is within `tolerance`.
    pub fn is_converged(&self, tolerance: f64) -> bool {
        self.iterations > 0 && self.increment.iter().all(|d| d.abs() <= tolerance)
    }

    /// Feed the partial derivative of the current observation's residual with
    /// respect to the next parameter.
    pub fn add_error_derivative(&mut self, derivative: f64) -> Result<(), FitError> {
        if self.derivatives.len() == self.nparams() {
            return Err(FitError::ProtocolViolation(format!(
                "all {} derivatives of this observation were already given",
                self.nparams()
            )));
        }
        self.derivatives.push(derivative);
        Ok(())
    }

    /// Complete the current observation with its residual.
    ///
    /// Accumulates `beta -= r * d`, the upper triangle of `alpha += d * d^T`, and
    /// `chi2 += r^2`.
    pub fn add_error(&mut self, residual: f64) -> Result<(), FitError> {
        let n = self.nparams();
        if self.derivatives.len() != n {
            return Err(FitError::ProtocolViolation(format!(
                "observation has {} of {n} derivatives",
                self.derivatives.len()
            )));
        }

        let acc = &mut self.current;
        for (i, &di) in self.derivatives.iter().enumerate() {
            acc.beta[i] -= residual * di;
            for (j, &dj) in self.derivatives.iter().enumerate().skip(i) {
                acc.alpha[(i, j)] += di * dj;
            }
        }
        acc.chi_squared += residual * residual;
        self.derivatives.clear();
        Ok(())
    }

    /// Feed a complete observation: all partial derivatives, then the residual.
    pub fn add_observation(&mut self, derivatives: &[f64], residual: f64) -> Result<(), FitError> {
        if derivatives.len() != self.nparams() {
            return Err(LinalgError::length_mismatch(
                "derivatives",
                self.nparams(),
                derivatives.len(),
            )
            .into());
        }
        for &d in derivatives {
            self.add_error_derivative(d)?;
        }
        self.add_error(residual)
    }

    /// Take one Levenberg-Marquardt step.
    ///
    /// Compares the chi-squared of the observations just fed against the
    /// accepted baseline. An improvement becomes the new baseline and divides
    /// lambda; otherwise the trial is discarded, the baseline restored, and lambda
    /// multiplied. A new trial is then proposed from the baseline. The
    /// accumulators are reset for the next round of observations.
    ///
    /// # Errors
    ///
    /// - [`FitError::ProtocolViolation`] if an observation is only partially fed.
    /// - [`FitError::SingularNormalEquations`] if the damped normal matrix is
    ///   singular. The fitter state is left as it was before the call.
    pub fn step(&mut self) -> Result<StepOutcome, FitError> {
        if !self.derivatives.is_empty() {
            return Err(FitError::ProtocolViolation(format!(
                "step called with {} pending derivatives",
                self.derivatives.len()
            )));
        }

        let n = self.nparams();
        let mut evaluated = self.current.clone();
        for i in 0..n {
            for j in 0..i {
                evaluated.alpha[(i, j)] = evaluated.alpha[(j, i)];
            }
        }

        let (accepted, lambda) = match &self.baseline {
            None => (true, self.config.initial_lambda),
            Some(prev) if evaluated.chi_squared < prev.chi_squared => {
                (true, self.lambda * self.config.lambda_decrease)
            }
            Some(_) => (false, self.lambda * self.config.lambda_increase),
        };

        let baseline = match (&self.baseline, accepted) {
            (Some(prev), false) => prev.clone(),
            _ => evaluated,
        };

        let mut damped = baseline.alpha.clone();
        for i in 0..n {
            damped[(i, i)] *= 1.0 + lambda;
        }
        let singular = || FitError::SingularNormalEquations {
            iteration: self.iterations,
            lambda,
        };
        let lu = LUDecomposition::from_matrix(damped).map_err(|e| match e {
            LinalgError::SingularMatrix => singular(),
            other => other.into(),
        })?;
        let increment = lu.solve(&baseline.beta)?;
        if increment.iter().any(|d| !d.is_finite()) {
            return Err(singular());
        }

        debug!(
            "iteration {}: chi2 {} ({}), lambda {}",
            self.iterations,
            baseline.chi_squared,
            if accepted { "accepted" } else { "rejected" },
            lambda
        );

        let trial: Vec<f64> = baseline
            .params
            .iter()
            .zip(&increment)
            .map(|(p, d)| p + d)
            .collect();

        self.current = Accumulation {
            alpha: Matrix::zeros(n, n),
            beta: vec![0.0; n],
            chi_squared: 0.0,
            params: trial,
        };
        let outcome = StepOutcome {
            accepted,
            chi_squared: baseline.chi_squared,
            lambda,
        };
        self.baseline = Some(baseline);
        self.increment = increment;
        self.lambda = lambda;
        self.iterations += 1;

        Ok(outcome)
    }

    /// Covariance of the best parameters: the inverse of the undamped normal
    /// matrix at the accepted baseline.
    ///
    /// # Errors
    ///
    /// - [`FitError::NotStepped`] before the first step.
    /// - [`FitError::Linalg`] if the normal matrix is singular.
    pub fn covariance(&self) -> Result<Matrix, FitError> {
        let baseline = self.baseline.as_ref().ok_or(FitError::NotStepped)?;
        Ok(baseline.alpha.inverse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Feed the observations of the line y = m x + b at the current trial.
    fn feed_line(fit: &mut NonlinearFit, data: &[(f64, f64)]) -> Result<(), FitError> {
        let (m, b) = (fit.params()[0], fit.params()[1]);
        for &(x, y) in data {
            fit.add_observation(&[x, 1.0], m * x + b - y)?;
        }
        Ok(())
    }

    #[test]
    fn test_first_step_sets_initial_lambda() -> Result<(), FitError> {
        let mut fit = NonlinearFit::new(vec![0.0, 0.0])?;
        feed_line(&mut fit, &[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)])?;
        let outcome = fit.step()?;
        assert!(outcome.accepted);
        assert_eq!(outcome.lambda, 1e-3);
        assert_relative_eq!(outcome.chi_squared, 35.0, epsilon = 1e-12);
        assert_eq!(fit.iterations(), 1);

        let sizes = fit.step_sizes();
        assert_eq!(fit.step_size(0), Some(sizes[0]));
        assert_eq!(fit.step_size(1), Some(sizes[1]));
        assert_eq!(fit.step_size(2), None);
        Ok(())
    }

    #[test]
    fn test_linear_model_converges() -> Result<(), FitError> {
        let data = [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0), (3.0, 7.0)];
        let mut fit = NonlinearFit::new(vec![0.0, 0.0])?;
        for _ in 0..50 {
            feed_line(&mut fit, &data)?;
            fit.step()?;
            if fit.is_converged(1e-12) {
                break;
            }
        }
        assert_relative_eq!(fit.best_params()[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(fit.best_params()[1], 1.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_rejected_step_restores_baseline() -> Result<(), FitError> {
        let data = [(0.0, 1.0), (1.0, 3.0)];
        let mut fit = NonlinearFit::new(vec![0.0, 0.0])?;
        feed_line(&mut fit, &data)?;
        let first = fit.step()?;
        let baseline = fit.best_params().to_vec();

        // feed a deliberately worse residual at the trial point
        for &(x, _) in &data {
            fit.add_observation(&[x, 1.0], 1e3)?;
        }
        let second = fit.step()?;
        assert!(!second.accepted);
        assert_eq!(second.chi_squared, first.chi_squared);
        assert_relative_eq!(second.lambda, first.lambda * 10.0, epsilon = 1e-15);
        assert_eq!(fit.best_params(), baseline.as_slice());
        Ok(())
    }

    #[test]
    fn test_equal_chi2_is_not_an_improvement() -> Result<(), FitError> {
        let mut fit = NonlinearFit::new(vec![1.0])?;
        fit.add_observation(&[1.0], 2.0)?;
        fit.step()?;
        fit.add_observation(&[1.0], 2.0)?;
        let outcome = fit.step()?;
        assert!(!outcome.accepted);
        Ok(())
    }

    #[test]
    fn test_singular_normal_equations() -> Result<(), FitError> {
        let mut fit = NonlinearFit::new(vec![0.0, 0.0])?;
        // derivative with respect to the second parameter is always zero
        fit.add_observation(&[1.0, 0.0], 1.0)?;
        fit.add_observation(&[2.0, 0.0], 1.0)?;
        assert!(matches!(
            fit.step(),
            Err(FitError::SingularNormalEquations { iteration: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_protocol_violations() -> Result<(), FitError> {
        let mut fit = NonlinearFit::new(vec![0.0, 0.0])?;
        assert!(matches!(
            fit.add_error(1.0),
            Err(FitError::ProtocolViolation(_))
        ));
        fit.add_error_derivative(1.0)?;
        assert!(matches!(fit.step(), Err(FitError::ProtocolViolation(_))));
        fit.add_error_derivative(1.0)?;
        assert!(matches!(
            fit.add_error_derivative(1.0),
            Err(FitError::ProtocolViolation(_))
        ));
        fit.add_error(0.5)?;
        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let config = NonlinearFitConfig {
            lambda_increase: 0.0,
            ..Default::default()
        };
        assert!(NonlinearFit::with_config(vec![1.0], config).is_err());
        assert!(NonlinearFit::new(vec![]).is_err());
    }

    #[test]
    fn test_covariance_of_line_fit() -> Result<(), FitError> {
        let data = [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)];
        let mut fit = NonlinearFit::new(vec![0.0, 0.0])?;
        assert_eq!(fit.covariance().err(), Some(FitError::NotStepped));

        feed_line(&mut fit, &data)?;
        fit.step()?;
        // J^T J = [[5, 3], [3, 3]], whose inverse is [[0.5, -0.5], [-0.5, 5/6]]
        let cov = fit.covariance()?;
        assert_relative_eq!(cov[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(cov[(0, 1)], -0.5, epsilon = 1e-12);
        assert_relative_eq!(cov[(1, 0)], -0.5, epsilon = 1e-12);
        assert_relative_eq!(cov[(1, 1)], 5.0 / 6.0, epsilon = 1e-12);
        Ok(())
    }
}
