use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{MixtureParameters, N_PARAMS, PARAMETER_NAMES};

/// A shared flag that lets an in-flight fit be abandoned from another thread.
///
/// Cloning the handle shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that every fit observing this handle stop at its next iteration
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Hyperparameters for fitting a mixture model
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// The maximum number of solver iterations, counting rejected steps
    pub max_iter: usize,
    /// The relative reduction in the sum of squared residuals below which an
    /// accepted step is considered converged
    pub convergence: f64,
    /// The relative step length below which a rejected step is considered converged
    pub step_tolerance: f64,
    /// The starting Levenberg-Marquardt damping factor
    pub initial_damping: f64,
    /// An optional wall-clock budget for a single fit
    pub time_limit: Option<Duration>,
    /// An optional handle through which a fit may be abandoned
    pub abort: Option<AbortHandle>,
}

impl FitConfig {
    /// The maximum number of solver iterations, counting rejected steps
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// The relative reduction in the sum of squared residuals below which an
    /// accepted step is considered converged
    pub fn convergence(mut self, convergence: f64) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn step_tolerance(mut self, step_tolerance: f64) -> Self {
        self.step_tolerance = step_tolerance;
        self
    }

    pub fn initial_damping(mut self, initial_damping: f64) -> Self {
        self.initial_damping = initial_damping;
        self
    }

    /// Bound the wall-clock time a single fit may take
    pub fn time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = Some(time_limit);
        self
    }

    /// Observe `handle` once per iteration, stopping the fit when it is aborted
    pub fn abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = Some(handle);
        self
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iter: 1_000,
            convergence: 1e-10,
            step_tolerance: 1e-12,
            initial_damping: 1e-3,
            time_limit: None,
            abort: None,
        }
    }
}

/// The rule that ended a successful fit
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StopReason {
    /// The residuals vanished to within floating point precision
    ExactFit,
    /// An accepted step improved the sum of squared residuals by less than
    /// [`FitConfig::convergence`]
    #[default]
    Improvement,
    /// A rejected step moved the parameters by less than [`FitConfig::step_tolerance`]
    StepTolerance,
}

/// Describe a model fitting procedure's output
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelFitResult {
    /// The sum of squared residuals at the end of the optimization run
    pub sum_squared_residuals: f64,
    /// Root mean squared residual over the fitted points
    pub rmse: f64,
    /// The number of iterations run
    pub iterations: usize,
    /// The damping factor in effect when the solver stopped
    pub damping: f64,
    /// Which convergence rule stopped the solver
    pub stop: StopReason,
}

impl ModelFitResult {
    pub fn new(
        sum_squared_residuals: f64,
        rmse: f64,
        iterations: usize,
        damping: f64,
        stop: StopReason,
    ) -> Self {
        Self {
            sum_squared_residuals,
            rmse,
            iterations,
            damping,
            stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum BoundsError {
    #[error("Bounds for {name} are inverted or not finite: [{lower}, {upper}]")]
    Inverted {
        name: &'static str,
        lower: f64,
        upper: f64,
    },
    #[error("The lower bound for {name} must be positive, got {lower}")]
    NonPositive { name: &'static str, lower: f64 },
    #[error("The initial value of {name}, {value}, lies outside [{lower}, {upper}]")]
    OutOfBounds {
        name: &'static str,
        value: f64,
        lower: f64,
        upper: f64,
    },
}

/// Box constraints on the six mixture parameters, in [`MixtureParameters::to_array`] order
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterBounds {
    pub lower: [f64; N_PARAMS],
    pub upper: [f64; N_PARAMS],
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            lower: [-2.5, 0.1, 0.1, -1.5, 0.1, 0.1],
            upper: [-0.1, 0.5, 10.0, 0.5, 0.5, 10.0],
        }
    }
}

impl ParameterBounds {
    pub fn new(lower: [f64; N_PARAMS], upper: [f64; N_PARAMS]) -> Self {
        Self { lower, upper }
    }

    /// Set the bounds of the parameter at `index`
    pub fn bound(mut self, index: usize, lower: f64, upper: f64) -> Self {
        self.lower[index] = lower;
        self.upper[index] = upper;
        self
    }

    /// Check that every interval is ordered and that the scale and amplitude
    /// parameters cannot reach zero
    pub fn validate(&self) -> Result<(), BoundsError> {
        for (i, name) in PARAMETER_NAMES.iter().copied().enumerate() {
            let (lower, upper) = (self.lower[i], self.upper[i]);
            if !(lower.is_finite() && upper.is_finite() && lower <= upper) {
                return Err(BoundsError::Inverted { name, lower, upper });
            }
            // sigma and amplitude
            if i % 3 != 0 && lower <= 0.0 {
                return Err(BoundsError::NonPositive { name, lower });
            }
        }
        Ok(())
    }

    /// Check that `params` lies inside the bounds
    pub fn check(&self, params: &MixtureParameters) -> Result<(), BoundsError> {
        for (i, value) in params.to_array().into_iter().enumerate() {
            let (lower, upper) = (self.lower[i], self.upper[i]);
            if !(value >= lower && value <= upper) {
                return Err(BoundsError::OutOfBounds {
                    name: PARAMETER_NAMES[i],
                    value,
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }

    pub fn contains(&self, params: &MixtureParameters) -> bool {
        self.check(params).is_ok()
    }

    /// Project a raw parameter vector onto the bounds
    pub fn clamp_array(&self, mut values: [f64; N_PARAMS]) -> [f64; N_PARAMS] {
        for (i, v) in values.iter_mut().enumerate() {
            *v = v.clamp(self.lower[i], self.upper[i]);
        }
        values
    }

    pub fn clamp(&self, params: &MixtureParameters) -> MixtureParameters {
        MixtureParameters::from_array(self.clamp_array(params.to_array()))
    }

    /// The indices of the parameters resting on a bound, within a relative tolerance
    pub fn active(&self, params: &MixtureParameters, tolerance: f64) -> Vec<usize> {
        params
            .to_array()
            .into_iter()
            .enumerate()
            .filter(|(i, v)| {
                let span = (self.upper[*i] - self.lower[*i]).abs().max(f64::EPSILON);
                (v - self.lower[*i]).abs() <= tolerance * span
                    || (self.upper[*i] - v).abs() <= tolerance * span
            })
            .map(|(i, _)| i)
            .collect()
    }
}
