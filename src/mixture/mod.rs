//! The two-component log-normal elution model and its bounded least squares fitter.
//!
//! A chromatographic trace of two co-eluting species is modeled as
//!
//! ```math
//! y(x) = \sum_{k=1}^{2} \frac{a_k}{x\sigma_k\sqrt{2\pi}}\exp\left(-\frac{(\ln x - \mu_k)^2}{2\sigma_k^2}\right)
//! ```
//!
//! where $`x`$ is the elution volume. The six parameters are packed into a
//! [`MixtureParameters`], and fit to an [`ElutionTrace`] with
//! [`MixtureFitter`], a projected Levenberg-Marquardt solver constrained by
//! [`ParameterBounds`].
//!
//! # Example
//!
//! ```rust
//! use elutionfit::mixture::{ElutionTrace, FitConfig, MixtureParameters, ParameterBounds, fit_mixture};
//!
//! let truth = MixtureParameters::new(-1.1, 0.22, 2.5, -0.55, 0.18, 6.5);
//! let volume: Vec<f64> = (1..=300).map(|i| i as f64 * 0.005).collect();
//! let signal = truth.predict(&volume);
//! let trace = ElutionTrace::try_from((volume, signal)).unwrap();
//!
//! let (fit, report) = fit_mixture(
//!     &trace,
//!     &MixtureParameters::default(),
//!     &ParameterBounds::default(),
//!     &FitConfig::default(),
//! ).unwrap();
//! assert!(report.rmse < 1e-4);
//! assert!((fit.first.mu - truth.first.mu).abs() < 1e-3);
//! ```
mod data;
mod fitter;
mod model;
mod shapes;
mod utils;

pub use data::{validate_volume, ElutionTrace, ElutionTraceIter, TraceError};
pub use fitter::{fit_mixture, FitError, MixtureFitter};
pub use model::{mixture_pdf, MixtureParameters, N_PARAMS, PARAMETER_NAMES};
pub use shapes::{log_normal_pdf, DomainError, LogNormalPeakShape, MIN_VOLUME};
pub use utils::{
    AbortHandle, BoundsError, FitConfig, ModelFitResult, ParameterBounds, StopReason,
};
