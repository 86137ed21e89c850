use std::time::{Duration, Instant};

use nalgebra::{SMatrix, SVector};
use thiserror::Error;

use super::{
    BoundsError, ElutionTrace, FitConfig, MixtureParameters, ModelFitResult, ParameterBounds,
    StopReason, N_PARAMS,
};

type NormalMatrix = SMatrix<f64, N_PARAMS, N_PARAMS>;
type ParamVector = SVector<f64, N_PARAMS>;

const DAMPING_SCALE: f64 = 10.0;
const DAMPING_MIN: f64 = 1e-15;
const DAMPING_MAX: f64 = 1e16;
/// Columns of the normal matrix whose squared norm falls below this are treated as rank deficient
const RANK_FLOOR: f64 = 1e-300;

/// All the ways fitting a mixture model can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error(
        "The fit did not converge within {iterations} iterations \
         (sum of squared residuals {sum_squared_residuals}, last relative improvement {last_improvement})"
    )]
    IterationLimit {
        iterations: usize,
        sum_squared_residuals: f64,
        last_improvement: f64,
    },
    #[error("The Jacobian became singular after {iterations} iterations")]
    SingularJacobian { iterations: usize },
    #[error("The model produced a non-finite residual after {iterations} iterations")]
    NonFinite { iterations: usize },
    #[error("The fit exceeded its time limit of {limit:?} after {iterations} iterations")]
    TimeLimit { limit: Duration, iterations: usize },
    #[error("The fit was aborted after {iterations} iterations")]
    Aborted { iterations: usize },
    #[error("{points} points cannot constrain {required} parameters")]
    TooFewPoints { points: usize, required: usize },
    #[error(transparent)]
    InvalidBounds(#[from] BoundsError),
}

/// The linearized least squares system at one parameter vector
#[derive(Debug, Clone, Copy)]
struct NormalEquations {
    jtj: NormalMatrix,
    gradient: ParamVector,
    sum_squared_residuals: f64,
}

/// Fit a [`MixtureParameters`] model to a single trace by bounded Levenberg-Marquardt
/// least squares.
///
/// Each iteration solves the damped normal equations
///
/// ```math
/// (J^TJ + \lambda\,\mathrm{diag}(J^TJ))\,\delta = J^Tr
/// ```
///
/// and projects the trial point back onto the [`ParameterBounds`]. Steps that
/// reduce the sum of squared residuals are accepted and relax $`\lambda`$, others are
/// rejected and stiffen it. There is no randomization, the same inputs always
/// produce the same fit.
#[derive(Debug, Clone)]
pub struct MixtureFitter<'a> {
    pub data: ElutionTrace<'a>,
    pub bounds: ParameterBounds,
    pub model: Option<MixtureParameters>,
}

impl<'a> MixtureFitter<'a> {
    pub fn new(data: ElutionTrace<'a>) -> Self {
        Self {
            data,
            bounds: ParameterBounds::default(),
            model: None,
        }
    }

    pub fn with_bounds(mut self, bounds: ParameterBounds) -> Self {
        self.bounds = bounds;
        self
    }

    fn normal_equations(&self, params: &MixtureParameters) -> Option<NormalEquations> {
        let mut jtj = NormalMatrix::zeros();
        let mut gradient = ParamVector::zeros();
        let mut sum_squared_residuals = 0.0;
        for (x, y) in self.data.iter() {
            let row = ParamVector::from(params.jacobian(x));
            let r = y - params.density(x);
            jtj += row * row.transpose();
            gradient += row * r;
            sum_squared_residuals += r * r;
        }
        let finite = sum_squared_residuals.is_finite()
            && jtj.iter().all(|v| v.is_finite())
            && gradient.iter().all(|v| v.is_finite());
        finite.then_some(NormalEquations {
            jtj,
            gradient,
            sum_squared_residuals,
        })
    }

    fn solve_damped(system: &NormalEquations, damping: f64) -> Option<ParamVector> {
        let mut augmented = system.jtj;
        for j in 0..N_PARAMS {
            augmented[(j, j)] += damping * system.jtj[(j, j)];
        }
        let step = augmented.cholesky()?.solve(&system.gradient);
        step.iter().all(|v| v.is_finite()).then_some(step)
    }

    fn check_interrupt(
        config: &FitConfig,
        started: Instant,
        iterations: usize,
    ) -> Result<(), FitError> {
        if let Some(handle) = config.abort.as_ref() {
            if handle.is_aborted() {
                return Err(FitError::Aborted { iterations });
            }
        }
        if let Some(limit) = config.time_limit {
            if started.elapsed() > limit {
                return Err(FitError::TimeLimit { limit, iterations });
            }
        }
        Ok(())
    }

    /// Fit the model starting from `initial`, storing the converged parameters in
    /// [`MixtureFitter::model`].
    pub fn fit_with(
        &mut self,
        initial: &MixtureParameters,
        config: &FitConfig,
    ) -> Result<ModelFitResult, FitError> {
        self.model = None;
        self.bounds.validate()?;
        if self.data.len() < N_PARAMS {
            return Err(FitError::TooFewPoints {
                points: self.data.len(),
                required: N_PARAMS,
            });
        }

        let started = Instant::now();
        let exact_fit = self.data.energy() * f64::EPSILON * f64::EPSILON;

        let mut params = self.bounds.clamp(initial);
        let mut system = self
            .normal_equations(&params)
            .ok_or(FitError::NonFinite { iterations: 0 })?;

        if (0..N_PARAMS).any(|j| system.jtj[(j, j)] <= RANK_FLOOR) {
            return Err(FitError::SingularJacobian { iterations: 0 });
        }

        let mut damping = config.initial_damping;
        let mut last_improvement = f64::INFINITY;
        let mut iterations = 0;
        let mut stop = None;

        for it in 0..config.max_iter {
            iterations = it + 1;
            Self::check_interrupt(config, started, it)?;

            if system.sum_squared_residuals <= exact_fit {
                log::trace!("{it}: Exact fit, SSE = {:e}", system.sum_squared_residuals);
                stop = Some(StopReason::ExactFit);
                break;
            }

            // No step of any useful length can be taken from here
            if damping > DAMPING_MAX {
                log::trace!("{it}: Damping {damping:e} exceeds {DAMPING_MAX:e}");
                return Err(FitError::SingularJacobian { iterations });
            }

            let Some(step) = Self::solve_damped(&system, damping) else {
                damping *= DAMPING_SCALE;
                log::trace!("{it}: Damped system not positive definite, damping = {damping:e}");
                continue;
            };

            let current = ParamVector::from(params.to_array());
            let proposed: [f64; N_PARAMS] = (current + step).into();
            let trial_vector = ParamVector::from(self.bounds.clamp_array(proposed));
            let trial = MixtureParameters::from_array(trial_vector.into());
            let trial_sse = trial.sum_squared_residuals(&self.data);

            if trial_sse.is_finite() && trial_sse < system.sum_squared_residuals {
                last_improvement =
                    (system.sum_squared_residuals - trial_sse) / system.sum_squared_residuals;
                log::trace!(
                    "{it}: Accepted step, SSE = {trial_sse:e}, improvement = {last_improvement:e}, damping = {damping:e}"
                );
                params = trial;
                system = self
                    .normal_equations(&params)
                    .ok_or(FitError::NonFinite { iterations })?;
                damping = (damping / DAMPING_SCALE).max(DAMPING_MIN);
                if last_improvement < config.convergence {
                    stop = Some(StopReason::Improvement);
                    break;
                }
            } else {
                damping *= DAMPING_SCALE;
                let taken = (trial_vector - current).norm();
                log::trace!("{it}: Rejected step of length {taken:e}, damping = {damping:e}");
                if taken <= config.step_tolerance * (current.norm() + config.step_tolerance) {
                    stop = Some(StopReason::StepTolerance);
                    break;
                }
            }
        }

        let Some(stop) = stop else {
            return Err(FitError::IterationLimit {
                iterations,
                sum_squared_residuals: system.sum_squared_residuals,
                last_improvement,
            });
        };

        let sse = system.sum_squared_residuals;
        log::debug!("Converged ({stop:?}) after {iterations} iterations with SSE = {sse:e}: {params:?}");
        self.model = Some(params);
        Ok(ModelFitResult::new(
            sse,
            (sse / self.data.len() as f64).sqrt(),
            iterations,
            damping,
            stop,
        ))
    }

    /// Compute the model residuals over the observed volume axis
    pub fn residuals(&self) -> Option<Vec<f64>> {
        self.model.as_ref().map(|m| m.residuals(&self.data))
    }

    /// The fitted model's signal over the observed volume axis
    pub fn predicted(&self) -> Option<Vec<f64>> {
        self.model.as_ref().map(|m| m.predict(self.data.volume()))
    }
}

/// Fit `trace` from `initial` within `bounds`, returning the converged parameters
/// alongside the fit report.
pub fn fit_mixture(
    trace: &ElutionTrace,
    initial: &MixtureParameters,
    bounds: &ParameterBounds,
    config: &FitConfig,
) -> Result<(MixtureParameters, ModelFitResult), FitError> {
    let mut fitter = MixtureFitter::new(trace.borrow()).with_bounds(*bounds);
    let report = fitter.fit_with(initial, config)?;
    let params = fitter
        .model
        .ok_or(FitError::NonFinite { iterations: report.iterations })?;
    Ok((params, report))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mixture::AbortHandle;
    use crate::test_data::{noisy_trace, reference_parameters, reference_trace, synthetic_trace};

    macro_rules! assert_relative {
        ($observed:expr, $expected:expr, $tol:expr, $label:expr) => {
            assert!(
                (($observed - $expected) / $expected).abs() <= $tol,
                "Observed {} {}, expected {}",
                $label,
                $observed,
                $expected
            );
        };
    }

    #[rstest::rstest]
    fn test_recovers_reference_parameters(reference_trace: &ElutionTrace<'static>) {
        let truth = reference_parameters();
        let (fit, report) = fit_mixture(
            reference_trace,
            &MixtureParameters::default(),
            &ParameterBounds::default(),
            &FitConfig::default(),
        )
        .unwrap();
        assert!(report.iterations < FitConfig::default().max_iter);
        assert!(report.rmse < 1e-4, "{report:?}");
        for ((obs, exp), name) in fit
            .to_array()
            .into_iter()
            .zip(truth.to_array())
            .zip(crate::mixture::PARAMETER_NAMES)
        {
            assert_relative!(obs, exp, 1e-2, name);
        }
    }

    #[rstest::rstest]
    #[case(MixtureParameters::new(-1.1, 0.22, 2.5, -0.55, 0.18, 6.5))]
    #[case(MixtureParameters::new(-1.3, 0.18, 3.0, -0.45, 0.22, 6.0))]
    #[case(MixtureParameters::new(-1.25, 0.2, 1.5, -0.6, 0.19, 8.0))]
    fn test_recovers_shifted_parameters(#[case] truth: MixtureParameters) {
        let trace = synthetic_trace(&truth, 300);
        let mut fitter = MixtureFitter::new(trace.borrow());
        let report = fitter
            .fit_with(&MixtureParameters::default(), &FitConfig::default())
            .unwrap();
        let fit = fitter.model.unwrap();
        log::debug!("{report:?} {fit:?}");
        for ((obs, exp), name) in fit
            .to_array()
            .into_iter()
            .zip(truth.to_array())
            .zip(crate::mixture::PARAMETER_NAMES)
        {
            assert_relative!(obs, exp, 1e-2, name);
        }
        let residuals = fitter.residuals().unwrap();
        assert!(residuals.iter().all(|r| r.abs() < 1e-4));
        let predicted = fitter.predicted().unwrap();
        assert_eq!(predicted.len(), trace.len());
        for (p, y) in predicted.iter().zip(trace.signal()) {
            assert!((p - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let truth = MixtureParameters::new(-1.1, 0.22, 2.5, -0.55, 0.18, 6.5);
        let trace = noisy_trace(&truth, 250, 0.2, 7);
        let bounds = ParameterBounds::default();
        let config = FitConfig::default();
        let a = fit_mixture(&trace, &MixtureParameters::default(), &bounds, &config).unwrap();
        let b = fit_mixture(&trace, &MixtureParameters::default(), &bounds, &config).unwrap();
        assert_eq!(a, b);
        assert!(bounds.contains(&a.0));
        assert_ne!(a.1.stop, StopReason::ExactFit);
    }

    #[test]
    fn test_runaway_damping_is_singular() {
        let trace = noisy_trace(&reference_parameters(), 300, 0.05, 5);
        let config = FitConfig::default().initial_damping(DAMPING_MAX * 10.0);
        let err = fit_mixture(
            &trace,
            &MixtureParameters::default(),
            &ParameterBounds::default(),
            &config,
        )
        .unwrap_err();
        assert_eq!(err, FitError::SingularJacobian { iterations: 1 });

        let mut fitter = MixtureFitter::new(trace.borrow());
        assert!(fitter.fit_with(&MixtureParameters::default(), &config).is_err());
        assert!(fitter.model.is_none());
        assert!(fitter.predicted().is_none());
    }

    #[test]
    fn test_too_few_points() {
        let trace = ElutionTrace::try_from((vec![0.2_f64, 0.4, 0.6], vec![1.0_f64, 2.0, 1.0])).unwrap();
        let err = fit_mixture(
            &trace,
            &MixtureParameters::default(),
            &ParameterBounds::default(),
            &FitConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, FitError::TooFewPoints { points: 3, required: 6 });
    }

    #[test]
    fn test_iteration_limit() {
        let trace = noisy_trace(&reference_parameters(), 300, 0.5, 3);
        let config = FitConfig::default().max_iter(1).convergence(0.0);
        let err = fit_mixture(
            &trace,
            &MixtureParameters::new(-2.0, 0.4, 5.0, 0.2, 0.4, 2.0),
            &ParameterBounds::default(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, FitError::IterationLimit { iterations: 1, .. }), "{err:?}");
    }

    #[test]
    fn test_aborted_fit() {
        let trace = synthetic_trace(&reference_parameters(), 100);
        let handle = AbortHandle::new();
        handle.abort();
        let config = FitConfig::default().abort_handle(handle);
        let err = fit_mixture(
            &trace,
            &MixtureParameters::new(-1.0, 0.3, 3.0, -0.3, 0.3, 5.0),
            &ParameterBounds::default(),
            &config,
        )
        .unwrap_err();
        assert_eq!(err, FitError::Aborted { iterations: 0 });
    }

    #[test]
    fn test_time_limit() {
        let trace = synthetic_trace(&reference_parameters(), 100);
        let config = FitConfig::default().time_limit(Duration::ZERO);
        let err = fit_mixture(
            &trace,
            &MixtureParameters::new(-1.0, 0.3, 3.0, -0.3, 0.3, 5.0),
            &ParameterBounds::default(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, FitError::TimeLimit { .. }), "{err:?}");
    }

    #[test]
    fn test_dead_component_is_singular() {
        // All signal sits far beyond the reach of either component
        let volume: Vec<f64> = (0..20).map(|i| 500.0 + i as f64).collect();
        let signal = vec![1.0_f64; 20];
        let trace = ElutionTrace::try_from((volume, signal)).unwrap();
        let err = fit_mixture(
            &trace,
            &MixtureParameters::default(),
            &ParameterBounds::default(),
            &FitConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, FitError::SingularJacobian { iterations: 0 });
    }

    #[test]
    fn test_invalid_bounds_are_rejected() {
        let trace = synthetic_trace(&reference_parameters(), 100);
        let bounds = ParameterBounds::default().bound(2, 0.0, 10.0);
        let err = fit_mixture(&trace, &MixtureParameters::default(), &bounds, &FitConfig::default())
            .unwrap_err();
        assert!(matches!(err, FitError::InvalidBounds(_)));
    }
}
