//! Per-sample deconvolution: fit a trace, evaluate the fitted mixture on the
//! dense curve, and derive resolution and fraction purities from it.
//!
//! Samples are independent of one another. A sample that cannot be fit is
//! recorded as failed in the [`BatchResult`] and never stops the batch.
use std::collections::HashSet;
use std::fmt::Display;

use cfg_if::cfg_if;
use thiserror::Error;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::curve::{CurveConfig, DenseCurve};
use crate::metrics::{weighted_purity, CurveMetrics, Fraction, ResolutionEstimate};
use crate::mixture::{
    fit_mixture, validate_volume, BoundsError, ElutionTrace, FitConfig, FitError,
    MixtureParameters, ModelFitResult, ParameterBounds, TraceError, PARAMETER_NAMES,
};
use crate::search;

/// Parameters within this share of their bound interval are reported as resting on it
const BOUND_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("The fraction count must be at least one")]
    NoFractions,
    #[error("Each fraction must hold at least one curve point")]
    EmptyFractions,
    #[error("The curve range maximum must be positive and finite, got {0}")]
    InvalidRange(f64),
    #[error("Invalid parameter bounds: {0}")]
    Bounds(#[from] BoundsError),
}

/// Everything needed to deconvolve a batch of traces
#[derive(Debug, Clone, Default)]
pub struct DeconvolutionConfig {
    /// The dense curve and fraction layout
    pub curve: CurveConfig,
    /// The parameters every fit starts from
    pub initial_guess: MixtureParameters,
    pub bounds: ParameterBounds,
    /// Solver settings
    pub fit: FitConfig,
}

impl DeconvolutionConfig {
    pub fn curve(mut self, curve: CurveConfig) -> Self {
        self.curve = curve;
        self
    }

    pub fn initial_guess(mut self, initial_guess: MixtureParameters) -> Self {
        self.initial_guess = initial_guess;
        self
    }

    pub fn bounds(mut self, bounds: ParameterBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn fit(mut self, fit: FitConfig) -> Self {
        self.fit = fit;
        self
    }

    /// Check the configuration once before any sample is processed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.curve.fraction_count == 0 {
            return Err(ConfigError::NoFractions);
        }
        if self.curve.points_per_fraction == 0 {
            return Err(ConfigError::EmptyFractions);
        }
        if !(self.curve.range_max > 0.0 && self.curve.range_max.is_finite()) {
            return Err(ConfigError::InvalidRange(self.curve.range_max));
        }
        self.bounds.validate()?;
        self.bounds.check(&self.initial_guess)?;
        Ok(())
    }
}

/// A fit that succeeded but whose result should not be taken at face value
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FitWarning {
    /// The primary component's location is not below the secondary's
    ComponentOrderInverted { mu1: f64, mu2: f64 },
    /// The second apex does not follow the first, so the resolution is not a valid separation
    NonPositiveSeparation { resolution: f64 },
    /// A parameter converged onto one of its bounds
    ParameterAtBound { parameter: usize, value: f64 },
}

impl Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ComponentOrderInverted { mu1, mu2 } => {
                write!(f, "Components are out of elution order: mu1 = {mu1} >= mu2 = {mu2}")
            }
            Self::NonPositiveSeparation { resolution } => {
                write!(f, "Resolution {resolution} does not describe a separation")
            }
            Self::ParameterAtBound { parameter, value } => write!(
                f,
                "{} converged onto its bound at {value}",
                PARAMETER_NAMES[*parameter]
            ),
        }
    }
}

/// Inspect a fitted model for results whose resolution and purity would be
/// misleading
pub fn diagnose(
    parameters: &MixtureParameters,
    resolution: &ResolutionEstimate,
    bounds: &ParameterBounds,
) -> Vec<FitWarning> {
    let mut warnings = Vec::new();
    if !parameters.is_ordered() {
        warnings.push(FitWarning::ComponentOrderInverted {
            mu1: parameters.first.mu,
            mu2: parameters.second.mu,
        });
    }
    if let Some(rs) = resolution.value() {
        if rs <= 0.0 {
            warnings.push(FitWarning::NonPositiveSeparation { resolution: rs });
        }
    }
    let values = parameters.to_array();
    warnings.extend(
        bounds
            .active(parameters, BOUND_TOLERANCE)
            .into_iter()
            .map(|parameter| FitWarning::ParameterAtBound {
                parameter,
                value: values[parameter],
            }),
    );
    warnings
}

/// The deconvolution of a single trace.
///
/// A `FitResult` is only built by [`fit_trace`] and is read-only afterwards. The
/// curve, resolution, fractions and warnings are all derived from the fitted
/// parameters, so purities for other parameters come from evaluating a new
/// [`DenseCurve`], never from editing an existing result.
///
/// ```compile_fail
/// # use elutionfit::prelude::*;
/// fn overwrite(result: &mut FitResult) {
///     result.parameters = MixtureParameters::default();
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitResult {
    name: String,
    parameters: MixtureParameters,
    report: ModelFitResult,
    curve: DenseCurve,
    resolution: ResolutionEstimate,
    fractions: Vec<Fraction>,
    warnings: Vec<FitWarning>,
}

impl FitResult {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &MixtureParameters {
        &self.parameters
    }

    /// The solver's report for this fit
    pub fn report(&self) -> &ModelFitResult {
        &self.report
    }

    pub fn curve(&self) -> &DenseCurve {
        &self.curve
    }

    pub fn resolution(&self) -> &ResolutionEstimate {
        &self.resolution
    }

    pub fn fractions(&self) -> &[Fraction] {
        &self.fractions
    }

    pub fn warnings(&self) -> &[FitWarning] {
        &self.warnings
    }

    pub fn resolution_value(&self) -> Option<f64> {
        self.resolution.value()
    }

    /// The purity of each fraction, in fraction order
    pub fn purities(&self) -> Vec<Option<f64>> {
        self.fractions.iter().map(|f| f.purity()).collect()
    }

    /// The fraction whose center is closest to `volume`
    pub fn fraction_near(&self, volume: f64) -> Option<&Fraction> {
        let centers: Vec<f64> = self.fractions.iter().map(|f| f.x_center).collect();
        search::nearest(&centers, volume).and_then(|i| self.fractions.get(i))
    }

    /// The purity of everything collected across all fractions
    pub fn overall_purity(&self) -> Option<f64> {
        weighted_purity(&self.fractions)
    }

    /// Whether the components elute in the assumed order
    pub fn is_ordered(&self) -> bool {
        self.parameters.is_ordered() && self.resolution.is_ordered()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Why a single sample produced no [`FitResult`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] TraceError),
    #[error("Fit failed to converge: {0}")]
    Fit(#[from] FitError),
}

/// Fit `trace` and derive every metric from the fitted curve
pub fn fit_trace(
    name: impl Into<String>,
    trace: &ElutionTrace,
    config: &DeconvolutionConfig,
) -> Result<FitResult, FitError> {
    let name = name.into();
    let (parameters, report) =
        fit_mixture(trace, &config.initial_guess, &config.bounds, &config.fit)?;
    let curve = DenseCurve::evaluate(&parameters, &config.curve);
    let (resolution, fractions) = CurveMetrics::compute(&curve).into_parts();
    let warnings = diagnose(&parameters, &resolution, &config.bounds);
    for warning in warnings.iter() {
        log::warn!("{name}: {warning}");
    }
    log::debug!(
        "{name}: fit {parameters:?} in {} iterations, Rs = {:?}",
        report.iterations,
        resolution.value()
    );
    Ok(FitResult {
        name,
        parameters,
        report,
        curve,
        resolution,
        fractions,
        warnings,
    })
}

/// Fit one partially measured sample column against the shared volume axis.
/// Unmeasured points are dropped before fitting.
pub fn fit_sample(
    name: &str,
    volume: &[f64],
    signal: &[Option<f64>],
    config: &DeconvolutionConfig,
) -> Result<FitResult, SampleError> {
    let trace = ElutionTrace::from_measured(volume, signal)?;
    let result = fit_trace(name, &trace, config)?;
    Ok(result)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("The table has no sample columns")]
    NoSamples,
    #[error("Invalid volume column: {0}")]
    Volume(#[from] TraceError),
    #[error("Sample {name} has {found} rows, expected {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Sample name {0} appears more than once")]
    DuplicateName(String),
}

/// One named sample's signal over the table's volume axis, `None` where it was not measured
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleColumn {
    pub name: String,
    pub signal: Vec<Option<f64>>,
}

impl SampleColumn {
    pub fn new(name: impl Into<String>, signal: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            signal,
        }
    }

    /// A column measured at every volume
    pub fn measured(name: impl Into<String>, signal: &[f64]) -> Self {
        Self::new(name, signal.iter().copied().map(Some).collect())
    }
}

/// A validated table of samples sharing one volume axis
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElutionTable {
    volume: Vec<f64>,
    samples: Vec<SampleColumn>,
}

impl ElutionTable {
    /// Check that the volume axis is positive and strictly increasing, that every
    /// sample spans it, and that sample names are unique
    pub fn new(volume: Vec<f64>, samples: Vec<SampleColumn>) -> Result<Self, TableError> {
        validate_volume(&volume)?;
        if samples.is_empty() {
            return Err(TableError::NoSamples);
        }
        let mut seen = HashSet::new();
        for sample in samples.iter() {
            if sample.signal.len() != volume.len() {
                return Err(TableError::ColumnLength {
                    name: sample.name.clone(),
                    expected: volume.len(),
                    found: sample.signal.len(),
                });
            }
            if !seen.insert(sample.name.as_str()) {
                return Err(TableError::DuplicateName(sample.name.clone()));
            }
        }
        Ok(Self { volume, samples })
    }

    pub fn volume(&self) -> &[f64] {
        &self.volume
    }

    pub fn samples(&self) -> &[SampleColumn] {
        &self.samples
    }

    pub fn sample(&self, name: &str) -> Option<&SampleColumn> {
        self.samples.iter().find(|s| s.name == name)
    }

    pub fn sample_names(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|s| s.name.as_str())
    }

    /// The number of volume rows
    pub fn len(&self) -> usize {
        self.volume.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volume.is_empty()
    }

    /// The measured values of every sample at row `index`
    pub fn row(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.samples
            .iter()
            .filter_map(move |s| s.signal.get(index).copied().flatten())
    }
}

/// The outcome of deconvolving one sample
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    pub name: String,
    pub result: Result<FitResult, SampleError>,
}

/// Every sample's outcome, in table column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub outcomes: Vec<SampleOutcome>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SampleOutcome> {
        self.outcomes.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Result<FitResult, SampleError>> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.result)
    }

    pub fn successes(&self) -> impl Iterator<Item = &FitResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &SampleError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.name.as_str(), e)))
    }
}

impl FromIterator<SampleOutcome> for BatchResult {
    fn from_iter<T: IntoIterator<Item = SampleOutcome>>(iter: T) -> Self {
        Self {
            outcomes: iter.into_iter().collect(),
        }
    }
}

fn process_sample(
    volume: &[f64],
    sample: &SampleColumn,
    config: &DeconvolutionConfig,
) -> SampleOutcome {
    let result = fit_sample(&sample.name, volume, &sample.signal, config);
    if let Err(e) = result.as_ref() {
        log::warn!("Sample {} failed: {e}", sample.name);
    }
    SampleOutcome {
        name: sample.name.clone(),
        result,
    }
}

cfg_if! {
    if #[cfg(feature = "parallelism")] {
        fn fit_all(table: &ElutionTable, config: &DeconvolutionConfig) -> BatchResult {
            let outcomes: Vec<SampleOutcome> = table
                .samples()
                .par_iter()
                .map(|sample| process_sample(table.volume(), sample, config))
                .collect();
            BatchResult { outcomes }
        }
    } else {
        fn fit_all(table: &ElutionTable, config: &DeconvolutionConfig) -> BatchResult {
            table
                .samples()
                .iter()
                .map(|sample| process_sample(table.volume(), sample, config))
                .collect()
        }
    }
}

/// Deconvolve every sample in `table`, in parallel when the `parallelism`
/// feature is enabled. Returns once every sample has succeeded or failed.
pub fn fit_samples(
    table: &ElutionTable,
    config: &DeconvolutionConfig,
) -> Result<BatchResult, ConfigError> {
    config.validate()?;
    let batch = fit_all(table, config);
    log::debug!(
        "Fit {} of {} samples",
        batch.successes().count(),
        batch.len()
    );
    Ok(batch)
}
