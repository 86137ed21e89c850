//! `elutionfit` deconvolves pairs of overlapping chromatographic elution peaks.
//!
//! Each trace is fit with a two-component log-normal mixture by bounded
//! Levenberg-Marquardt least squares (see [`mixture`]). The fitted model is then
//! sampled densely over the collection range and split into fractions
//! ([`curve`]), from which the resolution between the two components and the
//! purity of the primary component in every fraction are derived ([`metrics`]).
//!
//! Whole tables of samples are processed by [`pipeline::fit_samples`], where a
//! sample that cannot be fit is recorded and skipped, and [`aggregate::run`]
//! combines the successful fits into cross-sample statistics and a
//! [`CombinedTable`](aggregate::CombinedTable) for export.
//!
//! # Usage
//! ```
//! use elutionfit::prelude::*;
//!
//! let truth = MixtureParameters::new(-1.2, 0.2, 2.0, -0.5, 0.2, 7.0);
//! let volume: Vec<f64> = (1..=300).map(|i| i as f64 * 0.005).collect();
//! let signal = truth.predict(&volume);
//!
//! let table = ElutionTable::new(volume, vec![SampleColumn::measured("A", &signal)]).unwrap();
//! let config = DeconvolutionConfig::default();
//! let run = elutionfit::run(&table, &config).unwrap();
//!
//! let fit = run.batch.get("A").unwrap().as_ref().unwrap();
//! assert!(fit.resolution_value().unwrap() > 0.0);
//! assert!(fit.fraction_near(0.3).unwrap().purity().unwrap() > 0.9);
//!
//! let combined = run.combined_table(&table).unwrap();
//! assert_eq!(combined.columns[0], "Volume");
//! ```
//! ## Features
//! - `parallelism` (default) fits the samples of a table concurrently with `rayon`.
//! - `serde` derives `Serialize` and `Deserialize` for the result types.
pub mod aggregate;
pub mod arrayops;
pub mod curve;
pub mod metrics;
pub mod mixture;
pub mod peak_statistics;
pub mod pipeline;
pub mod prelude;
pub mod search;

#[cfg(test)]
mod test_data;

pub use crate::aggregate::{aggregate, run, AggregateResult, AggregationError, CombinedTable, Deconvolution};
pub use crate::curve::{CurveConfig, DenseCurve};
pub use crate::mixture::{fit_mixture, FitConfig, FitError, MixtureParameters, ParameterBounds};
pub use crate::pipeline::{
    fit_samples, fit_trace, DeconvolutionConfig, ElutionTable, FitResult, SampleError,
};
