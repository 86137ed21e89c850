//! Cross-sample statistics and the combined output table.
//!
//! The aggregate step only runs once every sample in a [`BatchResult`] has
//! either been fit or failed. It averages the measured signals per volume,
//! fits that mean trace like any other sample, and averages the per-fraction
//! purities of the samples that were fit successfully.
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::pipeline::{
    fit_sample, fit_samples, BatchResult, ConfigError, DeconvolutionConfig, ElutionTable,
    FitResult, SampleError,
};

/// The name the mean trace's fit is reported under
pub const MEAN_SAMPLE_NAME: &str = "Mean";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("No sample was fit successfully")]
    NoSuccessfulSamples,
    #[error("Sample {name} has {found} fractions, expected {expected}")]
    InconsistentFractionCount {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// The mean and spread of the values observed at one position
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointStatistics {
    /// `None` when nothing was observed
    pub mean: Option<f64>,
    /// The sample standard deviation, `None` with fewer than two observations
    pub std_dev: Option<f64>,
    /// The number of finite observations
    pub count: usize,
}

/// Compute the mean and sample standard deviation of the finite values in `values`
pub fn mean_and_std<I: IntoIterator<Item = f64>>(values: I) -> PointStatistics {
    let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    let count = values.len();
    if count == 0 {
        return PointStatistics::default();
    }
    let mean = values.iter().sum::<f64>() / count as f64;
    let std_dev = if count > 1 {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        Some((ss / (count - 1) as f64).sqrt())
    } else {
        None
    };
    PointStatistics {
        mean: Some(mean),
        std_dev,
        count,
    }
}

/// Per-volume statistics over every measured sample signal, whether or not
/// that sample was fit
pub fn trace_statistics(table: &ElutionTable) -> Vec<PointStatistics> {
    (0..table.len()).map(|i| mean_and_std(table.row(i))).collect()
}

/// Per-fraction statistics over the purities of `results`.
///
/// Every result must have `fraction_count` fractions.
pub fn purity_statistics<'a, I>(
    results: I,
    fraction_count: usize,
) -> Result<Vec<PointStatistics>, AggregationError>
where
    I: IntoIterator<Item = &'a FitResult>,
{
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); fraction_count];
    for result in results {
        if result.fractions().len() != fraction_count {
            return Err(AggregationError::InconsistentFractionCount {
                name: result.name().to_string(),
                expected: fraction_count,
                found: result.fractions().len(),
            });
        }
        for (column, fraction) in columns.iter_mut().zip(result.fractions()) {
            if let Some(purity) = fraction.purity() {
                column.push(purity);
            }
        }
    }
    Ok(columns.into_iter().map(mean_and_std).collect())
}

/// Cross-sample statistics for a batch
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub volume: Vec<f64>,
    pub mean_trace: Vec<Option<f64>>,
    pub trace_std_dev: Vec<Option<f64>>,
    /// The number of samples measured at each volume
    pub measured_counts: Vec<usize>,
    pub mean_purity: Vec<Option<f64>>,
    pub purity_std_dev: Vec<Option<f64>>,
    /// The deconvolution of the mean trace. A failure here does not invalidate
    /// the statistics above.
    pub mean_fit: Result<FitResult, SampleError>,
}

/// Combine the successful fits in `batch` with the raw signals in `table`
pub fn aggregate(
    table: &ElutionTable,
    batch: &BatchResult,
    config: &DeconvolutionConfig,
) -> Result<AggregateResult, AggregationError> {
    if batch.successes().next().is_none() {
        return Err(AggregationError::NoSuccessfulSamples);
    }
    let purity = purity_statistics(batch.successes(), config.curve.fraction_count)?;

    let points = trace_statistics(table);
    let mean_trace: Vec<Option<f64>> = points.iter().map(|p| p.mean).collect();
    let mean_fit = fit_sample(MEAN_SAMPLE_NAME, table.volume(), &mean_trace, config);
    match mean_fit.as_ref() {
        Ok(fit) => log::info!(
            "Mean trace of {} samples fit with Rs = {:?}",
            batch.successes().count(),
            fit.resolution_value()
        ),
        Err(e) => log::warn!("The mean trace could not be fit: {e}"),
    }

    Ok(AggregateResult {
        volume: table.volume().to_vec(),
        mean_trace,
        trace_std_dev: points.iter().map(|p| p.std_dev).collect(),
        measured_counts: points.iter().map(|p| p.count).collect(),
        mean_purity: purity.iter().map(|p| p.mean).collect(),
        purity_std_dev: purity.iter().map(|p| p.std_dev).collect(),
        mean_fit,
    })
}

/// The tabular export of a deconvolution run.
///
/// Columns are `Volume`, each sample's raw signal, each sample's fraction
/// purities as `<name> purity`, then `Mean`, `Mean purity` and `Purity SD`.
/// Fraction columns fill the first rows in fraction order. Every row is as wide
/// as `columns`, and cells without a value are `None`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CombinedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl CombinedTable {
    pub fn build(table: &ElutionTable, batch: &BatchResult, aggregate: &AggregateResult) -> Self {
        let mut columns: Vec<Vec<Option<f64>>> = Vec::new();
        let mut names: Vec<String> = Vec::new();

        names.push("Volume".to_string());
        columns.push(table.volume().iter().copied().map(Some).collect());
        for sample in table.samples() {
            names.push(sample.name.clone());
            columns.push(sample.signal.clone());
        }
        for sample in table.samples() {
            names.push(format!("{} purity", sample.name));
            columns.push(match batch.get(&sample.name) {
                Some(Ok(fit)) => fit.purities(),
                _ => Vec::new(),
            });
        }
        names.push("Mean".to_string());
        columns.push(aggregate.mean_trace.clone());
        names.push("Mean purity".to_string());
        columns.push(aggregate.mean_purity.clone());
        names.push("Purity SD".to_string());
        columns.push(aggregate.purity_std_dev.clone());

        let n_rows = columns.iter().map(|c| c.len()).max().unwrap_or_default();
        let rows = (0..n_rows)
            .map(|i| {
                columns
                    .iter()
                    .map(|c| c.get(i).copied().flatten())
                    .collect()
            })
            .collect();
        Self {
            columns: names,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The values of the column called `name`
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }
}

/// A complete run: every sample's outcome and, if it could be computed, the aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct Deconvolution {
    pub batch: BatchResult,
    pub aggregate: Result<AggregateResult, AggregationError>,
}

impl Deconvolution {
    /// Lay the run out as a [`CombinedTable`], if aggregation succeeded
    pub fn combined_table(&self, table: &ElutionTable) -> Option<CombinedTable> {
        self.aggregate
            .as_ref()
            .ok()
            .map(|agg| CombinedTable::build(table, &self.batch, agg))
    }
}

/// Deconvolve every sample in `table` and aggregate the results.
///
/// Only an invalid configuration is an error here. Per-sample failures are kept
/// in the batch, and an aggregation failure leaves the batch intact.
pub fn run(table: &ElutionTable, config: &DeconvolutionConfig) -> Result<Deconvolution, ConfigError> {
    let batch = fit_samples(table, config)?;
    let aggregate = aggregate(table, &batch, config);
    if let Err(e) = aggregate.as_ref() {
        log::warn!("Aggregation failed: {e}");
    }
    Ok(Deconvolution { batch, aggregate })
}
