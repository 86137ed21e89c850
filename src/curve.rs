//! Dense evaluation of a fitted mixture over a fixed volume range, split into
//! contiguous collection fractions.
//!
//! The curve is sampled at `fraction_count * points_per_fraction` evenly spaced
//! volumes over `[range_max / (10 * points_per_fraction), range_max]`. Point `i`
//! belongs to fraction `i / points_per_fraction + 1`, and any trailing points
//! past the last full fraction are folded into the last one.
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{linspace, trapz};
use crate::mixture::MixtureParameters;

/// Controls the range and resolution of a [`DenseCurve`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurveConfig {
    /// The number of fractions, `N`
    pub fraction_count: usize,
    /// The number of curve points in each fraction, `stepN`
    pub points_per_fraction: usize,
    /// The upper end of the volume axis
    pub range_max: f64,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            fraction_count: 13,
            points_per_fraction: 100,
            range_max: 1.5,
        }
    }
}

impl CurveConfig {
    pub fn fraction_count(mut self, fraction_count: usize) -> Self {
        self.fraction_count = fraction_count;
        self
    }

    pub fn points_per_fraction(mut self, points_per_fraction: usize) -> Self {
        self.points_per_fraction = points_per_fraction;
        self
    }

    pub fn range_max(mut self, range_max: f64) -> Self {
        self.range_max = range_max;
        self
    }

    /// The lower end of the volume axis
    pub fn range_min(&self) -> f64 {
        self.range_max / (10 * self.points_per_fraction.max(1)) as f64
    }

    pub fn point_count(&self) -> usize {
        self.fraction_count * self.points_per_fraction
    }

    /// The evenly spaced volumes the curve is evaluated at
    pub fn volumes(&self) -> Vec<f64> {
        linspace(self.range_min(), self.range_max, self.point_count())
    }

    pub fn layout(&self) -> FractionLayout {
        FractionLayout::new(self.fraction_count, self.points_per_fraction)
    }
}

/// The assignment of consecutive curve points to fractions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FractionLayout {
    pub fraction_count: usize,
    pub points_per_fraction: usize,
}

impl FractionLayout {
    pub fn new(fraction_count: usize, points_per_fraction: usize) -> Self {
        Self {
            fraction_count,
            points_per_fraction,
        }
    }

    /// The 1-based fraction number of point `index`, capped at the last fraction
    pub fn fraction_of(&self, index: usize) -> usize {
        (index / self.points_per_fraction.max(1) + 1).min(self.fraction_count.max(1))
    }

    /// The point index ranges of each fraction for a curve of `len` points.
    ///
    /// Exactly `fraction_count` ranges are produced. When `len` is not a multiple of
    /// `points_per_fraction`, the last range absorbs the remainder, or comes up short.
    /// Fractions beyond the end of a short curve are empty.
    pub fn ranges(&self, len: usize) -> Vec<Range<usize>> {
        let step = self.points_per_fraction.max(1);
        (0..self.fraction_count)
            .map(|k| {
                let start = (k * step).min(len);
                let end = if k + 1 == self.fraction_count {
                    len
                } else {
                    ((k + 1) * step).min(len)
                };
                start..end
            })
            .collect()
    }
}

/// One sample of the fitted model
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurvePoint {
    pub x: f64,
    /// The primary component's signal
    pub first: f64,
    /// The secondary component's signal
    pub second: f64,
    pub total: f64,
    /// The 1-based fraction this point is collected in
    pub fraction: usize,
    /// The secondary component's share of the signal at this point, `None` where
    /// there is no modeled signal. This is a diagnostic, not the complement of
    /// fraction purity.
    pub contamination: Option<f64>,
}

impl CurvePoint {
    pub fn new(x: f64, first: f64, second: f64, fraction: usize) -> Self {
        let total = first + second;
        let contamination = if total > 0.0 {
            Some(second / total)
        } else {
            None
        };
        Self {
            x,
            first,
            second,
            total,
            fraction,
            contamination,
        }
    }
}

/// A fitted mixture densely sampled over the collection range
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DenseCurve {
    pub points: Vec<CurvePoint>,
    pub layout: FractionLayout,
}

impl DenseCurve {
    /// Evaluate `params` over the volume axis described by `config`
    pub fn evaluate(params: &MixtureParameters, config: &CurveConfig) -> Self {
        Self::evaluate_at(params, &config.volumes(), config.layout())
    }

    /// Evaluate `params` at arbitrary ascending `volumes`, assigning fractions by `layout`
    pub fn evaluate_at(params: &MixtureParameters, volumes: &[f64], layout: FractionLayout) -> Self {
        let points = volumes
            .iter()
            .copied()
            .enumerate()
            .map(|(i, x)| {
                CurvePoint::new(
                    x,
                    params.first.density(x),
                    params.second.density(x),
                    layout.fraction_of(i),
                )
            })
            .collect();
        Self { points, layout }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CurvePoint> {
        self.points.iter()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.iter().map(|p| p.x).collect()
    }

    pub fn first_component(&self) -> Vec<f64> {
        self.iter().map(|p| p.first).collect()
    }

    pub fn second_component(&self) -> Vec<f64> {
        self.iter().map(|p| p.second).collect()
    }

    pub fn totals(&self) -> Vec<f64> {
        self.iter().map(|p| p.total).collect()
    }

    pub fn contamination(&self) -> Vec<Option<f64>> {
        self.iter().map(|p| p.contamination).collect()
    }

    /// The point index range of each fraction
    pub fn fraction_ranges(&self) -> Vec<Range<usize>> {
        self.layout.ranges(self.len())
    }

    /// The primary component's share of the integrated signal over the whole curve
    pub fn integrated_purity(&self) -> Option<f64> {
        let xs = self.volumes();
        let first = trapz(&xs, &self.first_component());
        let total = trapz(&xs, &self.totals());
        if total > 0.0 {
            Some(first / total)
        } else {
            None
        }
    }
}

impl<'a> IntoIterator for &'a DenseCurve {
    type Item = &'a CurvePoint;

    type IntoIter = std::slice::Iter<'a, CurvePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
