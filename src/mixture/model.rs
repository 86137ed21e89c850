#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{log_normal_pdf, DomainError, ElutionTrace, LogNormalPeakShape};

/// The number of free parameters in a [`MixtureParameters`]
pub const N_PARAMS: usize = 6;

/// Parameter names in the order used by [`MixtureParameters::to_array`]
pub const PARAMETER_NAMES: [&str; N_PARAMS] =
    ["mu1", "sigma1", "amplitude1", "mu2", "sigma2", "amplitude2"];

/// Evaluate the two-component mixture density at `x`, rejecting non-positive volumes.
///
/// There is no interaction term, this is exactly the sum of the two component densities.
pub fn mixture_pdf(x: f64, params: &MixtureParameters) -> Result<f64, DomainError> {
    let a = &params.first;
    let b = &params.second;
    Ok(log_normal_pdf(x, a.mu, a.sigma, a.amplitude)?
        + log_normal_pdf(x, b.mu, b.sigma, b.amplitude)?)
}

/// The parameters of a two-component log-normal mixture.
///
/// `first` is the primary component, expected to elute before `second`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MixtureParameters {
    pub first: LogNormalPeakShape,
    pub second: LogNormalPeakShape,
}

impl Default for MixtureParameters {
    /// The standard starting point for fitting
    fn default() -> Self {
        Self::new(-1.2, 0.2, 2.0, -0.5, 0.2, 7.0)
    }
}

impl MixtureParameters {
    pub fn new(mu1: f64, sigma1: f64, a1: f64, mu2: f64, sigma2: f64, a2: f64) -> Self {
        Self {
            first: LogNormalPeakShape::new(mu1, sigma1, a1),
            second: LogNormalPeakShape::new(mu2, sigma2, a2),
        }
    }

    pub fn from_components(first: LogNormalPeakShape, second: LogNormalPeakShape) -> Self {
        Self { first, second }
    }

    pub fn from_array(values: [f64; N_PARAMS]) -> Self {
        Self::new(
            values[0], values[1], values[2], values[3], values[4], values[5],
        )
    }

    pub fn to_array(&self) -> [f64; N_PARAMS] {
        [
            self.first.mu,
            self.first.sigma,
            self.first.amplitude,
            self.second.mu,
            self.second.sigma,
            self.second.amplitude,
        ]
    }

    /// Compute the combined theoretical signal at a specified volume, clamping
    /// non-positive volumes
    #[inline]
    pub fn density(&self, x: f64) -> f64 {
        self.first.density(x) + self.second.density(x)
    }

    /// The partial derivatives of [`MixtureParameters::density`] in [`MixtureParameters::to_array`] order
    #[inline]
    pub fn jacobian(&self, x: f64) -> [f64; N_PARAMS] {
        let [a0, a1, a2] = self.first.jacobian(x);
        let [b0, b1, b2] = self.second.jacobian(x);
        [a0, a1, a2, b0, b1, b2]
    }

    /// Given a volume sequence, produce the complementary sequence of theoretical signal
    pub fn predict(&self, volumes: &[f64]) -> Vec<f64> {
        volumes.iter().map(|x| self.density(*x)).collect()
    }

    /// The observed signal minus the model signal at each point of `trace`
    pub fn residuals(&self, trace: &ElutionTrace) -> Vec<f64> {
        trace.iter().map(|(x, y)| y - self.density(x)).collect()
    }

    pub fn sum_squared_residuals(&self, trace: &ElutionTrace) -> f64 {
        trace.iter().map(|(x, y)| (y - self.density(x)).powi(2)).sum()
    }

    /// Whether the primary component is located before the secondary one
    pub fn is_ordered(&self) -> bool {
        self.first.mu < self.second.mu
    }

    /// The area of each component between `lo` and `hi`
    pub fn component_areas(&self, lo: f64, hi: f64) -> (f64, f64) {
        (
            self.first.area_between(lo, hi),
            self.second.area_between(lo, hi),
        )
    }

    /// The share of the modeled area between `lo` and `hi` owned by the primary component
    pub fn area_purity(&self, lo: f64, hi: f64) -> Option<f64> {
        let (a, b) = self.component_areas(lo, hi);
        let total = a + b;
        if total > 0.0 {
            Some(a / total)
        } else {
            None
        }
    }
}
