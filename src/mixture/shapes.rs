use std::f64::consts::{PI, SQRT_2};

use libm::erf;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The smallest volume the unchecked density will be evaluated at. Non-positive
/// volumes are clamped up to this value.
pub const MIN_VOLUME: f64 = 1e-12;

/// Failures evaluating the log-normal density outside of its support
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum DomainError {
    #[error("The log-normal density is undefined at non-positive volume {0}")]
    NonPositiveVolume(f64),
    #[error("The log-normal scale must be positive, got {0}")]
    NonPositiveScale(f64),
}

/// Evaluate a scaled log-normal density at `x`, rejecting arguments outside
/// of its support.
///
/// ```math
/// y = \frac{a}{x\sigma\sqrt{2\pi}}\exp\left(-\frac{(\ln x - \mu)^2}{2\sigma^2}\right)
/// ```
pub fn log_normal_pdf(x: f64, mu: f64, sigma: f64, amplitude: f64) -> Result<f64, DomainError> {
    if !(x > 0.0) {
        return Err(DomainError::NonPositiveVolume(x));
    }
    if !(sigma > 0.0) {
        return Err(DomainError::NonPositiveScale(sigma));
    }
    Ok(LogNormalPeakShape::new(mu, sigma, amplitude).density(x))
}

/// Log-normal peak shape model for a single eluting component.
///
/// `mu` and `sigma` are the location and scale of the logarithm of the elution
/// volume, and `amplitude` is the total area under the peak.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogNormalPeakShape {
    pub mu: f64,
    pub sigma: f64,
    pub amplitude: f64,
}

impl LogNormalPeakShape {
    pub fn new(mu: f64, sigma: f64, amplitude: f64) -> Self {
        Self {
            mu,
            sigma,
            amplitude,
        }
    }

    /// The unit-area density, without the amplitude factor
    #[inline]
    fn kernel(&self, x: f64) -> f64 {
        let x = x.max(MIN_VOLUME);
        let z = (x.ln() - self.mu) / self.sigma;
        (-0.5 * z * z).exp() / (x * self.sigma * (2.0 * PI).sqrt())
    }

    /// Compute the theoretical signal at a specified volume.
    ///
    /// Volumes at or below zero are clamped to [`MIN_VOLUME`] rather than rejected.
    #[inline]
    pub fn density(&self, x: f64) -> f64 {
        self.amplitude * self.kernel(x)
    }

    /// Given a volume sequence, produce the complementary sequence of theoretical signal
    pub fn predict(&self, volumes: &[f64]) -> Vec<f64> {
        volumes.iter().map(|x| self.density(*x)).collect()
    }

    /// The partial derivatives of [`LogNormalPeakShape::density`] w.r.t. `(mu, sigma, amplitude)`
    ///
    /// ```math
    /// \frac{\partial y}{\partial \mu} = y\frac{z}{\sigma} \quad
    /// \frac{\partial y}{\partial \sigma} = y\frac{z^2 - 1}{\sigma} \quad
    /// \frac{\partial y}{\partial a} = \frac{y}{a}
    /// ```
    /// where $`z = (\ln x - \mu) / \sigma`$
    #[inline]
    pub fn jacobian(&self, x: f64) -> [f64; 3] {
        let x = x.max(MIN_VOLUME);
        let z = (x.ln() - self.mu) / self.sigma;
        let k = self.kernel(x);
        let y = self.amplitude * k;
        [y * z / self.sigma, y * (z * z - 1.0) / self.sigma, k]
    }

    /// The volume at which the density peaks, $`e^{\mu - \sigma^2}`$
    pub fn mode(&self) -> f64 {
        (self.mu - self.sigma.powi(2)).exp()
    }

    /// The cumulative fraction of the component's area eluted by volume `x`
    pub fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        0.5 * (1.0 + erf((x.ln() - self.mu) / (self.sigma * SQRT_2)))
    }

    /// The area under the peak between volumes `lo` and `hi`
    pub fn area_between(&self, lo: f64, hi: f64) -> f64 {
        self.amplitude * (self.cdf(hi) - self.cdf(lo))
    }
}
