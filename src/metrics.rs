//! Separation and purity metrics derived from a [`DenseCurve`].
//!
//! Every ratio here is undefined when its denominator is not positive. Those
//! cases are an expected outcome, e.g. a fraction with no modeled signal, and
//! are reported as `None` rather than as errors.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::argmax;
use crate::curve::DenseCurve;
use crate::peak_statistics::peak_width;

/// Measure the full width at half maximum of the tallest peak in `y`.
///
/// Returns `None` when the curve does not drop below half of its maximum on
/// both sides within the sampled range.
pub fn full_width_at_half_max(x: &[f64], y: &[f64]) -> Option<f64> {
    peak_width(x, y).map(|fit| fit.full_width_at_half_max)
}

/// The apex and width of one mixture component on the dense curve
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComponentPeak {
    /// The volume of the component's maximum
    pub apex: f64,
    pub height: f64,
    pub width: Option<f64>,
}

impl ComponentPeak {
    /// Locate the maximum of `y` over `x` and measure its width.
    pub fn measure(x: &[f64], y: &[f64]) -> Option<Self> {
        let index = argmax(y)?;
        Some(Self {
            apex: *x.get(index)?,
            height: y[index],
            width: full_width_at_half_max(x, y),
        })
    }
}

/// Compute the chromatographic resolution `2 (t2 - t1) / (w1 + w2)`.
///
/// A negative result means the second peak elutes before the first.
pub fn resolution(t1: f64, t2: f64, w1: f64, w2: f64) -> Option<f64> {
    let total_width = w1 + w2;
    if total_width > 0.0 && total_width.is_finite() {
        let rs = 2.0 * (t2 - t1) / total_width;
        rs.is_finite().then_some(rs)
    } else {
        None
    }
}

/// The resolution between the two mixture components along with the peaks it was derived from.
///
/// The resolution is always computed from the peaks and cannot be set independently.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResolutionEstimate {
    first: Option<ComponentPeak>,
    second: Option<ComponentPeak>,
    value: Option<f64>,
}

impl ResolutionEstimate {
    /// Compute the resolution between two measured component peaks
    pub fn from_peaks(first: Option<ComponentPeak>, second: Option<ComponentPeak>) -> Self {
        let value = match (first, second) {
            (
                Some(ComponentPeak {
                    apex: t1,
                    width: Some(w1),
                    ..
                }),
                Some(ComponentPeak {
                    apex: t2,
                    width: Some(w2),
                    ..
                }),
            ) => resolution(t1, t2, w1, w2),
            _ => None,
        };
        Self {
            first,
            second,
            value,
        }
    }

    pub fn first(&self) -> Option<&ComponentPeak> {
        self.first.as_ref()
    }

    pub fn second(&self) -> Option<&ComponentPeak> {
        self.second.as_ref()
    }

    /// The resolution, `None` if either component's width could not be measured
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Whether the first component's apex precedes the second's.
    ///
    /// Unmeasurable peaks count as ordered, since there is nothing to contradict.
    pub fn is_ordered(&self) -> bool {
        match (self.first, self.second) {
            (Some(a), Some(b)) => a.apex < b.apex,
            _ => true,
        }
    }
}

/// Measure both components of `curve` and the resolution between them
pub fn estimate_resolution(curve: &DenseCurve) -> ResolutionEstimate {
    let xs = curve.volumes();
    ResolutionEstimate::from_peaks(
        ComponentPeak::measure(&xs, &curve.first_component()),
        ComponentPeak::measure(&xs, &curve.second_component()),
    )
}

/// The primary component's share of `first + second`
pub fn purity(first: f64, second: f64) -> Option<f64> {
    let total = first + second;
    if total > 0.0 {
        Some(first / total)
    } else {
        None
    }
}

/// A collection interval over consecutive dense curve points.
///
/// The signal sums and the purity derived from them are read-only, a
/// `Fraction` is only produced by [`fractions`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fraction {
    /// The 1-based fraction number
    pub index: usize,
    first_sum: f64,
    second_sum: f64,
    purity: Option<f64>,
    /// The mean volume of the fraction's points, NaN for an empty fraction
    pub x_center: f64,
    /// The tallest total signal in the fraction, for placing an annotation
    pub label_y: f64,
    /// The number of curve points in the fraction
    pub points: usize,
}

impl Fraction {
    /// The sum of the primary component's signal over the fraction
    pub fn first_sum(&self) -> f64 {
        self.first_sum
    }

    /// The sum of the secondary component's signal over the fraction
    pub fn second_sum(&self) -> f64 {
        self.second_sum
    }

    /// `first_sum / (first_sum + second_sum)`, `None` when the fraction holds no signal
    pub fn purity(&self) -> Option<f64> {
        self.purity
    }

    pub fn total(&self) -> f64 {
        self.first_sum + self.second_sum
    }

    pub fn is_empty(&self) -> bool {
        self.points == 0
    }
}

/// Partition `curve` into its fractions and compute the purity of each
pub fn fractions(curve: &DenseCurve) -> Vec<Fraction> {
    curve
        .fraction_ranges()
        .into_iter()
        .enumerate()
        .map(|(k, range)| {
            let points = &curve.points[range];
            let mut first_sum = 0.0;
            let mut second_sum = 0.0;
            let mut x_sum = 0.0;
            let mut label_y = 0.0f64;
            for p in points {
                first_sum += p.first;
                second_sum += p.second;
                x_sum += p.x;
                label_y = label_y.max(p.total);
            }
            let n = points.len();
            Fraction {
                index: k + 1,
                first_sum,
                second_sum,
                purity: purity(first_sum, second_sum),
                x_center: if n > 0 { x_sum / n as f64 } else { f64::NAN },
                label_y,
                points: n,
            }
        })
        .collect()
}

/// Recombine per-fraction purities into the purity of everything collected,
/// weighting each fraction by its total signal
pub fn weighted_purity(fractions: &[Fraction]) -> Option<f64> {
    let (acc, total) = fractions
        .iter()
        .filter_map(|f| f.purity.map(|p| (p * f.total(), f.total())))
        .fold((0.0, 0.0), |(acc, total), (a, t)| (acc + a, total + t));
    if total > 0.0 {
        Some(acc / total)
    } else {
        None
    }
}

/// All metrics derived from one fitted curve
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurveMetrics {
    resolution: ResolutionEstimate,
    fractions: Vec<Fraction>,
}

impl CurveMetrics {
    pub fn compute(curve: &DenseCurve) -> Self {
        Self {
            resolution: estimate_resolution(curve),
            fractions: fractions(curve),
        }
    }

    pub fn resolution(&self) -> &ResolutionEstimate {
        &self.resolution
    }

    pub fn fractions(&self) -> &[Fraction] {
        &self.fractions
    }

    pub fn into_parts(self) -> (ResolutionEstimate, Vec<Fraction>) {
        (self.resolution, self.fractions)
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;
    use crate::curve::{CurveConfig, FractionLayout};
    use crate::mixture::MixtureParameters;
    use crate::test_data::{assert_is_close, reference_parameters};

    fn fraction_containing(fractions: &[Fraction], x: f64, curve: &DenseCurve) -> Fraction {
        let i = curve.points.iter().position(|p| p.x >= x).unwrap();
        fractions[curve.points[i].fraction - 1]
    }

    #[rstest]
    #[case(0.1, 0.2)]
    #[case(0.2, 0.3)]
    #[case(0.5, 1.0)]
    fn test_resolution_grows_with_separation(#[case] near: f64, #[case] far: f64) {
        let close = resolution(0.3, 0.3 + near, 0.1, 0.15).unwrap();
        let apart = resolution(0.3, 0.3 + far, 0.1, 0.15).unwrap();
        assert!(apart > close);
    }

    #[rstest]
    #[case(0.05, 0.1)]
    #[case(0.1, 0.4)]
    fn test_resolution_shrinks_with_width(#[case] narrow: f64, #[case] wide: f64) {
        let sharp = resolution(0.3, 0.6, narrow, narrow).unwrap();
        let broad = resolution(0.3, 0.6, wide, wide).unwrap();
        assert!(broad < sharp);
    }

    #[test]
    fn test_resolution_degenerate() {
        assert_eq!(resolution(0.3, 0.6, 0.0, 0.0), None);
        assert_eq!(resolution(0.3, 0.6, f64::INFINITY, 0.1), None);
        assert!(resolution(0.6, 0.3, 0.1, 0.1).unwrap() < 0.0);
    }

    #[test]
    fn test_reference_resolution() {
        let curve = DenseCurve::evaluate(&reference_parameters(), &CurveConfig::default());
        let estimate = estimate_resolution(&curve);
        let first = *estimate.first().unwrap();
        let second = *estimate.second().unwrap();
        // apex of a log-normal density sits at exp(mu - sigma^2)
        assert_is_close!(first.apex, (-1.2f64 - 0.04).exp(), 2e-3, "t1");
        assert_is_close!(second.apex, (-0.5f64 - 0.04).exp(), 2e-3, "t2");
        let rs = estimate.value().unwrap();
        assert!(rs.is_finite() && rs > 0.0, "{estimate:?}");
        assert!(estimate.is_ordered());
    }

    #[test]
    fn test_inverted_components() {
        let params = MixtureParameters::new(-0.5, 0.2, 7.0, -1.2, 0.2, 2.0);
        let curve = DenseCurve::evaluate(&params, &CurveConfig::default());
        let estimate = estimate_resolution(&curve);
        assert!(!estimate.is_ordered());
        assert!(estimate.value().unwrap() < 0.0);
    }

    #[test]
    fn test_fwhm_undefined_when_truncated() {
        let x = [0.1, 0.2, 0.3, 0.4];
        let y = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(full_width_at_half_max(&x, &y), None);
    }

    #[test]
    fn test_purity_isolated_component() {
        let params = MixtureParameters::new(-1.2, 0.2, 2.0, 0.3, 0.2, 7.0);
        let curve = DenseCurve::evaluate(&params, &CurveConfig::default());
        let fractions = fractions(&curve);
        let fraction = fraction_containing(&fractions, 0.3, &curve);
        assert_is_close!(fraction.purity().unwrap(), 1.0, 1e-6, "purity");
    }

    #[test]
    fn test_purity_undefined_without_signal() {
        assert_eq!(purity(0.0, 0.0), None);
        assert_eq!(purity(1.0, 3.0), Some(0.25));
    }

    #[test]
    fn test_fraction_records() {
        let config = CurveConfig::default();
        let curve = DenseCurve::evaluate(&reference_parameters(), &config);
        let fractions = fractions(&curve);
        assert_eq!(fractions.len(), config.fraction_count);
        for (k, f) in fractions.iter().enumerate() {
            assert_eq!(f.index, k + 1);
            assert_eq!(f.points, config.points_per_fraction);
            let range = curve.fraction_ranges()[k].clone();
            let xs = curve.volumes();
            assert!(f.x_center > xs[range.start] && f.x_center < xs[range.end - 1]);
            assert!(f.label_y >= 0.0);
        }
        let near_first = fraction_containing(&fractions, 0.3, &curve);
        let near_second = fraction_containing(&fractions, 0.6, &curve);
        assert!(near_first.purity().unwrap() > 0.9);
        assert!(near_second.purity().unwrap() < 0.3);
    }

    #[test]
    fn test_empty_trailing_fraction() {
        let params = reference_parameters();
        let volumes = [0.2, 0.3, 0.4];
        let curve = DenseCurve::evaluate_at(&params, &volumes, FractionLayout::new(3, 2));
        let fractions = fractions(&curve);
        assert_eq!(fractions.len(), 3);
        assert_eq!(fractions[1].points, 1);
        assert!(fractions[2].is_empty());
        assert_eq!(fractions[2].purity(), None);
        assert!(fractions[2].x_center.is_nan());
    }

    #[test]
    fn test_weighted_purity_matches_integral() {
        let curve = DenseCurve::evaluate(&reference_parameters(), &CurveConfig::default());
        let metrics = CurveMetrics::compute(&curve);
        let weighted = weighted_purity(metrics.fractions()).unwrap();
        let integrated = curve.integrated_purity().unwrap();
        assert_is_close!(weighted, integrated, 1e-3, "purity");
    }
}
