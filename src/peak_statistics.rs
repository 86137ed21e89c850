//! Peak width estimation for densely sampled curves.
//!
//! Widths are measured at half of the apex height. The crossing points on
//! either side of the apex are located by walking away from the apex until the
//! signal drops below the half-maximum level and then linearly interpolating
//! between the two samples that bracket the crossing.
use num_traits::{Float, FromPrimitive};

use crate::arrayops::argmax;

pub fn _isclose<T>(x: T, y: T, rtol: T, atol: T) -> bool
where
    T: Float,
{
    (x - y).abs() <= (atol + rtol * y.abs())
}

pub fn isclose<T>(x: T, y: T) -> bool
where
    T: Float + FromPrimitive,
{
    match (T::from_f64(1e-5), T::from_f64(1e-8)) {
        (Some(rtol), Some(atol)) => _isclose(x, y, rtol, atol),
        _ => x == y,
    }
}

pub fn aboutzero<T>(x: T) -> bool
where
    T: Float + FromPrimitive,
{
    isclose(x, T::zero())
}

/// The result of measuring a peak's width at half maximum
#[derive(Default, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WidthFit {
    /// The interpolated coordinate where the rising side crosses half maximum
    pub left_crossing: f64,
    /// The interpolated coordinate where the falling side crosses half maximum
    pub right_crossing: f64,
    /// Distance from the rising side crossing to the apex
    pub left_width: f64,
    /// Distance from the apex to the falling side crossing
    pub right_width: f64,
    pub full_width_at_half_max: f64,
}

/// Locate the half-maximum crossing on the rising (left) side of the apex at `index`.
///
/// Returns `None` if the signal never drops below `level` before the start of the array.
pub fn rising_side_crossing<T: Float>(x: &[T], y: &[T], index: usize, level: T) -> Option<T> {
    let index = index.min(x.len().min(y.len()).checked_sub(1)?);
    for i in (1..=index).rev() {
        let y0 = y[i - 1];
        if y0 < level {
            let y1 = y[i];
            let (x0, x1) = (x[i - 1], x[i]);
            return Some(x0 + (x1 - x0) * ((level - y0) / (y1 - y0)));
        }
    }
    None
}

/// Locate the half-maximum crossing on the falling (right) side of the apex at `index`.
///
/// Returns `None` if the signal never drops below `level` before the end of the array.
pub fn falling_side_crossing<T: Float>(x: &[T], y: &[T], index: usize, level: T) -> Option<T> {
    let n = x.len().min(y.len());
    for i in index..n.saturating_sub(1) {
        let y1 = y[i + 1];
        if y1 < level {
            let y0 = y[i];
            let (x0, x1) = (x[i], x[i + 1]);
            return Some(x0 + (x1 - x0) * ((y0 - level) / (y0 - y1)));
        }
    }
    None
}

/// Measure the full width at half maximum of the peak whose apex is at `data_index`.
pub fn full_width_at_half_max(x: &[f64], y: &[f64], data_index: usize) -> Option<WidthFit> {
    let peak = *y.get(data_index)?;
    if !peak.is_finite() || peak <= 0.0 || aboutzero(peak) {
        return None;
    }
    let apex = *x.get(data_index)?;
    let half = peak / 2.0;

    let left_crossing = rising_side_crossing(x, y, data_index, half)?;
    let right_crossing = falling_side_crossing(x, y, data_index, half)?;

    Some(WidthFit {
        left_crossing,
        right_crossing,
        left_width: apex - left_crossing,
        right_width: right_crossing - apex,
        full_width_at_half_max: right_crossing - left_crossing,
    })
}

/// Locate the apex of `y` and measure its width at half maximum
pub fn peak_width(x: &[f64], y: &[f64]) -> Option<WidthFit> {
    if x.len() != y.len() {
        return None;
    }
    let index = argmax(y)?;
    full_width_at_half_max(x, y, index)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arrayops::linspace;

    #[test]
    fn test_triangle_width() {
        let x = linspace(0.0, 4.0, 401);
        let y: Vec<f64> = x.iter().map(|t| (2.0 - (t - 2.0).abs()).max(0.0)).collect();
        let fit = peak_width(&x, &y).unwrap();
        assert!((fit.left_crossing - 1.0).abs() < 1e-9, "{fit:?}");
        assert!((fit.right_crossing - 3.0).abs() < 1e-9, "{fit:?}");
        assert!((fit.full_width_at_half_max - 2.0).abs() < 1e-9);
        assert!((fit.left_width - fit.right_width).abs() < 1e-9);
    }

    #[test]
    fn test_gaussian_width() {
        let sigma = 0.3;
        let x = linspace(-3.0, 3.0, 6001);
        let y: Vec<f64> = x.iter().map(|t| (-0.5 * (t / sigma).powi(2)).exp()).collect();
        let fit = peak_width(&x, &y).unwrap();
        let expected = 2.0 * (2.0 * 2f64.ln()).sqrt() * sigma;
        assert!((fit.full_width_at_half_max - expected).abs() < 1e-5);
    }

    #[test]
    fn test_truncated_peak_has_no_width() {
        let x = linspace(0.0, 1.0, 11);
        // Rising the whole way, never crosses half maximum on the right
        let y: Vec<f64> = x.iter().map(|t| t * t).collect();
        assert!(peak_width(&x, &y).is_none());

        let flat = vec![0.0; 11];
        assert!(peak_width(&x, &flat).is_none());
    }

    #[test]
    fn test_apex_outside_coordinates() {
        let x = linspace(0.0, 6.0, 7);
        let y = [0.0, 1.0, 2.0, 4.0, 8.0, 4.0, 0.0];
        let fit = full_width_at_half_max(&x, &y, 4).unwrap();
        assert!((fit.full_width_at_half_max - 2.0).abs() < 1e-9, "{fit:?}");
        // The apex index must exist on both axes
        assert!(full_width_at_half_max(&x[..3], &y, 4).is_none());
        assert!(full_width_at_half_max(&x, &y, 7).is_none());
    }
}
