use std::{borrow::Cow, iter::FusedIterator};

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::argmax;

/// All the ways an elution trace can be rejected before fitting
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    #[error("The trace contains no points")]
    Empty,
    #[error("The volume array ({volume}) and signal array ({signal}) do not match in length")]
    LengthMismatch { volume: usize, signal: usize },
    #[error("Volume {value} at index {index} is not positive")]
    NonPositiveVolume { index: usize, value: f64 },
    #[error("Volume at index {index} is not strictly greater than its predecessor")]
    NotIncreasing { index: usize },
    #[error("Signal at index {index} is not finite")]
    NonFiniteSignal { index: usize },
}

/// Check that `volume` is non-empty, finite, positive and strictly increasing
pub fn validate_volume(volume: &[f64]) -> Result<(), TraceError> {
    if volume.is_empty() {
        return Err(TraceError::Empty);
    }
    for (index, value) in volume.iter().copied().enumerate() {
        if !(value > 0.0) || !value.is_finite() {
            return Err(TraceError::NonPositiveVolume { index, value });
        }
        if index > 0 && !(value > volume[index - 1]) {
            return Err(TraceError::NotIncreasing { index });
        }
    }
    Ok(())
}

/// An iterator over the `(volume, signal)` pairs of an [`ElutionTrace`]
pub struct ElutionTraceIter<'a> {
    inner: std::iter::Zip<
        std::iter::Copied<std::slice::Iter<'a, f64>>,
        std::iter::Copied<std::slice::Iter<'a, f64>>,
    >,
}

impl<'a> Iterator for ElutionTraceIter<'a> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a> FusedIterator for ElutionTraceIter<'a> {}

impl<'a> ExactSizeIterator for ElutionTraceIter<'a> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// A single sample's signal over elution volume.
///
/// Construction validates the arrays, so a trace in hand always has at least
/// one point, positive strictly increasing volumes and finite signal.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElutionTrace<'a> {
    volume: Cow<'a, [f64]>,
    signal: Cow<'a, [f64]>,
}

impl<'a> ElutionTrace<'a> {
    pub fn new(volume: Cow<'a, [f64]>, signal: Cow<'a, [f64]>) -> Result<Self, TraceError> {
        if volume.len() != signal.len() {
            return Err(TraceError::LengthMismatch {
                volume: volume.len(),
                signal: signal.len(),
            });
        }
        validate_volume(&volume)?;
        if let Some(index) = signal.iter().position(|y| !y.is_finite()) {
            return Err(TraceError::NonFiniteSignal { index });
        }
        Ok(Self { volume, signal })
    }

    pub fn volume(&self) -> &[f64] {
        &self.volume
    }

    pub fn signal(&self) -> &[f64] {
        &self.signal
    }

    pub fn len(&self) -> usize {
        self.volume.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volume.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<(f64, f64)> {
        Some((*self.volume.get(index)?, *self.signal.get(index)?))
    }

    pub fn iter(&self) -> ElutionTraceIter<'_> {
        ElutionTraceIter {
            inner: self
                .volume
                .iter()
                .copied()
                .zip(self.signal.iter().copied()),
        }
    }

    /// The index of the most intense point
    pub fn argmax(&self) -> usize {
        argmax(&self.signal).unwrap_or_default()
    }

    /// The volume spanned from the first to the last point
    pub fn duration(&self) -> f64 {
        match (self.volume.first(), self.volume.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// The sum of the squared signal
    pub fn energy(&self) -> f64 {
        self.signal.iter().map(|y| y * y).sum()
    }

    /// Create a view of this trace that borrows its arrays
    pub fn borrow(&self) -> ElutionTrace<'_> {
        ElutionTrace {
            volume: Cow::Borrowed(&self.volume[..]),
            signal: Cow::Borrowed(&self.signal[..]),
        }
    }

    pub fn into_owned(self) -> ElutionTrace<'static> {
        ElutionTrace {
            volume: Cow::Owned(self.volume.into_owned()),
            signal: Cow::Owned(self.signal.into_owned()),
        }
    }

    /// Build a trace from a volume axis with partially measured signal, keeping
    /// only the measured, finite points.
    pub fn from_measured(volume: &[f64], signal: &[Option<f64>]) -> Result<ElutionTrace<'static>, TraceError> {
        if volume.len() != signal.len() {
            return Err(TraceError::LengthMismatch {
                volume: volume.len(),
                signal: signal.len(),
            });
        }
        let (xs, ys): (Vec<f64>, Vec<f64>) = volume
            .iter()
            .copied()
            .zip(signal.iter().copied())
            .filter_map(|(x, y)| y.filter(|y| y.is_finite()).map(|y| (x, y)))
            .unzip();
        ElutionTrace::new(Cow::Owned(xs), Cow::Owned(ys))
    }
}

impl<'a> TryFrom<(&'a [f64], &'a [f64])> for ElutionTrace<'a> {
    type Error = TraceError;

    fn try_from((volume, signal): (&'a [f64], &'a [f64])) -> Result<Self, Self::Error> {
        Self::new(Cow::Borrowed(volume), Cow::Borrowed(signal))
    }
}

impl TryFrom<(Vec<f64>, Vec<f64>)> for ElutionTrace<'static> {
    type Error = TraceError;

    fn try_from((volume, signal): (Vec<f64>, Vec<f64>)) -> Result<Self, Self::Error> {
        Self::new(Cow::Owned(volume), Cow::Owned(signal))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn trace(xs: Vec<f64>, ys: Vec<f64>) -> Result<ElutionTrace<'static>, TraceError> {
        ElutionTrace::try_from((xs, ys))
    }

    #[test]
    fn test_validation() {
        assert_eq!(trace(vec![], vec![]).unwrap_err(), TraceError::Empty);

        assert_eq!(
            trace(vec![0.1, 0.2], vec![1.0]).unwrap_err(),
            TraceError::LengthMismatch { volume: 2, signal: 1 }
        );
        assert_eq!(
            trace(vec![0.0, 0.2], vec![1.0, 1.0]).unwrap_err(),
            TraceError::NonPositiveVolume { index: 0, value: 0.0 }
        );
        assert_eq!(
            trace(vec![0.1, 0.3, 0.3], vec![1.0, 1.0, 2.0]).unwrap_err(),
            TraceError::NotIncreasing { index: 2 }
        );
        assert_eq!(
            trace(vec![0.1, 0.3], vec![1.0, f64::NAN]).unwrap_err(),
            TraceError::NonFiniteSignal { index: 1 }
        );
    }

    #[test]
    fn test_from_measured_skips_missing() {
        let volume = [0.1, 0.2, 0.3, 0.4];
        let signal = [Some(1.0), None, Some(f64::NAN), Some(4.0)];
        let trace = ElutionTrace::from_measured(&volume, &signal).unwrap();
        assert_eq!(trace.volume(), &[0.1, 0.4]);
        assert_eq!(trace.signal(), &[1.0, 4.0]);

        let err = ElutionTrace::from_measured(&volume, &[None, None, None, None]).unwrap_err();
        assert_eq!(err, TraceError::Empty);
    }

    #[test]
    fn test_accessors() {
        let xs: [f64; 3] = [0.1, 0.2, 0.3];
        let ys: [f64; 3] = [1.0, 3.0, 2.0];
        let trace = ElutionTrace::try_from((&xs[..], &ys[..])).unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.argmax(), 1);
        assert!((trace.duration() - 0.2).abs() < 1e-12);
        assert_eq!(trace.get(2), Some((0.3, 2.0)));
        assert_eq!(trace.iter().len(), 3);
        assert_eq!(trace.energy(), 14.0);
        let owned = trace.borrow().into_owned();
        assert_eq!(owned, trace);
    }
}
