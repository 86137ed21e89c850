use std::iter::Sum;

use num_traits::{AsPrimitive, Float};

/// Produce `count` evenly spaced values over the closed interval `[start, end]`.
///
/// Both end points are included. A single point collapses onto `start`.
pub fn linspace<T: Float>(start: T, end: T, count: usize) -> Vec<T> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = T::from(count - 1).unwrap_or_else(T::nan);
            let step = (end - start) / last;
            let mut result = Vec::with_capacity(count);
            for i in 0..count - 1 {
                result.push(start + T::from(i).unwrap_or_else(T::nan) * step);
            }
            result.push(end);
            result
        }
    }
}

/// Trapezoidal integration of `y` over `x`
pub fn trapz<
    A: Float + AsPrimitive<B> + 'static,
    B: Float + AsPrimitive<A> + 'static + Sum,
>(
    x: &[A],
    y: &[B],
) -> B {
    let n = x.len().min(y.len());
    let half = B::from(0.5).unwrap_or_else(B::nan);
    (0..n.saturating_sub(1))
        .map(|i| {
            let delta = x[i + 1] - x[i];
            delta.as_() * half * (y[i + 1] + y[i])
        })
        .sum()
}

/// The index of the largest value in `values`, skipping NaN entries.
///
/// Ties resolve to the earliest index.
pub fn argmax<T: Float>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, v) in values.iter().copied().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
