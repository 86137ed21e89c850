use num_traits::Float;

/// Find the index of the value in the ascending `vec` nearest to `target_val`.
///
/// NaN entries sort after every finite value and are never returned unless
/// `vec` contains nothing else.
pub fn nearest<T: Float>(vec: &[T], target_val: T) -> Option<usize> {
    let n = vec.len().checked_sub(1)?;
    let near = binsearch(vec, target_val);
    if near > n {
        return Some(n);
    }
    if near == 0 {
        return Some(0);
    }
    let below = vec[near - 1];
    let above = vec[near];
    if (target_val - below).abs() <= (above - target_val).abs() || above.is_nan() {
        Some(near - 1)
    } else {
        Some(near)
    }
}

/// Find the insertion point for `q` in the ascending `array`
pub fn binsearch<T: Float>(array: &[T], q: T) -> usize {
    array.partition_point(|x| *x < q)
}
