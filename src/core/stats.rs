//! NaN-aware summary statistics

use num_traits::{Float, NumCast};

/// Arithmetic mean of the non-NaN values, NaN if there are none
pub fn nan_mean<T: Float>(values: &[T]) -> T {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((T::zero(), 0usize), |(sum, count), &v| (sum + v, count + 1));
    if count == 0 {
        return T::nan();
    }
    sum / <T as NumCast>::from(count).unwrap_or_else(T::nan)
}

/// Population standard deviation (divide by N) of the non-NaN values
pub fn nan_pstdev<T: Float>(values: &[T]) -> T {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return mean;
    }
    let (sum_sq, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((T::zero(), 0usize), |(acc, count), &v| {
            let d = v - mean;
            (acc + d * d, count + 1)
        });
    (sum_sq / <T as NumCast>::from(count).unwrap_or_else(T::nan)).sqrt()
}

/// Largest non-NaN value, NaN if there are none
pub fn nan_max<T: Float>(values: &[T]) -> T {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .fold(T::nan(), |acc, &v| if acc.is_nan() || v > acc { v } else { acc })
}
