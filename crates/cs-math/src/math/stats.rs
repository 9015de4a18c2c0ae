//! NaN-aware summary statistics.
//!
//! Missing values are carried as `f64::NAN` throughout the pipeline, so every
//! column statistic here skips them instead of propagating.

/// Mean of the non-NaN values, or `None` if there are none.
pub fn nan_mean(values: &[f64]) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values.iter().filter(|v| !v.is_nan()) {
        sum += v;
        n += 1;
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Population variance (ddof = 0) of the non-NaN values around `mean`.
pub fn nan_variance(values: &[f64], mean: f64) -> Option<f64> {
    let mut acc = 0.0;
    let mut n = 0usize;
    for v in values.iter().filter(|v| !v.is_nan()) {
        let d = v - mean;
        acc += d * d;
        n += 1;
    }
    if n == 0 {
        None
    } else {
        Some(acc / n as f64)
    }
}

/// Sum of the non-NaN values. An all-NaN slice sums to zero.
pub fn nan_sum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).sum()
}

/// Number of NaN entries.
pub fn count_nan(values: &[f64]) -> usize {
    values.iter().filter(|v| v.is_nan()).count()
}

/// q-th percentile (0..=100) with linear interpolation between closest ranks.
///
/// Matches numpy's default `percentile` method: the position is
/// `(n - 1) * q / 100` into the sorted data. NaN inputs are ignored.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=100.0).contains(&q) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = (sorted.len() - 1) as f64 * q / 100.0;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_mean_skips_missing() {
        assert_eq!(nan_mean(&[1.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(nan_mean(&[f64::NAN, f64::NAN]), None);
        assert_eq!(nan_mean(&[]), None);
    }

    #[test]
    fn nan_variance_is_population_variance() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mean = nan_mean(&v).unwrap();
        assert_eq!(nan_variance(&v, mean), Some(4.0));
    }

    #[test]
    fn nan_sum_treats_missing_as_zero() {
        assert_eq!(nan_sum(&[1.0, f64::NAN, 2.5]), 3.5);
        assert_eq!(nan_sum(&[f64::NAN]), 0.0);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
        assert_eq!(percentile(&v, 50.0), Some(2.5));
        let p1 = percentile(&v, 1.0).unwrap();
        assert!((p1 - 1.03).abs() < 1e-12);
    }

    #[test]
    fn percentile_order_independent() {
        let a = [5.0, 1.0, 3.0, 2.0, 4.0];
        let b = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&a, 37.0), percentile(&b, 37.0));
    }

    #[test]
    fn percentile_rejects_bad_input() {
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(percentile(&[1.0], 101.0), None);
        assert_eq!(percentile(&[1.0], -0.5), None);
    }

    #[test]
    fn count_nan_counts() {
        assert_eq!(count_nan(&[f64::NAN, 1.0, f64::NAN]), 2);
    }
}
