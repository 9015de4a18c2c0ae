//! Log-domain helpers for mixture densities.

/// ln(2*pi).
pub const LOG_2PI: f64 = 1.837_877_066_409_345_5;

/// log(sum(exp(values))) shifted by the maximum.
///
/// Empty input, or input that is entirely -inf, gives -inf. Any NaN gives
/// NaN.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        if v.is_nan() {
            return f64::NAN;
        }
        max = max.max(v);
    }
    if max.is_infinite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Shift log-weights so they exponentiate to a probability vector and
/// return the shift. Non-finite totals leave `values` untouched.
pub fn log_normalize(values: &mut [f64]) -> f64 {
    let norm = log_sum_exp(values);
    if norm.is_finite() {
        values.iter_mut().for_each(|v| *v -= norm);
    }
    norm
}
