//! Per-column standardization fit on the batch it transforms.

use cs_math::{nan_mean, nan_variance, Matrix};
use serde::{Deserialize, Serialize};

/// Column centering and scaling parameters.
///
/// Columns with no observed value have no mean; they pass through as NaN
/// and are dropped by the imputer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<Option<f64>>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit means and population standard deviations, skipping NaN.
    ///
    /// A zero standard deviation scales by 1 so constant columns become 0.
    pub fn fit(x: &Matrix) -> Self {
        let mut means = Vec::with_capacity(x.cols());
        let mut scales = Vec::with_capacity(x.cols());
        for j in 0..x.cols() {
            let column = x.column(j);
            let mean = nan_mean(&column);
            let scale = mean
                .and_then(|m| nan_variance(&column, m))
                .map(f64::sqrt)
                .filter(|s| *s > 0.0 && s.is_finite())
                .unwrap_or(1.0);
            means.push(mean);
            scales.push(scale);
        }
        Self { means, scales }
    }

    pub fn transform(&self, x: &Matrix) -> Matrix {
        let mut out = x.clone();
        for i in 0..out.rows() {
            for (j, v) in out.row_mut(i).iter_mut().enumerate() {
                *v = match self.means[j] {
                    Some(m) => (*v - m) / self.scales[j],
                    None => f64::NAN,
                };
            }
        }
        out
    }

    pub fn fit_transform(x: &Matrix) -> (Self, Matrix) {
        let scaler = Self::fit(x);
        let out = scaler.transform(x);
        (scaler, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_mean_unit_variance() {
        let x = Matrix::from_rows(&[vec![1.0, 10.0], vec![2.0, 10.0], vec![3.0, 10.0]]).unwrap();
        let (scaler, z) = StandardScaler::fit_transform(&x);
        assert_eq!(scaler.means, vec![Some(2.0), Some(10.0)]);

        let col = z.column(0);
        let mean: f64 = col.iter().sum::<f64>() / 3.0;
        let var: f64 = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 3.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);

        // constant column: scale 1, centered to 0
        assert_eq!(scaler.scales[1], 1.0);
        assert_eq!(z.column(1), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_nan_skipped_and_kept() {
        let x = Matrix::from_rows(&[vec![1.0], vec![f64::NAN], vec![3.0]]).unwrap();
        let (scaler, z) = StandardScaler::fit_transform(&x);
        assert_eq!(scaler.means[0], Some(2.0));
        assert_eq!(z.get(0, 0), -1.0);
        assert!(z.get(1, 0).is_nan());
        assert_eq!(z.get(2, 0), 1.0);
    }

    #[test]
    fn test_all_missing_column() {
        let x = Matrix::from_rows(&[vec![f64::NAN, 1.0], vec![f64::NAN, 2.0]]).unwrap();
        let (scaler, z) = StandardScaler::fit_transform(&x);
        assert_eq!(scaler.means[0], None);
        assert!(z.column(0).iter().all(|v| v.is_nan()));
    }
}
