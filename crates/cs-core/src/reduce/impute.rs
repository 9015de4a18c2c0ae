//! Mean imputation.

use cs_math::{nan_mean, Matrix};

/// Column means used to fill missing cells.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanImputer {
    /// Indices of the input columns that survive (have an observed value).
    pub kept: Vec<usize>,
    pub fill: Vec<f64>,
}

impl MeanImputer {
    /// Fit fill values; columns without any observed value are marked for
    /// removal.
    pub fn fit(x: &Matrix) -> Self {
        let mut kept = Vec::new();
        let mut fill = Vec::new();
        for j in 0..x.cols() {
            if let Some(mean) = nan_mean(&x.column(j)) {
                kept.push(j);
                fill.push(mean);
            }
        }
        Self { kept, fill }
    }

    /// Indices of the columns dropped as empty.
    pub fn dropped(&self, n_cols: usize) -> Vec<usize> {
        (0..n_cols).filter(|j| !self.kept.contains(j)).collect()
    }

    /// Fill NaN with the fitted means and drop empty columns.
    pub fn transform(&self, x: &Matrix) -> Matrix {
        let mut out = x.select_columns(&self.kept);
        for i in 0..out.rows() {
            for (j, v) in out.row_mut(i).iter_mut().enumerate() {
                if v.is_nan() {
                    *v = self.fill[j];
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_with_column_mean() {
        let x = Matrix::from_rows(&[vec![1.0, f64::NAN], vec![f64::NAN, 4.0], vec![3.0, 6.0]])
            .unwrap();
        let imputer = MeanImputer::fit(&x);
        let out = imputer.transform(&x);
        assert_eq!(out.row(1), &[2.0, 4.0]);
        assert_eq!(out.row(0), &[1.0, 5.0]);
        assert_eq!(out.count_nan(), 0);
    }

    #[test]
    fn test_drops_empty_columns() {
        let x = Matrix::from_rows(&[vec![f64::NAN, 1.0], vec![f64::NAN, 2.0]]).unwrap();
        let imputer = MeanImputer::fit(&x);
        assert_eq!(imputer.kept, vec![1]);
        assert_eq!(imputer.dropped(2), vec![0]);
        assert_eq!(imputer.transform(&x).shape(), (2, 1));
    }
}
