//! Variance-retaining principal component projection.

use super::ReduceError;
use cs_math::{symmetric_eigen, Matrix};
use serde::{Deserialize, Serialize};

/// Fitted projection onto the leading principal axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    /// Column means of the fitted input.
    pub means: Vec<f64>,
    /// Retained axes, one per row (`k x p`).
    pub components: Matrix,
    /// Variance along each retained axis.
    pub explained_variance: Vec<f64>,
    /// Share of total variance along each retained axis.
    pub explained_variance_ratio: Vec<f64>,
}

impl Pca {
    /// Fit on a complete (NaN-free) matrix and keep the fewest axes whose
    /// cumulative variance share exceeds `variance_retained`.
    ///
    /// `variance_retained >= 1` keeps every axis.
    pub fn fit(x: &Matrix, variance_retained: f64) -> Result<Self, ReduceError> {
        let (n, p) = x.shape();
        if n < 2 {
            return Err(ReduceError::TooFewRows { rows: n });
        }
        if p == 0 {
            return Err(ReduceError::NoColumns);
        }
        if !x.all_finite() {
            return Err(ReduceError::NonFinite);
        }

        let means = x.column_means();
        let cov = x.covariance(&means);
        let eigen = symmetric_eigen(&cov)?.with_canonical_signs();

        let variances: Vec<f64> = eigen.values.iter().map(|v| v.max(0.0)).collect();
        let total: f64 = variances.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(ReduceError::NoVariance);
        }

        let max_k = n.min(p);
        let k = retained_count(&variances, total, variance_retained).min(max_k);

        let axes: Vec<usize> = (0..k).collect();
        let components = eigen.vectors.select_columns(&axes).transpose();
        let explained_variance = variances[..k].to_vec();
        let explained_variance_ratio = explained_variance.iter().map(|v| v / total).collect();

        Ok(Self {
            means,
            components,
            explained_variance,
            explained_variance_ratio,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.rows()
    }

    pub fn cumulative_variance_ratio(&self) -> f64 {
        self.explained_variance_ratio.iter().sum()
    }

    /// Project rows onto the retained axes.
    pub fn transform(&self, x: &Matrix) -> Result<Matrix, ReduceError> {
        let mut centered = x.clone();
        for i in 0..centered.rows() {
            for (v, m) in centered.row_mut(i).iter_mut().zip(&self.means) {
                *v -= m;
            }
        }
        Ok(centered.matmul(&self.components.transpose())?)
    }
}

/// Smallest `k` whose cumulative share is strictly above `threshold`.
fn retained_count(variances: &[f64], total: f64, threshold: f64) -> usize {
    if threshold >= 1.0 {
        return variances.len();
    }
    let mut cumulative = 0.0;
    for (i, v) in variances.iter().enumerate() {
        cumulative += v / total;
        if cumulative > threshold {
            return i + 1;
        }
    }
    variances.len()
}
