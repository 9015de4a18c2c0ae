//! Dense row-major matrix.
//!
//! Sized for the feature matrices this workspace handles (thousands of rows,
//! tens of columns). No BLAS, no SIMD: correctness and determinism first.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shape errors raised by matrix construction and arithmetic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("data length {len} does not match shape {rows}x{cols}")]
    DataLength { rows: usize, cols: usize, len: usize },
    #[error("ragged rows: row {row} has {actual} columns, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("incompatible shapes {left:?} and {right:?}")]
    Incompatible {
        left: (usize, usize),
        right: (usize, usize),
    },
}

/// Row-major dense matrix of `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Build from a flat row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, ShapeError> {
        if data.len() != rows * cols {
            return Err(ShapeError::DataLength {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from a slice of equally sized rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ShapeError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(ShapeError::Ragged {
                    row: i,
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Build from column vectors of equal length.
    pub fn from_columns(columns: &[Vec<f64>]) -> Result<Self, ShapeError> {
        let cols = columns.len();
        let rows = columns.first().map(Vec::len).unwrap_or(0);
        let mut m = Self::zeros(rows, cols);
        for (j, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(ShapeError::Ragged {
                    row: j,
                    expected: rows,
                    actual: column.len(),
                });
            }
            for (i, v) in column.iter().enumerate() {
                m.set(i, j, *v);
            }
        }
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics, and a zero-width matrix has no row data anyway.
        let width = self.cols.max(1);
        self.data.chunks_exact(width).take(self.rows)
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                t.set(c, r, self.get(r, c));
            }
        }
        t
    }

    pub fn matmul(&self, other: &Matrix) -> Result<Matrix, ShapeError> {
        if self.cols != other.rows {
            return Err(ShapeError::Incompatible {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(i, k);
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    let idx = i * other.cols + j;
                    out.data[idx] += a * other.get(k, j);
                }
            }
        }
        Ok(out)
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, v: &[f64]) -> Result<Vec<f64>, ShapeError> {
        if v.len() != self.cols {
            return Err(ShapeError::Incompatible {
                left: self.shape(),
                right: (v.len(), 1),
            });
        }
        Ok(self
            .iter_rows()
            .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
            .collect())
    }

    /// New matrix holding the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// New matrix holding the given columns, in the given order.
    pub fn select_columns(&self, indices: &[usize]) -> Matrix {
        let mut out = Matrix::zeros(self.rows, indices.len());
        for r in 0..self.rows {
            for (j, &c) in indices.iter().enumerate() {
                out.set(r, j, self.get(r, c));
            }
        }
        out
    }

    /// Sample covariance of the columns (divisor `n - 1`) around `means`.
    pub fn covariance(&self, means: &[f64]) -> Matrix {
        let d = self.cols;
        let mut cov = Matrix::zeros(d, d);
        for row in self.iter_rows() {
            for i in 0..d {
                let di = row[i] - means[i];
                for j in i..d {
                    let idx = i * d + j;
                    cov.data[idx] += di * (row[j] - means[j]);
                }
            }
        }
        let denom = (self.rows.saturating_sub(1)).max(1) as f64;
        for i in 0..d {
            for j in i..d {
                let v = cov.get(i, j) / denom;
                cov.set(i, j, v);
                cov.set(j, i, v);
            }
        }
        cov
    }

    /// Column means over all rows (no NaN handling).
    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.cols];
        for row in self.iter_rows() {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        let n = self.rows.max(1) as f64;
        for m in means.iter_mut() {
            *m /= n;
        }
        means
    }

    pub fn count_nan(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Add `value` to every diagonal entry.
    pub fn add_diagonal(&mut self, value: f64) {
        for i in 0..self.rows.min(self.cols) {
            let idx = i * self.cols + i;
            self.data[idx] += value;
        }
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.iter_rows().map(<[f64]>::to_vec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_rejects_ragged() {
        let err = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, ShapeError::Ragged { row: 1, .. }));
    }

    #[test]
    fn from_columns_matches_from_rows() {
        let a = Matrix::from_columns(&[vec![1.0, 3.0], vec![2.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn matmul_identity() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let out = a.matmul(&Matrix::identity(2)).unwrap();
        assert_eq!(out, a);
    }

    #[test]
    fn matmul_shape_mismatch() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        assert!(a.matmul(&b).is_err());
    }

    #[test]
    fn transpose_roundtrip() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let t = a.transpose();
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.get(2, 1), 6.0);
        assert_eq!(t.transpose(), a);
    }

    #[test]
    fn covariance_of_perfectly_correlated_columns() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0], vec![3.0, 6.0]]).unwrap();
        let means = a.column_means();
        assert_eq!(means, vec![2.0, 4.0]);
        let cov = a.covariance(&means);
        assert!((cov.get(0, 0) - 1.0).abs() < 1e-12);
        assert!((cov.get(0, 1) - 2.0).abs() < 1e-12);
        assert!((cov.get(1, 1) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn select_rows_and_columns() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let r = a.select_rows(&[2, 0]);
        assert_eq!(r.to_rows(), vec![vec![5.0, 6.0], vec![1.0, 2.0]]);
        let c = a.select_columns(&[1]);
        assert_eq!(c.column(0), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn zero_width_matrix_has_no_rows_to_iterate() {
        let a = Matrix::zeros(3, 0);
        assert_eq!(a.iter_rows().count(), 0);
    }
}
