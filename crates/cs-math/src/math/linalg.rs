//! Symmetric linear algebra: Cholesky factorisation and Jacobi
//! eigendecomposition.
//!
//! Both routines only ever see covariance-shaped inputs (symmetric, small,
//! dense), which is why a cyclic Jacobi sweep is enough for the eigen
//! problem.

use crate::math::matrix::Matrix;
use thiserror::Error;

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOL: f64 = 1e-14;

/// Errors raised by factorisations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinalgError {
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("matrix is not positive definite (pivot {pivot} = {value})")]
    NotPositiveDefinite { pivot: usize, value: f64 },
    #[error("matrix contains non-finite entries")]
    NonFinite,
    #[error("eigendecomposition did not converge after {sweeps} sweeps")]
    NoConvergence { sweeps: usize },
}

fn check_square(a: &Matrix) -> Result<usize, LinalgError> {
    if a.rows() != a.cols() {
        return Err(LinalgError::NotSquare {
            rows: a.rows(),
            cols: a.cols(),
        });
    }
    if !a.all_finite() {
        return Err(LinalgError::NonFinite);
    }
    Ok(a.rows())
}

/// Lower-triangular Cholesky factor `L` with `A = L L^T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cholesky {
    lower: Matrix,
}

impl Cholesky {
    /// Factor a symmetric positive-definite matrix.
    pub fn factor(a: &Matrix) -> Result<Self, LinalgError> {
        let n = check_square(a)?;
        let mut l = Matrix::zeros(n, n);
        for j in 0..n {
            let mut diag = a.get(j, j);
            for k in 0..j {
                diag -= l.get(j, k) * l.get(j, k);
            }
            if diag <= 0.0 || !diag.is_finite() {
                return Err(LinalgError::NotPositiveDefinite {
                    pivot: j,
                    value: diag,
                });
            }
            let ljj = diag.sqrt();
            l.set(j, j, ljj);
            for i in (j + 1)..n {
                let mut s = a.get(i, j);
                for k in 0..j {
                    s -= l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, s / ljj);
            }
        }
        Ok(Self { lower: l })
    }

    pub fn lower(&self) -> &Matrix {
        &self.lower
    }

    pub fn dim(&self) -> usize {
        self.lower.rows()
    }

    /// log |A| = 2 * sum(log diag L).
    pub fn log_det(&self) -> f64 {
        2.0 * (0..self.dim())
            .map(|i| self.lower.get(i, i).ln())
            .sum::<f64>()
    }

    /// Solve `L y = b` by forward substitution.
    pub fn solve_lower(&self, b: &[f64]) -> Vec<f64> {
        let n = self.dim();
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut s = b[i];
            for (k, yk) in y.iter().enumerate().take(i) {
                s -= self.lower.get(i, k) * yk;
            }
            y[i] = s / self.lower.get(i, i);
        }
        y
    }

    /// Squared Mahalanobis norm `diff^T A^-1 diff`.
    pub fn mahalanobis_sq(&self, diff: &[f64]) -> f64 {
        self.solve_lower(diff).iter().map(|v| v * v).sum()
    }
}

/// Eigenpairs of a symmetric matrix, sorted by descending eigenvalue.
///
/// `vectors` stores eigenvectors as columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricEigen {
    pub values: Vec<f64>,
    pub vectors: Matrix,
}

impl SymmetricEigen {
    /// Flip each eigenvector so its largest-magnitude loading is positive.
    ///
    /// Eigenvectors are only defined up to sign; fixing it makes projections
    /// reproducible.
    pub fn with_canonical_signs(mut self) -> Self {
        let n = self.vectors.rows();
        for c in 0..self.vectors.cols() {
            let mut pivot = 0.0f64;
            for r in 0..n {
                let v = self.vectors.get(r, c);
                if v.abs() > pivot.abs() {
                    pivot = v;
                }
            }
            if pivot < 0.0 {
                for r in 0..n {
                    let v = self.vectors.get(r, c);
                    self.vectors.set(r, c, -v);
                }
            }
        }
        self
    }

    /// Column `k` of the eigenvector matrix.
    pub fn vector(&self, k: usize) -> Vec<f64> {
        self.vectors.column(k)
    }
}

/// Cyclic Jacobi eigendecomposition of a symmetric matrix.
pub fn symmetric_eigen(a: &Matrix) -> Result<SymmetricEigen, LinalgError> {
    let n = check_square(a)?;
    let mut m = a.clone();
    let mut v = Matrix::identity(n);

    let frob: f64 = m.as_slice().iter().map(|x| x * x).sum::<f64>().sqrt();
    let mut converged = n < 2 || frob == 0.0;
    let mut sweep = 0;

    while !converged && sweep < JACOBI_MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += m.get(p, q) * m.get(p, q);
            }
        }
        if off.sqrt() <= JACOBI_TOL * frob {
            converged = true;
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m.get(p, q);
                if apq == 0.0 {
                    continue;
                }
                let app = m.get(p, p);
                let aqq = m.get(q, q);
                let theta = (aqq - app) / (2.0 * apq);
                let t = if theta == 0.0 {
                    1.0
                } else {
                    theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = m.get(k, p);
                    let akq = m.get(k, q);
                    m.set(k, p, c * akp - s * akq);
                    m.set(k, q, s * akp + c * akq);
                }
                for k in 0..n {
                    let apk = m.get(p, k);
                    let aqk = m.get(q, k);
                    m.set(p, k, c * apk - s * aqk);
                    m.set(q, k, s * apk + c * aqk);
                }
                for k in 0..n {
                    let vkp = v.get(k, p);
                    let vkq = v.get(k, q);
                    v.set(k, p, c * vkp - s * vkq);
                    v.set(k, q, s * vkp + c * vkq);
                }
            }
        }
        sweep += 1;
    }

    if !converged {
        return Err(LinalgError::NoConvergence {
            sweeps: JACOBI_MAX_SWEEPS,
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m.get(j, j).total_cmp(&m.get(i, i)).then(i.cmp(&j)));

    let values = order.iter().map(|&i| m.get(i, i)).collect();
    let vectors = v.select_columns(&order);
    Ok(SymmetricEigen { values, vectors })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd() -> Matrix {
        Matrix::from_rows(&[
            vec![4.0, 12.0, -16.0],
            vec![12.0, 37.0, -43.0],
            vec![-16.0, -43.0, 98.0],
        ])
        .unwrap()
    }

    #[test]
    fn cholesky_known_factor() {
        let chol = Cholesky::factor(&spd()).unwrap();
        let l = chol.lower();
        let expected = [
            [2.0, 0.0, 0.0],
            [6.0, 1.0, 0.0],
            [-8.0, 5.0, 3.0],
        ];
        for (i, row) in expected.iter().enumerate() {
            for (j, want) in row.iter().enumerate() {
                assert!((l.get(i, j) - want).abs() < 1e-12);
            }
        }
        // det = (2*1*3)^2 = 36
        assert!((chol.log_det() - 36.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn cholesky_rejects_indefinite() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap();
        assert!(matches!(
            Cholesky::factor(&a),
            Err(LinalgError::NotPositiveDefinite { pivot: 1, .. })
        ));
    }

    #[test]
    fn cholesky_rejects_non_square() {
        let a = Matrix::zeros(2, 3);
        assert!(matches!(
            Cholesky::factor(&a),
            Err(LinalgError::NotSquare { .. })
        ));
    }

    #[test]
    fn mahalanobis_identity_is_euclidean() {
        let chol = Cholesky::factor(&Matrix::identity(3)).unwrap();
        assert!((chol.mahalanobis_sq(&[1.0, 2.0, 2.0]) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn eigen_diagonal_sorted_descending() {
        let a = Matrix::from_rows(&[
            vec![1.0, 0.0, 0.0],
            vec![0.0, 5.0, 0.0],
            vec![0.0, 0.0, 3.0],
        ])
        .unwrap();
        let eig = symmetric_eigen(&a).unwrap();
        assert_eq!(eig.values, vec![5.0, 3.0, 1.0]);
        assert_eq!(eig.vector(0), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn eigen_two_by_two() {
        let a = Matrix::from_rows(&[vec![2.0, 1.0], vec![1.0, 2.0]]).unwrap();
        let eig = symmetric_eigen(&a).unwrap().with_canonical_signs();
        assert!((eig.values[0] - 3.0).abs() < 1e-12);
        assert!((eig.values[1] - 1.0).abs() < 1e-12);
        let v0 = eig.vector(0);
        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert!((v0[0] - h).abs() < 1e-12 && (v0[1] - h).abs() < 1e-12);
    }

    #[test]
    fn eigen_reconstructs_av_equals_lambda_v() {
        let a = spd();
        let eig = symmetric_eigen(&a).unwrap();
        for k in 0..3 {
            let v = eig.vector(k);
            let av = a.mul_vec(&v).unwrap();
            for i in 0..3 {
                assert!((av[i] - eig.values[k] * v[i]).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn canonical_signs_make_pivot_positive() {
        let a = Matrix::from_rows(&[vec![2.0, -1.0], vec![-1.0, 2.0]]).unwrap();
        let eig = symmetric_eigen(&a).unwrap().with_canonical_signs();
        for k in 0..2 {
            let v = eig.vector(k);
            let pivot = v.iter().copied().fold(0.0f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
            assert!(pivot > 0.0);
        }
    }

    #[test]
    fn zero_matrix_has_zero_eigenvalues() {
        let eig = symmetric_eigen(&Matrix::zeros(3, 3)).unwrap();
        assert_eq!(eig.values, vec![0.0, 0.0, 0.0]);
    }
}
