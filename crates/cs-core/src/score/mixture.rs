//! Full-covariance Gaussian mixture fit by expectation-maximisation.
//!
//! Each restart seeds hard responsibilities from k-means, then alternates
//! E and M steps until the change in mean log-likelihood falls below `tol`
//! or `max_iter` is reached. The restart with the highest final
//! log-likelihood is kept.

use super::kmeans::kmeans;
use cs_math::{log_normalize, log_sum_exp, Cholesky, LinalgError, Matrix, LOG_2PI};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum FitError {
    #[error("{samples} sample(s) cannot support {components} mixture component(s)")]
    TooFewSamples { samples: usize, components: usize },

    #[error("feature matrix has no columns")]
    NoFeatures,

    #[error("feature matrix contains non-finite values")]
    NonFinite,

    #[error("component {component} has an ill-defined covariance: {source}")]
    IllDefinedCovariance {
        component: usize,
        #[source]
        source: LinalgError,
    },

    #[error("model expects {expected} feature(s), input has {found}")]
    FeatureMismatch { expected: usize, found: usize },

    #[error("invalid model: {0}")]
    InvalidModel(String),
}

/// EM controls for one fit.
#[derive(Debug, Clone, PartialEq)]
pub struct EmSettings {
    pub n_components: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub reg_covar: f64,
}

impl From<&cs_config::MixtureConfig> for EmSettings {
    fn from(c: &cs_config::MixtureConfig) -> Self {
        Self {
            n_components: c.n_components,
            n_init: c.n_init,
            max_iter: c.max_iter,
            tol: c.tol,
            reg_covar: c.reg_covar,
        }
    }
}

/// Outcome of one restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartOutcome {
    pub restart: usize,
    pub lower_bound: f64,
    pub n_iter: usize,
    pub converged: bool,
}

/// Fitted mixture, serialisable for later re-scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianMixture {
    pub n_features: usize,
    pub weights: Vec<f64>,
    pub means: Vec<Vec<f64>>,
    pub covariances: Vec<Matrix>,
    pub reg_covar: f64,
    pub converged: bool,
    pub n_iter: usize,
    /// Mean log-likelihood of the training data at the last iteration.
    pub lower_bound: f64,
    /// Index of the restart that produced this model.
    pub best_restart: usize,
    pub restarts: Vec<RestartOutcome>,
}

/// Per-component pieces needed to evaluate log-densities.
struct Component {
    log_weight: f64,
    mean: Vec<f64>,
    chol: Cholesky,
}

impl GaussianMixture {
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Fit with `settings.n_init` restarts drawn from `rng`.
    pub fn fit<R: Rng + ?Sized>(
        x: &Matrix,
        settings: &EmSettings,
        rng: &mut R,
    ) -> Result<Self, FitError> {
        let (n, d) = x.shape();
        if d == 0 {
            return Err(FitError::NoFeatures);
        }
        if n < settings.n_components.max(1) {
            return Err(FitError::TooFewSamples {
                samples: n,
                components: settings.n_components,
            });
        }
        if !x.all_finite() {
            return Err(FitError::NonFinite);
        }

        let mut best: Option<GaussianMixture> = None;
        let mut restarts = Vec::with_capacity(settings.n_init);
        for restart in 0..settings.n_init.max(1) {
            let model = fit_once(x, settings, rng, restart)?;
            trace!(
                restart,
                lower_bound = model.lower_bound,
                n_iter = model.n_iter,
                converged = model.converged,
                "restart finished"
            );
            restarts.push(RestartOutcome {
                restart,
                lower_bound: model.lower_bound,
                n_iter: model.n_iter,
                converged: model.converged,
            });
            let better = best
                .as_ref()
                .map(|b| model.lower_bound > b.lower_bound)
                .unwrap_or(true);
            if better {
                best = Some(model);
            }
        }

        let mut best = best.ok_or(FitError::TooFewSamples {
            samples: n,
            components: settings.n_components,
        })?;
        best.restarts = restarts;
        debug!(
            best_restart = best.best_restart,
            lower_bound = best.lower_bound,
            converged = best.converged,
            "mixture fit complete"
        );
        Ok(best)
    }

    /// Per-row log-density under the mixture.
    pub fn score_samples(&self, x: &Matrix) -> Result<Vec<f64>, FitError> {
        if x.cols() != self.n_features {
            return Err(FitError::FeatureMismatch {
                expected: self.n_features,
                found: x.cols(),
            });
        }
        let components = self.components()?;
        let mut buf = vec![0.0; components.len()];
        Ok(x.iter_rows()
            .map(|row| {
                for (slot, c) in buf.iter_mut().zip(&components) {
                    *slot = c.log_weight + log_gaussian(row, &c.mean, &c.chol);
                }
                log_sum_exp(&buf)
            })
            .collect())
    }

    /// Structural checks for a model read from outside.
    pub fn validate(&self) -> Result<(), FitError> {
        let k = self.weights.len();
        if k == 0 {
            return Err(FitError::InvalidModel("no components".into()));
        }
        if self.means.len() != k || self.covariances.len() != k {
            return Err(FitError::InvalidModel(format!(
                "{} weights, {} means, {} covariances",
                k,
                self.means.len(),
                self.covariances.len()
            )));
        }
        let d = self.n_features;
        if self.means.iter().any(|m| m.len() != d)
            || self.covariances.iter().any(|c| c.shape() != (d, d))
        {
            return Err(FitError::InvalidModel(format!(
                "component shapes disagree with {d} features"
            )));
        }
        if self.weights.iter().any(|w| *w <= 0.0 || !w.is_finite()) {
            return Err(FitError::InvalidModel("weights must be positive".into()));
        }
        Ok(())
    }

    fn components(&self) -> Result<Vec<Component>, FitError> {
        self.validate()?;
        self.weights
            .iter()
            .zip(&self.means)
            .zip(&self.covariances)
            .enumerate()
            .map(|(k, ((w, mean), cov))| {
                let chol = Cholesky::factor(cov).map_err(|source| {
                    FitError::IllDefinedCovariance {
                        component: k,
                        source,
                    }
                })?;
                Ok(Component {
                    log_weight: w.ln(),
                    mean: mean.clone(),
                    chol,
                })
            })
            .collect()
    }
}

fn log_gaussian(x: &[f64], mean: &[f64], chol: &Cholesky) -> f64 {
    let diff: Vec<f64> = x.iter().zip(mean).map(|(a, b)| a - b).collect();
    -0.5 * (x.len() as f64 * LOG_2PI + chol.log_det() + chol.mahalanobis_sq(&diff))
}

/// Row-major responsibilities: `resp[i][k]`.
type Responsibilities = Vec<Vec<f64>>;

fn fit_once<R: Rng + ?Sized>(
    x: &Matrix,
    s: &EmSettings,
    rng: &mut R,
    restart: usize,
) -> Result<GaussianMixture, FitError> {
    let k = s.n_components;

    let init = kmeans(x, k, rng);
    let mut resp: Responsibilities = init
        .labels
        .iter()
        .map(|&label| {
            let mut r = vec![0.0; k];
            r[label] = 1.0;
            r
        })
        .collect();

    let mut model = m_step(x, &resp, s.reg_covar, restart)?;
    let mut lower_bound = f64::NEG_INFINITY;
    let mut converged = false;
    let mut n_iter = 0;

    for iter in 1..=s.max_iter {
        n_iter = iter;
        let previous = lower_bound;
        let (mean_ll, log_resp) = e_step(x, &model)?;
        for (r, lr) in resp.iter_mut().zip(&log_resp) {
            for (slot, v) in r.iter_mut().zip(lr) {
                *slot = v.exp();
            }
        }
        model = m_step(x, &resp, s.reg_covar, restart)?;
        lower_bound = mean_ll;
        if (lower_bound - previous).abs() < s.tol {
            converged = true;
            break;
        }
    }

    model.lower_bound = lower_bound;
    model.n_iter = n_iter;
    model.converged = converged;
    Ok(model)
}

/// Mean log-likelihood and per-row log-responsibilities.
fn e_step(x: &Matrix, model: &GaussianMixture) -> Result<(f64, Vec<Vec<f64>>), FitError> {
    let components = model.components()?;
    let mut total = 0.0;
    let log_resp = x
        .iter_rows()
        .map(|row| {
            let mut weighted: Vec<f64> = components
                .iter()
                .map(|c| c.log_weight + log_gaussian(row, &c.mean, &c.chol))
                .collect();
            total += log_normalize(&mut weighted);
            weighted
        })
        .collect();
    Ok((total / x.rows() as f64, log_resp))
}

/// Weights, means and regularised covariances from soft assignments.
fn m_step(
    x: &Matrix,
    resp: &Responsibilities,
    reg_covar: f64,
    restart: usize,
) -> Result<GaussianMixture, FitError> {
    let (n, d) = x.shape();
    let k = resp.first().map(Vec::len).unwrap_or(0);
    let eps = 10.0 * f64::EPSILON;

    let mut nk = vec![eps; k];
    for r in resp {
        for (acc, v) in nk.iter_mut().zip(r) {
            *acc += v;
        }
    }

    let mut means = vec![vec![0.0; d]; k];
    for (row, r) in x.iter_rows().zip(resp) {
        for c in 0..k {
            if r[c] == 0.0 {
                continue;
            }
            for (m, v) in means[c].iter_mut().zip(row) {
                *m += r[c] * v;
            }
        }
    }
    for (mean, total) in means.iter_mut().zip(&nk) {
        for m in mean.iter_mut() {
            *m /= total;
        }
    }

    let mut covariances = Vec::with_capacity(k);
    for c in 0..k {
        let mut cov = Matrix::zeros(d, d);
        for (row, r) in x.iter_rows().zip(resp) {
            let w = r[c];
            if w == 0.0 {
                continue;
            }
            for i in 0..d {
                let di = row[i] - means[c][i];
                for j in i..d {
                    let v = cov.get(i, j) + w * di * (row[j] - means[c][j]);
                    cov.set(i, j, v);
                }
            }
        }
        for i in 0..d {
            for j in i..d {
                let v = cov.get(i, j) / nk[c];
                cov.set(i, j, v);
                cov.set(j, i, v);
            }
        }
        cov.add_diagonal(reg_covar);
        if let Err(source) = Cholesky::factor(&cov) {
            return Err(FitError::IllDefinedCovariance {
                component: c,
                source,
            });
        }
        covariances.push(cov);
    }

    let weights = nk.iter().map(|v| v / n as f64).collect();

    Ok(GaussianMixture {
        n_features: d,
        weights,
        means,
        covariances,
        reg_covar,
        converged: false,
        n_iter: 0,
        lower_bound: f64::NEG_INFINITY,
        best_restart: restart,
        restarts: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings(k: usize, n_init: usize) -> EmSettings {
        EmSettings {
            n_components: k,
            n_init,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
        }
    }

    fn gaussian_rows(n: usize, center: &[f64], spread: f64, rng: &mut StdRng) -> Vec<Vec<f64>> {
        (0..n)
            .map(|_| {
                center
                    .iter()
                    .map(|c| {
                        // Sum of uniforms: cheap, bounded, roughly normal
                        let u: f64 = (0..6).map(|_| rng.random::<f64>()).sum::<f64>() - 3.0;
                        c + spread * u
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_single_component_matches_moments() {
        let x = Matrix::from_rows(&[vec![0.0], vec![2.0], vec![4.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let gmm = GaussianMixture::fit(&x, &settings(1, 1), &mut rng).unwrap();
        assert!((gmm.weights[0] - 1.0).abs() < 1e-12);
        assert!((gmm.means[0][0] - 2.0).abs() < 1e-12);
        // population variance 8/3 plus regularisation
        assert!((gmm.covariances[0].get(0, 0) - (8.0 / 3.0 + 1e-6)).abs() < 1e-9);

        let ll = gmm.score_samples(&Matrix::from_rows(&[vec![2.0]]).unwrap()).unwrap();
        let var = 8.0 / 3.0 + 1e-6;
        let expected = -0.5 * (LOG_2PI + f64::ln(var));
        assert!((ll[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_two_clusters_recovered() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut rows = gaussian_rows(60, &[0.0, 0.0], 0.5, &mut rng);
        rows.extend(gaussian_rows(40, &[8.0, 8.0], 0.5, &mut rng));
        let x = Matrix::from_rows(&rows).unwrap();

        let gmm = GaussianMixture::fit(&x, &settings(2, 3), &mut rng).unwrap();
        let mut weights = gmm.weights.clone();
        weights.sort_by(|a, b| a.total_cmp(b));
        assert!((weights[0] - 0.4).abs() < 0.02);
        assert!((weights[1] - 0.6).abs() < 0.02);
        assert_eq!(gmm.restarts.len(), 3);
        assert!(gmm.converged);
    }

    #[test]
    fn test_best_restart_has_max_lower_bound() {
        let mut rng = StdRng::seed_from_u64(9);
        let rows = gaussian_rows(80, &[0.0, 1.0, 2.0], 1.0, &mut rng);
        let x = Matrix::from_rows(&rows).unwrap();
        let gmm = GaussianMixture::fit(&x, &settings(3, 4), &mut rng).unwrap();
        let max = gmm
            .restarts
            .iter()
            .map(|r| r.lower_bound)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(gmm.lower_bound, max);
        assert_eq!(gmm.restarts[gmm.best_restart].lower_bound, max);
    }

    #[test]
    fn test_too_few_samples() {
        let x = Matrix::from_rows(&[vec![0.0], vec![1.0]]).unwrap();
        let err = GaussianMixture::fit(&x, &settings(5, 1), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, FitError::TooFewSamples { samples: 2, components: 5 }));
    }

    #[test]
    fn test_feature_mismatch_on_score() {
        let x = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![3.0]]).unwrap();
        let gmm = GaussianMixture::fit(&x, &settings(1, 1), &mut StdRng::seed_from_u64(0)).unwrap();
        let wide = Matrix::from_rows(&[vec![0.0, 1.0]]).unwrap();
        assert!(matches!(
            gmm.score_samples(&wide),
            Err(FitError::FeatureMismatch { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn test_json_roundtrip_scores_identically() {
        let x = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.5], vec![2.0, 2.5], vec![3.0, 1.0]])
            .unwrap();
        let gmm = GaussianMixture::fit(&x, &settings(1, 2), &mut StdRng::seed_from_u64(5)).unwrap();
        let json = serde_json::to_string(&gmm).unwrap();
        let back: GaussianMixture = serde_json::from_str(&json).unwrap();
        let before = gmm.score_samples(&x).unwrap();
        let after = back.score_samples(&x).unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_validate_rejects_inconsistent_model() {
        let x = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![3.0]]).unwrap();
        let mut gmm =
            GaussianMixture::fit(&x, &settings(1, 1), &mut StdRng::seed_from_u64(0)).unwrap();
        gmm.means.push(vec![0.0]);
        assert!(matches!(gmm.validate(), Err(FitError::InvalidModel(_))));
    }
}
