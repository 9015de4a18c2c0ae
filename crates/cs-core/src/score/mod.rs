//! Density scoring: fit the mixture, score every record, split off the
//! low-density tail.
//!
//! The threshold is a percentile of the training log-densities, so the
//! anomalous share is fixed by construction rather than by any external
//! labelling.

pub mod kmeans;
pub mod mixture;

pub use mixture::{EmSettings, FitError, GaussianMixture, RestartOutcome};

use cs_common::PipelineStage;
use cs_config::{AnomalyConfig, MixtureConfig};
use cs_math::{percentile, Matrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

impl From<FitError> for cs_common::Error {
    fn from(err: FitError) -> Self {
        cs_common::Error::Dimensionality {
            stage: PipelineStage::Score,
            cause: err.to_string(),
        }
    }
}

/// Random source for restarts: seeded when a seed is configured.
pub fn restart_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Log-density cut-off at `pct` (0-100, linear interpolation).
pub fn density_threshold(log_density: &[f64], pct: f64) -> Option<f64> {
    percentile(log_density, pct)
}

/// Indices of records strictly below `threshold`.
pub fn below_threshold(log_density: &[f64], threshold: f64) -> Vec<usize> {
    log_density
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Outcome of scoring one batch.
#[derive(Debug, Clone)]
pub struct Scored {
    pub model: GaussianMixture,
    pub log_density: Vec<f64>,
    pub threshold: f64,
    /// Row positions of anomalous records, ascending.
    pub anomalous: Vec<usize>,
    pub summary: ScoreSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub n_components: usize,
    pub n_init: usize,
    pub best_restart: usize,
    pub converged: bool,
    pub n_iter: usize,
    pub lower_bound: f64,
    pub percentile: f64,
    pub threshold: f64,
    pub anomaly_count: usize,
    pub anomaly_rate: f64,
}

/// Fits the mixture and partitions records by log-density.
pub struct DensityScorer<'a> {
    mixture: &'a MixtureConfig,
    anomaly: &'a AnomalyConfig,
}

impl<'a> DensityScorer<'a> {
    pub fn new(mixture: &'a MixtureConfig, anomaly: &'a AnomalyConfig) -> Self {
        Self { mixture, anomaly }
    }

    pub fn score<R: Rng + ?Sized>(&self, x: &Matrix, rng: &mut R) -> Result<Scored, FitError> {
        let settings = EmSettings::from(self.mixture);
        let model = GaussianMixture::fit(x, &settings, rng)?;
        if !model.converged {
            warn!(
                n_iter = model.n_iter,
                lower_bound = model.lower_bound,
                "best restart did not converge within max_iter"
            );
        }

        let log_density = model.score_samples(x)?;
        let threshold = density_threshold(&log_density, self.anomaly.percentile).ok_or(
            FitError::TooFewSamples {
                samples: 0,
                components: settings.n_components,
            },
        )?;
        let anomalous = below_threshold(&log_density, threshold);

        let summary = ScoreSummary {
            n_components: model.n_components(),
            n_init: model.restarts.len(),
            best_restart: model.best_restart,
            converged: model.converged,
            n_iter: model.n_iter,
            lower_bound: model.lower_bound,
            percentile: self.anomaly.percentile,
            threshold,
            anomaly_count: anomalous.len(),
            anomaly_rate: anomalous.len() as f64 / log_density.len() as f64,
        };

        Ok(Scored {
            model,
            log_density,
            threshold,
            anomalous,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_below_threshold() {
        let ll = [-1.0, -5.0, -2.0, -5.0, 0.0];
        assert_eq!(below_threshold(&ll, -2.0), vec![1, 3]);
        // Ties at the threshold stay normal
        assert_eq!(below_threshold(&ll, -5.0), Vec::<usize>::new());
    }

    #[test]
    fn test_threshold_interpolates() {
        let ll: Vec<f64> = (0..101).map(|i| i as f64).collect();
        assert_eq!(density_threshold(&ll, 1.0), Some(1.0));
        assert_eq!(density_threshold(&[], 1.0), None);
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let a: u64 = restart_rng(Some(17)).random();
        let b: u64 = restart_rng(Some(17)).random();
        assert_eq!(a, b);
    }

    #[test]
    fn test_percentile_share_of_flagged() {
        let rows: Vec<Vec<f64>> = (0..200)
            .map(|i| {
                let t = i as f64 / 20.0;
                vec![t.sin() * 3.0 + t, t.cos()]
            })
            .collect();
        let x = Matrix::from_rows(&rows).unwrap();
        let mixture = MixtureConfig {
            n_components: 2,
            n_init: 2,
            seed: Some(3),
            ..MixtureConfig::default()
        };
        let anomaly = AnomalyConfig::default();
        let scored = DensityScorer::new(&mixture, &anomaly)
            .score(&x, &mut restart_rng(mixture.seed))
            .unwrap();
        // 1% of 200 with linear interpolation: one or two records
        assert!((1..=3).contains(&scored.anomalous.len()));
        assert_eq!(scored.log_density.len(), 200);
        assert_eq!(scored.summary.anomaly_count, scored.anomalous.len());
    }

    #[test]
    fn test_fit_error_is_dimensionality_in_score() {
        let err: cs_common::Error = FitError::TooFewSamples {
            samples: 3,
            components: 5,
        }
        .into();
        assert!(matches!(
            err,
            cs_common::Error::Dimensionality {
                stage: PipelineStage::Score,
                ..
            }
        ));
    }
}
