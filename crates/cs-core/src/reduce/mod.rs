//! Dimensionality reduction: standardize, then impute, then project.
//!
//! The order is fixed. Imputation fills with the mean on the standardized
//! scale, and the projection needs a matrix without missing entries.

pub mod impute;
pub mod pca;
pub mod scaler;

pub use impute::MeanImputer;
pub use pca::Pca;
pub use scaler::StandardScaler;

use crate::table::{RecordTable, TableError};
use cs_common::{Diagnostic, PipelineStage};
use cs_config::ReductionConfig;
use cs_math::{LinalgError, Matrix, ShapeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("{rows} row(s); at least 2 are needed to estimate variance")]
    TooFewRows { rows: usize },

    #[error("no columns with observed values remain")]
    NoColumns,

    #[error("standardized matrix has zero total variance")]
    NoVariance,

    #[error("matrix contains non-finite values after imputation")]
    NonFinite,

    #[error("eigendecomposition failed: {0}")]
    Linalg(#[from] LinalgError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl From<ReduceError> for cs_common::Error {
    fn from(err: ReduceError) -> Self {
        match err {
            ReduceError::Table(e) => e.into(),
            ReduceError::Shape(e) => cs_common::Error::Shape(e.to_string()),
            other => cs_common::Error::Dimensionality {
                stage: PipelineStage::Reduce,
                cause: other.to_string(),
            },
        }
    }
}

/// Output of the reducer.
#[derive(Debug, Clone)]
pub struct Reduced {
    /// Projected rows, `n x k`.
    pub matrix: Matrix,
    /// `pc_0 .. pc_{k-1}`.
    pub column_names: Vec<String>,
    pub pca: Pca,
    pub diagnostics: Vec<Diagnostic>,
    pub summary: ReduceSummary,
}

/// Shape facts about one reduction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReduceSummary {
    pub input_columns: usize,
    pub dropped_empty: Vec<String>,
    pub imputed_cells: usize,
    pub retained_components: usize,
    pub explained_variance_ratio: Vec<f64>,
    pub cumulative_variance_ratio: f64,
}

/// Standardize → impute → project.
pub struct DimensionalityReducer<'a> {
    config: &'a ReductionConfig,
}

impl<'a> DimensionalityReducer<'a> {
    pub fn new(config: &'a ReductionConfig) -> Self {
        Self { config }
    }

    pub fn reduce(&self, table: &RecordTable) -> Result<Reduced, ReduceError> {
        let names: Vec<String> = table.column_names().iter().map(|s| s.to_string()).collect();
        let x = table.to_matrix()?;
        if x.rows() < 2 {
            return Err(ReduceError::TooFewRows { rows: x.rows() });
        }

        let (_, standardized) = StandardScaler::fit_transform(&x);
        let imputed_cells = standardized.count_nan();

        let imputer = MeanImputer::fit(&standardized);
        let mut diagnostics = Vec::new();
        let mut dropped_empty = Vec::new();
        for j in imputer.dropped(x.cols()) {
            warn!(column = %names[j], "column has no observed values; dropped");
            diagnostics.push(Diagnostic::empty_column(PipelineStage::Reduce, names[j].clone()));
            dropped_empty.push(names[j].clone());
        }
        let complete = imputer.transform(&standardized);

        let pca = Pca::fit(&complete, self.config.variance_retained)?;
        let matrix = pca.transform(&complete)?;
        let k = pca.n_components();

        debug!(
            rows = matrix.rows(),
            input_columns = x.cols(),
            retained = k,
            explained = pca.cumulative_variance_ratio(),
            "reduction complete"
        );

        let summary = ReduceSummary {
            input_columns: x.cols(),
            dropped_empty,
            imputed_cells: imputed_cells.saturating_sub(x.rows() * (x.cols() - complete.cols())),
            retained_components: k,
            explained_variance_ratio: pca.explained_variance_ratio.clone(),
            cumulative_variance_ratio: pca.cumulative_variance_ratio(),
        };

        Ok(Reduced {
            matrix,
            column_names: (0..k).map(|i| format!("pc_{i}")).collect(),
            pca,
            diagnostics,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use cs_common::DiagnosticKind;

    fn table(columns: Vec<(&str, Vec<f64>)>) -> RecordTable {
        RecordTable::from_columns(
            columns
                .into_iter()
                .map(|(n, v)| Column::numeric(n, v))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_output_has_no_missing() {
        let t = table(vec![
            ("a", vec![1.0, f64::NAN, 3.0, 4.0, 2.0]),
            ("b", vec![2.0, 1.0, f64::NAN, 0.5, 3.0]),
            ("c", vec![0.0, 1.0, 0.0, 1.0, 0.0]),
        ]);
        let out = DimensionalityReducer::new(&ReductionConfig::default())
            .reduce(&t)
            .unwrap();
        assert_eq!(out.matrix.rows(), 5);
        assert_eq!(out.matrix.count_nan(), 0);
        assert_eq!(out.column_names.len(), out.matrix.cols());
        assert_eq!(out.summary.imputed_cells, 2);
        assert!(out.summary.cumulative_variance_ratio > 0.95);
    }

    #[test]
    fn test_three_latent_factors_keep_three_components() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let n = 200;
        let factors: Vec<[f64; 3]> = (0..n)
            .map(|_| {
                [
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                ]
            })
            .collect();
        let names: Vec<String> = (0..10).map(|j| format!("x{j}")).collect();
        let columns: Vec<(&str, Vec<f64>)> = names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let values: Vec<f64> = factors
                    .iter()
                    .map(|f| {
                        f[j % 3] + 0.3 * f[(j + 1) % 3] + 0.01 * rng.random_range(-1.0..1.0)
                    })
                    .collect();
                (name.as_str(), values)
            })
            .collect();
        let out = DimensionalityReducer::new(&ReductionConfig::default())
            .reduce(&table(columns))
            .unwrap();
        assert_eq!(out.summary.input_columns, 10);
        assert_eq!(out.summary.retained_components, 3);
        assert_eq!(out.matrix.cols(), 3);
        assert_eq!(out.matrix.rows(), n);
        assert!(out.summary.cumulative_variance_ratio >= 0.95);
    }

    #[test]
    fn test_empty_column_dropped_with_diagnostic() {
        let t = table(vec![
            ("a", vec![1.0, 2.0, 3.0]),
            ("empty", vec![f64::NAN; 3]),
        ]);
        let out = DimensionalityReducer::new(&ReductionConfig::default())
            .reduce(&t)
            .unwrap();
        assert_eq!(out.summary.dropped_empty, vec!["empty"]);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::EmptyColumn);
        assert_eq!(out.summary.imputed_cells, 0);
        assert_eq!(out.matrix.cols(), 1);
    }

    #[test]
    fn test_single_row_is_dimensionality_error() {
        let t = table(vec![("a", vec![1.0])]);
        let err = DimensionalityReducer::new(&ReductionConfig::default())
            .reduce(&t)
            .unwrap_err();
        assert!(matches!(err, ReduceError::TooFewRows { rows: 1 }));
        assert!(matches!(
            cs_common::Error::from(err),
            cs_common::Error::Dimensionality { stage: PipelineStage::Reduce, .. }
        ));
    }

    #[test]
    fn test_constant_table_has_no_variance() {
        let t = table(vec![("a", vec![5.0; 4]), ("b", vec![1.0; 4])]);
        let err = DimensionalityReducer::new(&ReductionConfig::default())
            .reduce(&t)
            .unwrap_err();
        assert!(matches!(err, ReduceError::NoVariance));
    }
}
