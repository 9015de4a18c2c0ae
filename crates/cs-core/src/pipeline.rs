//! Run orchestration: load → classify → normalize → reduce → score → export.
//!
//! Stages run strictly in sequence. Each stage takes the previous stage's
//! output and nothing crosses stage boundaries except that value. The
//! reporter is called once, after scoring, with every artifact of the run;
//! a failure before that call leaves nothing exported.

use crate::classify::ColumnClassifier;
use crate::log_event;
use crate::logging::{event_names, get_host_id, LogContext};
use crate::normalize::{FeatureNormalizer, NormalizeSummary};
use crate::reduce::{DimensionalityReducer, ReduceSummary};
use crate::report::RunReporter;
use crate::score::{restart_rng, DensityScorer, GaussianMixture, ScoreSummary};
use crate::table::{read_csv_path, write_matrix_csv, RecordTable};
use chrono::{DateTime, Utc};
use cs_common::{Diagnostic, DiagnosticKind, Error, PipelineStage, Result, RunId, SCHEMA_VERSION};
use cs_config::{ConfigSnapshot, ExportSpace, PipelineConfig};
use cs_math::Matrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

/// Fit parameters recorded for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub n_components: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub reg_covar: f64,
    pub seed: Option<u64>,
    pub variance_retained: f64,
    pub percentile: f64,
    pub export_space: ExportSpace,
}

impl From<&PipelineConfig> for RunParams {
    fn from(c: &PipelineConfig) -> Self {
        Self {
            n_components: c.mixture.n_components,
            n_init: c.mixture.n_init,
            max_iter: c.mixture.max_iter,
            tol: c.mixture.tol,
            reg_covar: c.mixture.reg_covar,
            seed: c.mixture.seed,
            variance_retained: c.reduction.variance_retained,
            percentile: c.anomaly.percentile,
            export_space: c.anomaly.export_space,
        }
    }
}

/// Scalar facts about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub rows: usize,
    pub input_columns: usize,
    pub normalized_columns: usize,
    pub retained_components: usize,
    pub explained_variance: f64,
    pub imputed_cells: usize,
    pub parse_failures: usize,
    pub schema_mismatches: usize,
    pub empty_columns: usize,
    pub lower_bound: f64,
    pub converged: bool,
    pub n_iter: usize,
    pub threshold: f64,
    pub anomaly_count: usize,
    pub anomaly_rate: f64,
    pub duration_ms: u64,
}

/// One flagged record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Zero-based row position in the input table.
    pub row: usize,
    pub log_density: f64,
}

/// Everything a reader of the run needs to audit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub run_id: String,
    pub host_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: usize,
    pub roles: BTreeMap<String, usize>,
    pub normalize: NormalizeSummary,
    pub reduce: ReduceSummary,
    pub score: ScoreSummary,
    pub export_space: ExportSpace,
    pub anomaly_columns: Vec<String>,
    pub anomalies: Vec<AnomalyRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The single hand-off to the tracking collaborator.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub run_id: RunId,
    pub host_id: String,
    pub params: RunParams,
    pub metrics: RunMetrics,
    pub summary: RunSummary,
    pub config: ConfigSnapshot,
    /// Fitted mixture as JSON.
    pub model_json: Vec<u8>,
    /// Anomalous rows as CSV with a header and no index column.
    pub anomalies_csv: Vec<u8>,
}

/// What the caller gets back from a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub summary: RunSummary,
    pub metrics: RunMetrics,
    pub params: RunParams,
    pub model: GaussianMixture,
    pub log_density: Vec<f64>,
}

impl RunOutcome {
    /// Row positions of the anomalous records.
    pub fn anomalous_rows(&self) -> Vec<usize> {
        self.summary.anomalies.iter().map(|a| a.row).collect()
    }
}

/// Batch orchestrator.
pub struct Pipeline {
    config: PipelineConfig,
    snapshot: ConfigSnapshot,
    run_id: RunId,
    host_id: String,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, snapshot: ConfigSnapshot) -> Self {
        Self {
            config,
            snapshot,
            run_id: RunId::new(),
            host_id: get_host_id(),
        }
    }

    /// Pipeline on defaults, with a snapshot describing them.
    pub fn with_defaults() -> Self {
        Self::new(PipelineConfig::default(), ConfigSnapshot::defaults_only())
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load a CSV file and run every stage.
    pub fn run_path(&self, input: &Path, reporter: &mut dyn RunReporter) -> Result<RunOutcome> {
        let ctx = self.context();
        let table = match read_csv_path(input) {
            Ok(t) => t,
            Err(e) => {
                let err: Error = e.into();
                self.log_failure(&ctx, PipelineStage::Load, &err);
                return Err(err);
            }
        };
        log_event!(
            ctx,
            INFO,
            event_names::LOAD_FINISHED,
            PipelineStage::Load,
            "record table loaded",
            rows = table.n_rows(),
            columns = table.n_cols()
        );
        self.run(table, reporter)
    }

    /// Run every stage on an in-memory table.
    pub fn run(&self, table: RecordTable, reporter: &mut dyn RunReporter) -> Result<RunOutcome> {
        let ctx = self.context();
        let mut stage = PipelineStage::Init;
        let result = self.execute(&ctx, table, reporter, &mut stage);
        if let Err(err) = &result {
            self.log_failure(&ctx, stage, err);
        }
        result
    }

    fn context(&self) -> LogContext {
        LogContext::new(self.run_id.as_str(), self.host_id.as_str())
    }

    fn log_failure(&self, ctx: &LogContext, stage: PipelineStage, err: &Error) {
        let category = err.category().to_string();
        let cause = err.to_string();
        log_event!(
            ctx,
            ERROR,
            event_names::RUN_FAILED,
            stage,
            "run failed",
            code = err.code(),
            category = category.as_str(),
            error = cause.as_str()
        );
    }

    fn execute(
        &self,
        ctx: &LogContext,
        table: RecordTable,
        reporter: &mut dyn RunReporter,
        stage: &mut PipelineStage,
    ) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let rows = table.n_rows();
        let input_columns = table.n_cols();
        let config = &self.config;

        log_event!(
            ctx,
            INFO,
            event_names::RUN_STARTED,
            PipelineStage::Init,
            "run started",
            rows = rows,
            columns = input_columns,
            config_hash = self.snapshot.short_id()
        );

        // Classify
        *stage = PipelineStage::Classify;
        let classification = ColumnClassifier::new(&config.schema).classify(&table.schema());
        for d in &classification.diagnostics {
            log_event!(
                ctx,
                DEBUG,
                event_names::CLASSIFY_SCHEMA_MISMATCH,
                PipelineStage::Classify,
                "expected column absent",
                column = d.column.as_str()
            );
        }
        let roles = classification.roles.counts();
        log_event!(
            ctx,
            INFO,
            event_names::CLASSIFY_FINISHED,
            PipelineStage::Classify,
            "columns classified",
            columns = classification.roles.len(),
            schema_mismatches = classification.diagnostics.len()
        );
        let mut diagnostics = classification.diagnostics;

        // Normalize
        *stage = PipelineStage::Normalize;
        let normalized = FeatureNormalizer::new(&config.schema)
            .normalize(table, &classification.roles)?;
        check_rows(PipelineStage::Normalize, rows, normalized.table.n_rows())?;
        for d in &normalized.diagnostics {
            match d.kind {
                DiagnosticKind::ParseFailure => log_event!(
                    ctx,
                    WARN,
                    event_names::NORMALIZE_PARSE_FAILURES,
                    PipelineStage::Normalize,
                    "cells could not be parsed; treated as missing",
                    column = d.column.as_str(),
                    count = d.count
                ),
                DiagnosticKind::NameConflict => log_event!(
                    ctx,
                    WARN,
                    event_names::NORMALIZE_NAME_CONFLICT,
                    PipelineStage::Normalize,
                    "input column replaced by derived feature",
                    column = d.column.as_str()
                ),
                _ => log_event!(
                    ctx,
                    WARN,
                    event_names::NORMALIZE_DERIVED_SKIPPED,
                    PipelineStage::Normalize,
                    "derived feature skipped",
                    column = d.column.as_str()
                ),
            }
        }
        log_event!(
            ctx,
            INFO,
            event_names::NORMALIZE_FINISHED,
            PipelineStage::Normalize,
            "features normalized",
            columns = normalized.table.n_cols(),
            dropped_identifiers = normalized.summary.dropped_identifiers.len(),
            burden_sources = normalized.summary.burden_sources.len(),
            parse_failures = normalized.summary.parse_failures
        );
        diagnostics.extend(normalized.diagnostics);
        let normalized_summary = normalized.summary;
        let normalized_table = normalized.table;

        // Reduce
        *stage = PipelineStage::Reduce;
        let reduced = DimensionalityReducer::new(&config.reduction).reduce(&normalized_table)?;
        check_rows(PipelineStage::Reduce, rows, reduced.matrix.rows())?;
        for d in &reduced.diagnostics {
            log_event!(
                ctx,
                WARN,
                event_names::REDUCE_COLUMN_DROPPED,
                PipelineStage::Reduce,
                "column without observed values dropped",
                column = d.column.as_str()
            );
        }
        log_event!(
            ctx,
            INFO,
            event_names::REDUCE_FINISHED,
            PipelineStage::Reduce,
            "projection fitted",
            input_columns = reduced.summary.input_columns,
            retained = reduced.summary.retained_components,
            explained = reduced.summary.cumulative_variance_ratio
        );
        diagnostics.extend(reduced.diagnostics.iter().cloned());

        // Score
        *stage = PipelineStage::Score;
        let mut rng = restart_rng(config.mixture.seed);
        let scored = DensityScorer::new(&config.mixture, &config.anomaly)
            .score(&reduced.matrix, &mut rng)?;
        check_rows(PipelineStage::Score, rows, scored.log_density.len())?;
        for r in &scored.model.restarts {
            log_event!(
                ctx,
                DEBUG,
                event_names::SCORE_RESTART,
                PipelineStage::Score,
                "restart finished",
                restart = r.restart,
                lower_bound = r.lower_bound,
                n_iter = r.n_iter,
                converged = r.converged
            );
        }
        if !scored.model.converged {
            log_event!(
                ctx,
                WARN,
                event_names::SCORE_NOT_CONVERGED,
                PipelineStage::Score,
                "best restart did not converge",
                n_iter = scored.model.n_iter
            );
        }
        log_event!(
            ctx,
            INFO,
            event_names::SCORE_FINISHED,
            PipelineStage::Score,
            "records scored",
            threshold = scored.threshold,
            anomalies = scored.anomalous.len(),
            lower_bound = scored.model.lower_bound
        );

        // Export
        *stage = PipelineStage::Export;
        let (anomaly_columns, anomaly_rows) = match config.anomaly.export_space {
            ExportSpace::Reduced => (
                reduced.column_names.clone(),
                reduced.matrix.select_rows(&scored.anomalous),
            ),
            ExportSpace::Normalized => {
                let full: Matrix = normalized_table.to_matrix()?;
                let names = normalized_table
                    .column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                (names, full.select_rows(&scored.anomalous))
            }
        };
        let mut anomalies_csv = Vec::new();
        write_matrix_csv(&mut anomalies_csv, &anomaly_columns, &anomaly_rows)?;
        let model_json = serde_json::to_vec_pretty(&scored.model)?;

        let count = |kind: DiagnosticKind| diagnostics.iter().filter(|d| d.kind == kind).count();
        let metrics = RunMetrics {
            rows,
            input_columns,
            normalized_columns: normalized_table.n_cols(),
            retained_components: reduced.summary.retained_components,
            explained_variance: reduced.summary.cumulative_variance_ratio,
            imputed_cells: reduced.summary.imputed_cells,
            parse_failures: normalized_summary.parse_failures,
            schema_mismatches: count(DiagnosticKind::SchemaMismatch),
            empty_columns: count(DiagnosticKind::EmptyColumn),
            lower_bound: scored.model.lower_bound,
            converged: scored.model.converged,
            n_iter: scored.model.n_iter,
            threshold: scored.threshold,
            anomaly_count: scored.anomalous.len(),
            anomaly_rate: scored.summary.anomaly_rate,
            duration_ms: clock.elapsed().as_millis() as u64,
        };

        let summary = RunSummary {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: self.run_id.to_string(),
            host_id: self.host_id.clone(),
            started_at,
            finished_at: Utc::now(),
            rows,
            roles,
            normalize: normalized_summary,
            reduce: reduced.summary,
            score: scored.summary,
            export_space: config.anomaly.export_space,
            anomaly_columns,
            anomalies: scored
                .anomalous
                .iter()
                .map(|&row| AnomalyRecord {
                    row,
                    log_density: scored.log_density[row],
                })
                .collect(),
            diagnostics,
        };

        let params = RunParams::from(config);
        let artifacts = RunArtifacts {
            run_id: self.run_id.clone(),
            host_id: self.host_id.clone(),
            params: params.clone(),
            metrics: metrics.clone(),
            summary: summary.clone(),
            config: self.snapshot.clone(),
            model_json,
            anomalies_csv,
        };
        reporter.report(&artifacts)?;
        log_event!(
            ctx,
            INFO,
            event_names::EXPORT_FINISHED,
            PipelineStage::Export,
            "artifacts handed to reporter",
            reporter = reporter.name()
        );

        log_event!(
            ctx,
            INFO,
            event_names::RUN_FINISHED,
            PipelineStage::Export,
            "run finished",
            anomalies = metrics.anomaly_count,
            duration_ms = metrics.duration_ms
        );

        Ok(RunOutcome {
            run_id: self.run_id.clone(),
            summary,
            metrics,
            params,
            model: scored.model,
            log_density: scored.log_density,
        })
    }
}

fn check_rows(stage: PipelineStage, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::Shape(format!(
            "{stage} produced {found} row(s) from {expected}"
        )))
    }
}
