//! Structured event definitions for logging.
//!
//! Events follow a consistent schema for machine-parseable JSONL output.
//! All events carry the run ID and the pipeline stage.

use chrono::{DateTime, Utc};
use cs_common::PipelineStage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const RUN_FAILED: &str = "run.failed";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";

    // Load stage
    pub const LOAD_FINISHED: &str = "load.finished";

    // Classify stage
    pub const CLASSIFY_FINISHED: &str = "classify.finished";
    pub const CLASSIFY_SCHEMA_MISMATCH: &str = "classify.schema_mismatch";

    // Normalize stage
    pub const NORMALIZE_PARSE_FAILURES: &str = "normalize.parse_failures";
    pub const NORMALIZE_DERIVED_SKIPPED: &str = "normalize.derived_skipped";
    pub const NORMALIZE_NAME_CONFLICT: &str = "normalize.name_conflict";
    pub const NORMALIZE_FINISHED: &str = "normalize.finished";

    // Reduce stage
    pub const REDUCE_COLUMN_DROPPED: &str = "reduce.column_dropped";
    pub const REDUCE_FINISHED: &str = "reduce.finished";

    // Score stage
    pub const SCORE_RESTART: &str = "score.restart";
    pub const SCORE_NOT_CONVERGED: &str = "score.not_converged";
    pub const SCORE_FINISHED: &str = "score.finished";

    // Export stage
    pub const EXPORT_FINISHED: &str = "export.finished";
}

/// A structured log event for JSONL output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub level: Level,
    /// Event name (e.g., "run.started", "score.finished").
    pub event: String,
    pub run_id: String,
    pub stage: PipelineStage,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, serde_json::Value>,
}

impl LogEvent {
    pub fn new(
        level: Level,
        event: impl Into<String>,
        run_id: impl Into<String>,
        stage: PipelineStage,
        message: impl Into<String>,
    ) -> Self {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: run_id.into(),
            stage,
            message: message.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
        self
    }

    /// Serialize to a single JSON line.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Correlation context stamped on every event of one run.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }

    pub fn event(
        &self,
        level: Level,
        event: impl Into<String>,
        stage: PipelineStage,
        message: impl Into<String>,
    ) -> LogEvent {
        LogEvent::new(level, event, &self.run_id, stage, message)
    }
}
