//! Error types for claimscope.
//!
//! Every fatal condition carries:
//! - a stable numeric code for machine parsing
//! - a category for grouping
//! - a recoverability hint and a suggested action for automation
//! - a remediation hint for humans
//!
//! Non-fatal conditions (schema gaps, per-cell parse failures) are not
//! errors; they are [`crate::Diagnostic`] records.
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 40,
//!   "category": "dimensionality",
//!   "message": "dimensionality failure in score: 3 samples < 5 components",
//!   "recoverable": true,
//!   "suggested_action": "adjust_config",
//!   "context": { "stage": "score" }
//! }
//! ```

use crate::stage::PipelineStage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for claimscope operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration resolution and validation.
    Config,
    /// Reading the record table.
    Ingest,
    /// Structural table problems between stages.
    Schema,
    /// Too few rows or degenerate variance for the fit.
    Dimensionality,
    /// Handing artifacts to the tracking collaborator.
    Export,
    /// File I/O and serialization.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Ingest => write!(f, "ingest"),
            ErrorCategory::Schema => write!(f, "schema"),
            ErrorCategory::Dimensionality => write!(f, "dimensionality"),
            ErrorCategory::Export => write!(f, "export"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for automation responding to an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation unchanged.
    Retry,
    /// Fix or reset the configuration.
    AdjustConfig,
    /// Inspect and repair the input table.
    FixInput,
    /// Provide more records.
    MoreData,
    /// Abort the run.
    Abort,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::AdjustConfig => write!(f, "adjust_config"),
            SuggestedAction::FixInput => write!(f, "fix_input"),
            SuggestedAction::MoreData => write!(f, "more_data"),
            SuggestedAction::Abort => write!(f, "abort"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for claimscope.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    // Ingest errors (20-29)
    #[error("failed to load record table: {0}")]
    Ingest(String),

    // Schema errors (30-39)
    #[error("table shape violation: {0}")]
    Shape(String),

    // Fit errors (40-49)
    #[error("dimensionality failure in {stage}: {cause}")]
    Dimensionality { stage: PipelineStage, cause: String },

    // Export errors (50-59)
    #[error("artifact export failed: {0}")]
    ArtifactExport(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable error code.
    ///
    /// - 10-19: configuration
    /// - 20-29: ingest
    /// - 30-39: table shape
    /// - 40-49: fit
    /// - 50-59: export
    /// - 60-69: I/O
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig { .. } => 11,
            Error::Ingest(_) => 20,
            Error::Shape(_) => 30,
            Error::Dimensionality { .. } => 40,
            Error::ArtifactExport(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig { .. } => ErrorCategory::Config,
            Error::Ingest(_) => ErrorCategory::Ingest,
            Error::Shape(_) => ErrorCategory::Schema,
            Error::Dimensionality { .. } => ErrorCategory::Dimensionality,
            Error::ArtifactExport(_) => ErrorCategory::Export,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether a changed input or configuration could succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::InvalidConfig { .. } => true,
            Error::Ingest(_) => true,
            // Row-count drift between stages is an internal fault.
            Error::Shape(_) => false,
            Error::Dimensionality { .. } => true,
            Error::ArtifactExport(_) => true,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) | Error::InvalidConfig { .. } => SuggestedAction::AdjustConfig,
            Error::Ingest(_) => SuggestedAction::FixInput,
            Error::Shape(_) => SuggestedAction::Abort,
            Error::Dimensionality { .. } => SuggestedAction::MoreData,
            Error::ArtifactExport(_) => SuggestedAction::Retry,
            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'claimscope config validate' to check the configuration file."
            }
            Error::InvalidConfig { .. } => {
                "Correct the named field, or remove it to fall back to the built-in default."
            }
            Error::Ingest(_) => {
                "Check that the input is a comma-separated file with a unique header row and equal-length rows."
            }
            Error::Shape(_) => {
                "Internal invariant violated. Report the input and configuration that triggered it."
            }
            Error::Dimensionality { .. } => {
                "Supply more records, or lower mixture.n_components in the configuration."
            }
            Error::ArtifactExport(_) => {
                "Check that the bundle destination is writable and has free space, then rerun."
            }
            Error::Io(_) => "Check paths, permissions and disk space. Retry the operation.",
            Error::Json(_) => {
                "Invalid JSON. Check syntax with 'jq . <file>' or regenerate the file."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidConfig { .. } => "Invalid Configuration Value",
            Error::Ingest(_) => "Input Load Failed",
            Error::Shape(_) => "Table Shape Violation",
            Error::Dimensionality { .. } => "Dimensionality Failure",
            Error::ArtifactExport(_) => "Artifact Export Failed",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: u32,
    pub category: ErrorCategory,
    pub message: String,
    pub recoverable: bool,
    pub suggested_action: SuggestedAction,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InvalidConfig { field, .. } => {
                context.insert("field".to_string(), serde_json::json!(field));
            }
            Error::Dimensionality { stage, .. } => {
                context.insert("stage".to_string(), serde_json::json!(stage));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim_error() -> Error {
        Error::Dimensionality {
            stage: PipelineStage::Score,
            cause: "3 samples < 5 components".into(),
        }
    }

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(Error::Ingest("x".into()).code(), 20);
        assert_eq!(dim_error().code(), 40);
        assert_eq!(Error::ArtifactExport("x".into()).code(), 50);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::InvalidConfig {
                field: "mixture.n_init".into(),
                message: "must be >= 1".into()
            }
            .category(),
            ErrorCategory::Config
        );
        assert_eq!(dim_error().category(), ErrorCategory::Dimensionality);
        assert_eq!(Error::Shape("x".into()).category(), ErrorCategory::Schema);
    }

    #[test]
    fn test_error_recoverable() {
        assert!(dim_error().is_recoverable());
        assert!(!Error::Shape("row count changed".into()).is_recoverable());
    }

    #[test]
    fn test_structured_error_carries_stage() {
        let structured = StructuredError::from(&dim_error());
        assert_eq!(structured.code, 40);
        assert_eq!(structured.suggested_action, SuggestedAction::MoreData);
        assert_eq!(
            structured.context.get("stage"),
            Some(&serde_json::json!("score"))
        );
        let json = structured.to_json();
        assert!(json.contains(r#""category":"dimensionality""#));
        assert!(json.contains(r#""suggested_action":"more_data""#));
    }

    #[test]
    fn test_with_context() {
        let structured =
            StructuredError::from(&Error::Ingest("ragged row".into())).with_context("line", 7);
        assert_eq!(structured.context.get("line"), Some(&serde_json::json!(7)));
    }

    #[test]
    fn test_format_error_human() {
        let formatted = format_error_human(&dim_error(), false);
        assert!(formatted.contains("Dimensionality Failure"));
        assert!(formatted.contains("3 samples < 5 components"));
        assert!(formatted.contains("n_components"));
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(ErrorCategory::Export.to_string(), "export");
        assert_eq!(SuggestedAction::AdjustConfig.to_string(), "adjust_config");
    }
}
