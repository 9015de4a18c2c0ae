//! Configuration validation errors and semantic validation.

use crate::pipeline::PipelineConfig;
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

fn invalid(field: &str, message: String) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message,
    }
}

/// Validate a pipeline configuration before any stage runs.
pub fn validate_config(config: &PipelineConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    let m = &config.mixture;
    if m.n_components == 0 {
        return Err(invalid("mixture.n_components", "Must be >= 1, got 0".into()));
    }
    if m.n_init == 0 {
        return Err(invalid("mixture.n_init", "Must be >= 1, got 0".into()));
    }
    if m.max_iter == 0 {
        return Err(invalid("mixture.max_iter", "Must be >= 1, got 0".into()));
    }
    if !(m.tol.is_finite() && m.tol > 0.0) {
        return Err(invalid("mixture.tol", format!("Must be positive, got {}", m.tol)));
    }
    if !(m.reg_covar.is_finite() && m.reg_covar >= 0.0) {
        return Err(invalid(
            "mixture.reg_covar",
            format!("Must be non-negative, got {}", m.reg_covar),
        ));
    }

    let v = config.reduction.variance_retained;
    if !(v > 0.0 && v <= 1.0) {
        return Err(invalid(
            "reduction.variance_retained",
            format!("Must be in (0, 1], got {}", v),
        ));
    }

    let p = config.anomaly.percentile;
    if !(p > 0.0 && p < 100.0) {
        return Err(invalid(
            "anomaly.percentile",
            format!("Must be in (0, 100), got {}", p),
        ));
    }

    validate_schema(config)
}

fn validate_schema(config: &PipelineConfig) -> ValidationResult<()> {
    let s = &config.schema;
    if s.date_marker.is_empty() {
        return Err(invalid("schema.date_marker", "Must not be empty".into()));
    }
    if s.presence_marker.is_empty() {
        return Err(invalid("schema.presence_marker", "Must not be empty".into()));
    }
    if s.code_markers.iter().any(|m| m.is_empty()) {
        return Err(invalid(
            "schema.code_markers",
            "Markers must not be empty strings".into(),
        ));
    }
    if s.code_burden_column.is_empty() {
        return Err(invalid("schema.code_burden_column", "Must not be empty".into()));
    }

    let mut derived = std::collections::HashSet::new();
    for diff in &s.date_differences {
        if diff.name.is_empty() || diff.end.is_empty() || diff.start.is_empty() {
            return Err(invalid(
                "schema.date_differences",
                "name, end and start must all be set".into(),
            ));
        }
        if !derived.insert(diff.name.as_str()) || diff.name == s.code_burden_column {
            return Err(ValidationError::SemanticError(format!(
                "derived feature name '{}' is used more than once",
                diff.name
            )));
        }
    }

    Ok(())
}
