//! claimscope common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the workspace:
//! - Pipeline stage and column role vocabularies
//! - Run identifiers
//! - Non-fatal diagnostics (schema gaps, per-cell parse failures)
//! - The unified error type with stable codes
//! - Output format specifications

pub mod diagnostic;
pub mod error;
pub mod id;
pub mod output;
pub mod role;
pub mod stage;

pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use id::RunId;
pub use output::OutputFormat;
pub use role::{ColumnRole, ValueKind};
pub use stage::PipelineStage;

/// Schema version stamped on every artifact this workspace writes.
pub const SCHEMA_VERSION: &str = "1.0.0";
