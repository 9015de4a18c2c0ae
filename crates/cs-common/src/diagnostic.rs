//! Non-fatal diagnostics.
//!
//! Schema gaps and per-cell parse failures never abort a run. They are
//! recorded here, logged, and counted into run metrics.

use crate::stage::PipelineStage;
use serde::{Deserialize, Serialize};

/// Kind of non-fatal condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// An expected role-list column is absent from the table.
    SchemaMismatch,
    /// Individual cells could not be parsed and became missing.
    ParseFailure,
    /// A column was dropped because it carried no observed values.
    EmptyColumn,
    /// An input column was replaced by a derived feature of the same name.
    NameConflict,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::SchemaMismatch => write!(f, "schema_mismatch"),
            DiagnosticKind::ParseFailure => write!(f, "parse_failure"),
            DiagnosticKind::EmptyColumn => write!(f, "empty_column"),
            DiagnosticKind::NameConflict => write!(f, "name_conflict"),
        }
    }
}

/// A single non-fatal condition observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: PipelineStage,
    pub kind: DiagnosticKind,
    pub column: String,
    /// Number of affected cells (1 for column-level conditions).
    pub count: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn schema_mismatch(stage: PipelineStage, column: impl Into<String>, expected: &str) -> Self {
        let column = column.into();
        Self {
            message: format!("expected {expected} column '{column}' not present; skipped"),
            stage,
            kind: DiagnosticKind::SchemaMismatch,
            column,
            count: 1,
        }
    }

    pub fn parse_failures(stage: PipelineStage, column: impl Into<String>, count: usize) -> Self {
        let column = column.into();
        Self {
            message: format!("{count} value(s) in '{column}' could not be parsed; treated as missing"),
            stage,
            kind: DiagnosticKind::ParseFailure,
            column,
            count,
        }
    }

    pub fn empty_column(stage: PipelineStage, column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            message: format!("column '{column}' has no observed values; dropped"),
            stage,
            kind: DiagnosticKind::EmptyColumn,
            column,
            count: 1,
        }
    }

    pub fn name_conflict(stage: PipelineStage, column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            message: format!(
                "input column '{column}' shares its name with a derived feature; input dropped"
            ),
            stage,
            kind: DiagnosticKind::NameConflict,
            column,
            count: 1,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.stage, self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failure_message_carries_count() {
        let d = Diagnostic::parse_failures(PipelineStage::Normalize, "CLM_ADMSN_DT", 3);
        assert_eq!(d.kind, DiagnosticKind::ParseFailure);
        assert_eq!(d.count, 3);
        assert!(d.to_string().contains("[normalize:parse_failure]"));
        assert!(d.message.contains("CLM_ADMSN_DT"));
    }

    #[test]
    fn schema_mismatch_is_column_level() {
        let d = Diagnostic::schema_mismatch(PipelineStage::Classify, "BENE_ID", "identifier");
        assert_eq!(d.count, 1);
        assert_eq!(d.kind, DiagnosticKind::SchemaMismatch);
    }
}
