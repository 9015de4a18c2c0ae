//! Column value kinds and semantic roles.

use serde::{Deserialize, Serialize};

/// Declared value type of a raw column, inferred at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Every observed cell parses as a number.
    Numeric,
    /// At least one observed cell is free text.
    Text,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Numeric => write!(f, "numeric"),
            ValueKind::Text => write!(f, "text"),
        }
    }
}

/// Semantic role assigned once per column by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Calendar date or timestamp.
    Date,
    /// Diagnosis, procedure or service code.
    DiagnosticCode,
    /// Present-on-admission indicator.
    PresenceFlag,
    /// Enumerated administrative status code.
    StatusCode,
    /// Patient, claim or provider identifier; dropped.
    Identifier,
    /// Anything else; passes through as numeric.
    DerivedNumeric,
}

impl ColumnRole {
    /// Roles whose encodings are collapsed into the code-burden feature.
    pub fn is_burden_source(&self) -> bool {
        matches!(
            self,
            ColumnRole::DiagnosticCode | ColumnRole::PresenceFlag | ColumnRole::StatusCode
        )
    }
}

impl std::fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColumnRole::Date => "date",
            ColumnRole::DiagnosticCode => "diagnostic_code",
            ColumnRole::PresenceFlag => "presence_flag",
            ColumnRole::StatusCode => "status_code",
            ColumnRole::Identifier => "identifier",
            ColumnRole::DerivedNumeric => "derived_numeric",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burden_sources() {
        assert!(ColumnRole::DiagnosticCode.is_burden_source());
        assert!(ColumnRole::PresenceFlag.is_burden_source());
        assert!(ColumnRole::StatusCode.is_burden_source());
        assert!(!ColumnRole::Date.is_burden_source());
        assert!(!ColumnRole::Identifier.is_burden_source());
        assert!(!ColumnRole::DerivedNumeric.is_burden_source());
    }

    #[test]
    fn role_display_matches_serde() {
        let json = serde_json::to_string(&ColumnRole::PresenceFlag).unwrap();
        assert_eq!(json, format!("\"{}\"", ColumnRole::PresenceFlag));
    }
}
