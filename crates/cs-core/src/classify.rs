//! Column classification.
//!
//! Assigns exactly one [`ColumnRole`] to every column from its name and
//! inferred value kind. Rules are checked in a fixed order and the first
//! match wins:
//!
//! 1. name in the identifier drop-list → `Identifier`
//! 2. name in the status-code list → `StatusCode`
//! 3. name contains the date marker, or is a date alias → `Date`
//! 4. text column whose name contains a code marker → `DiagnosticCode`
//! 5. text column whose name contains the presence marker → `PresenceFlag`
//! 6. anything else → `DerivedNumeric`
//!
//! Role-list entries absent from the table are reported as
//! schema-mismatch diagnostics, never as errors.

use cs_common::{ColumnRole, Diagnostic, PipelineStage, ValueKind};
use cs_config::SchemaConfig;
use serde::Serialize;
use std::collections::BTreeMap;

/// Role assignment for every column of a table, in column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColumnRoles {
    entries: Vec<(String, ColumnRole)>,
}

impl ColumnRoles {
    pub fn role_of(&self, name: &str) -> Option<ColumnRole> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, role)| *role)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnRole)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), *r))
    }

    /// Names of the columns holding `role`, in column order.
    pub fn columns_with(&self, role: ColumnRole) -> Vec<&str> {
        self.iter()
            .filter(|(_, r)| *r == role)
            .map(|(n, _)| n)
            .collect()
    }

    /// Number of columns per role.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (_, role) in &self.entries {
            *counts.entry(role.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of classifying a table.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub roles: ColumnRoles,
    pub diagnostics: Vec<Diagnostic>,
}

/// Name- and kind-based column classifier.
pub struct ColumnClassifier<'a> {
    schema: &'a SchemaConfig,
}

impl<'a> ColumnClassifier<'a> {
    pub fn new(schema: &'a SchemaConfig) -> Self {
        Self { schema }
    }

    /// Role for a single column.
    pub fn role_of(&self, name: &str, kind: ValueKind) -> ColumnRole {
        let s = self.schema;
        if s.identifier_columns.iter().any(|c| c == name) {
            ColumnRole::Identifier
        } else if s.status_columns.iter().any(|c| c == name) {
            ColumnRole::StatusCode
        } else if name.contains(s.date_marker.as_str())
            || s.date_aliases.iter().any(|c| c == name)
        {
            ColumnRole::Date
        } else if kind == ValueKind::Text
            && s.code_markers.iter().any(|m| name.contains(m.as_str()))
        {
            ColumnRole::DiagnosticCode
        } else if kind == ValueKind::Text && name.contains(s.presence_marker.as_str()) {
            ColumnRole::PresenceFlag
        } else {
            ColumnRole::DerivedNumeric
        }
    }

    /// Classify every column of a table schema.
    pub fn classify(&self, columns: &[(String, ValueKind)]) -> Classification {
        let entries: Vec<(String, ColumnRole)> = columns
            .iter()
            .map(|(name, kind)| (name.clone(), self.role_of(name, *kind)))
            .collect();

        let present = |name: &str| columns.iter().any(|(n, _)| n == name);
        let mut diagnostics = Vec::new();
        let expected = [
            ("identifier", &self.schema.identifier_columns),
            ("status-code", &self.schema.status_columns),
            ("date alias", &self.schema.date_aliases),
        ];
        for (label, list) in expected {
            for name in list.iter().filter(|n| !present(n.as_str())) {
                diagnostics.push(Diagnostic::schema_mismatch(
                    PipelineStage::Classify,
                    name.clone(),
                    label,
                ));
            }
        }

        Classification {
            roles: ColumnRoles { entries },
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_common::DiagnosticKind;

    fn cols(spec: &[(&str, ValueKind)]) -> Vec<(String, ValueKind)> {
        spec.iter().map(|(n, k)| (n.to_string(), *k)).collect()
    }

    #[test]
    fn test_role_rules() {
        let schema = SchemaConfig::default();
        let c = ColumnClassifier::new(&schema);
        use ValueKind::*;

        assert_eq!(c.role_of("BENE_ID", Text), ColumnRole::Identifier);
        assert_eq!(c.role_of("CLM_DRG_CD", Numeric), ColumnRole::StatusCode);
        assert_eq!(c.role_of("CLM_ADMSN_DT", Numeric), ColumnRole::Date);
        assert_eq!(c.role_of("NCH_ACTV_OR_CVRD_LVL_CARE_THRU", Numeric), ColumnRole::Date);
        assert_eq!(c.role_of("ICD9_DGNS_CD_1", Text), ColumnRole::DiagnosticCode);
        assert_eq!(c.role_of("ICD9_PRCDR_CD_3", Text), ColumnRole::DiagnosticCode);
        assert_eq!(c.role_of("HCPCS_CD_7", Text), ColumnRole::DiagnosticCode);
        assert_eq!(c.role_of("CLM_POA_IND_SW1", Text), ColumnRole::PresenceFlag);
        assert_eq!(c.role_of("CLM_PMT_AMT", Numeric), ColumnRole::DerivedNumeric);
    }

    #[test]
    fn test_code_markers_need_text() {
        let schema = SchemaConfig::default();
        let c = ColumnClassifier::new(&schema);
        assert_eq!(
            c.role_of("ICD9_DGNS_CD_25", ValueKind::Numeric),
            ColumnRole::DerivedNumeric
        );
        assert_eq!(
            c.role_of("CLM_POA_IND_SW25", ValueKind::Numeric),
            ColumnRole::DerivedNumeric
        );
    }

    #[test]
    fn test_precedence_is_first_match() {
        let mut schema = SchemaConfig::default();
        schema.status_columns.push("ADMTG_DGNS_DT".to_string());
        let c = ColumnClassifier::new(&schema);
        // Status list beats both the date and the code marker
        assert_eq!(c.role_of("ADMTG_DGNS_DT", ValueKind::Text), ColumnRole::StatusCode);
        // Date marker beats code marker
        assert_eq!(c.role_of("DGNS_EFF_DT", ValueKind::Text), ColumnRole::Date);
    }

    #[test]
    fn test_missing_role_list_columns_are_diagnostics() {
        let schema = SchemaConfig::default();
        let columns = cols(&[
            ("BENE_ID", ValueKind::Text),
            ("CLM_PMT_AMT", ValueKind::Numeric),
        ]);
        let result = ColumnClassifier::new(&schema).classify(&columns);

        assert_eq!(result.roles.len(), 2);
        assert_eq!(result.roles.role_of("BENE_ID"), Some(ColumnRole::Identifier));
        let expected_missing =
            schema.identifier_columns.len() - 1 + schema.status_columns.len() + schema.date_aliases.len();
        assert_eq!(result.diagnostics.len(), expected_missing);
        assert!(result
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::SchemaMismatch && d.stage == PipelineStage::Classify));
        assert!(!result.diagnostics.iter().any(|d| d.column == "BENE_ID"));
    }

    #[test]
    fn test_roles_total_and_ordered() {
        let schema = SchemaConfig::default();
        let columns = cols(&[
            ("CLM_FROM_DT", ValueKind::Numeric),
            ("ICD9_DGNS_CD_1", ValueKind::Text),
            ("x", ValueKind::Numeric),
        ]);
        let roles = ColumnClassifier::new(&schema).classify(&columns).roles;
        let names: Vec<&str> = roles.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["CLM_FROM_DT", "ICD9_DGNS_CD_1", "x"]);
        assert_eq!(roles.columns_with(ColumnRole::Date), vec!["CLM_FROM_DT"]);
        assert_eq!(roles.counts()["derived_numeric"], 1);
    }
}
