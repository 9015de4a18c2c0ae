//! Feature normalization.
//!
//! Turns a classified record table into an all-numeric table with the same
//! row count:
//!
//! - identifiers are dropped
//! - dates are digit-packed, then the configured date differences are
//!   derived and their source columns dropped
//! - diagnostic codes, presence flags and status codes are encoded, summed
//!   row-wise into the code-burden feature and dropped
//! - remaining text columns are coerced to numbers
//!
//! Output column order: surviving columns in input order, then the derived
//! date differences in configuration order, then the code-burden column.

pub mod dates;
pub mod encode;

use crate::classify::ColumnRoles;
use crate::table::{Column, ColumnData, RecordTable, TableError};
use cs_common::{ColumnRole, Diagnostic, PipelineStage};
use cs_config::SchemaConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use self::dates::{encode_timestamp, parse_timestamp, timestamp_from_number};
use self::encode::{first_code_point, numeric_label, LabelEncoder};

/// Output of the normalizer.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: RecordTable,
    pub diagnostics: Vec<Diagnostic>,
    pub summary: NormalizeSummary,
}

/// Shape facts about one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeSummary {
    pub input_columns: usize,
    pub output_columns: usize,
    pub dropped_identifiers: Vec<String>,
    pub derived_features: Vec<String>,
    pub burden_sources: Vec<String>,
    pub parse_failures: usize,
}

/// Role-driven column transforms.
pub struct FeatureNormalizer<'a> {
    schema: &'a SchemaConfig,
}

impl<'a> FeatureNormalizer<'a> {
    pub fn new(schema: &'a SchemaConfig) -> Self {
        Self { schema }
    }

    /// Normalize `table` according to `roles`.
    ///
    /// Columns without an entry in `roles` are treated as derived numeric.
    pub fn normalize(
        &self,
        table: RecordTable,
        roles: &ColumnRoles,
    ) -> Result<Normalized, TableError> {
        let n_rows = table.n_rows();
        let mut summary = NormalizeSummary {
            input_columns: table.n_cols(),
            ..Default::default()
        };
        let mut diagnostics = Vec::new();
        let mut kept: Vec<Column> = Vec::new();
        let mut burden: Vec<Vec<f64>> = Vec::new();

        for column in table.into_columns() {
            let role = roles
                .role_of(&column.name)
                .unwrap_or(ColumnRole::DerivedNumeric);
            let name = column.name;

            let (values, failures) = match role {
                ColumnRole::Identifier => {
                    debug!(column = %name, "dropping identifier");
                    summary.dropped_identifiers.push(name);
                    continue;
                }
                ColumnRole::Date => encode_dates(column.data),
                ColumnRole::DiagnosticCode => (encode_codes(column.data), 0),
                ColumnRole::PresenceFlag => {
                    let missing = self.schema.presence_missing.as_str();
                    (encode_labels(column.data, missing, true), 0)
                }
                ColumnRole::StatusCode => {
                    let missing = self.schema.status_missing.to_string();
                    (encode_labels(column.data, &missing, false), 0)
                }
                ColumnRole::DerivedNumeric => coerce_numeric(column.data),
            };

            if failures > 0 {
                summary.parse_failures += failures;
                diagnostics.push(Diagnostic::parse_failures(
                    PipelineStage::Normalize,
                    name.clone(),
                    failures,
                ));
            }

            if role.is_burden_source() {
                summary.burden_sources.push(name);
                burden.push(values);
            } else {
                kept.push(Column::numeric(name, values));
            }
        }

        let mut out = RecordTable::from_columns(kept)?;
        if out.n_cols() == 0 {
            out = RecordTable::with_rows(n_rows);
        }

        // Date differences: compute every feature first, then drop sources.
        let mut consumed: HashSet<String> = HashSet::new();
        let mut derived = Vec::new();
        for diff in &self.schema.date_differences {
            let end = out.column(&diff.end).and_then(Column::as_numeric);
            let start = out.column(&diff.start).and_then(Column::as_numeric);
            match (end, start) {
                (Some(end), Some(start)) => {
                    let values: Vec<f64> = end.iter().zip(start).map(|(e, s)| e - s).collect();
                    derived.push(Column::numeric(diff.name.clone(), values));
                    consumed.insert(diff.end.clone());
                    consumed.insert(diff.start.clone());
                    summary.derived_features.push(diff.name.clone());
                }
                _ => {
                    for source in [&diff.end, &diff.start] {
                        if !out.contains(source) {
                            warn!(feature = %diff.name, column = %source, "date-difference source missing; feature skipped");
                            diagnostics.push(Diagnostic::schema_mismatch(
                                PipelineStage::Normalize,
                                source.clone(),
                                "date-difference source",
                            ));
                        }
                    }
                }
            }
        }
        for source in &consumed {
            out.remove(source);
        }
        for column in derived {
            drop_shadowed(&mut out, &column.name, &mut diagnostics);
            out.push(column)?;
        }

        let code_burden = row_sums(&burden, n_rows);
        drop_shadowed(&mut out, &self.schema.code_burden_column, &mut diagnostics);
        out.push(Column::numeric(
            self.schema.code_burden_column.clone(),
            code_burden,
        ))?;

        summary.output_columns = out.n_cols();
        debug!(
            rows = n_rows,
            input_columns = summary.input_columns,
            output_columns = summary.output_columns,
            "normalization complete"
        );

        Ok(Normalized {
            table: out,
            diagnostics,
            summary,
        })
    }
}

/// Derived features own their names: a pass-through input column with the
/// same name is removed and reported.
fn drop_shadowed(out: &mut RecordTable, name: &str, diagnostics: &mut Vec<Diagnostic>) {
    if out.remove(name).is_some() {
        warn!(column = %name, "input column replaced by derived feature");
        diagnostics.push(Diagnostic::name_conflict(PipelineStage::Normalize, name));
    }
}

/// Digit-pack every cell; returns values and the number of unparseable
/// observed cells.
fn encode_dates(data: ColumnData) -> (Vec<f64>, usize) {
    let mut failures = 0;
    let values = match data {
        ColumnData::Numeric(cells) => cells
            .into_iter()
            .map(|v| {
                if v.is_nan() {
                    return f64::NAN;
                }
                match timestamp_from_number(v) {
                    Some(ts) => encode_timestamp(&ts),
                    None => {
                        failures += 1;
                        f64::NAN
                    }
                }
            })
            .collect(),
        ColumnData::Text(cells) => cells
            .into_iter()
            .map(|cell| {
                let Some(raw) = cell.filter(|s| !s.trim().is_empty()) else {
                    return f64::NAN;
                };
                match parse_timestamp(&raw) {
                    Some(ts) => encode_timestamp(&ts),
                    None => {
                        failures += 1;
                        f64::NAN
                    }
                }
            })
            .collect(),
    };
    (values, failures)
}

fn encode_codes(data: ColumnData) -> Vec<f64> {
    match data {
        ColumnData::Text(cells) => cells
            .iter()
            .map(|cell| first_code_point(cell.as_deref()))
            .collect(),
        ColumnData::Numeric(cells) => cells
            .iter()
            .map(|v| {
                if v.is_nan() {
                    f64::NAN
                } else {
                    first_code_point(Some(&numeric_label(*v)))
                }
            })
            .collect(),
    }
}

/// Fill missing cells with `missing`, then label-encode the column.
fn encode_labels(data: ColumnData, missing: &str, trim: bool) -> Vec<f64> {
    let labels: Vec<String> = match data {
        ColumnData::Text(cells) => cells
            .into_iter()
            .map(|cell| match cell {
                Some(s) if trim => s.trim().to_string(),
                Some(s) => s,
                None => missing.to_string(),
            })
            .collect(),
        ColumnData::Numeric(cells) => cells
            .into_iter()
            .map(|v| {
                if v.is_nan() {
                    missing.to_string()
                } else {
                    numeric_label(v)
                }
            })
            .collect(),
    };
    LabelEncoder::fit_transform(labels.iter().map(String::as_str)).0
}

fn coerce_numeric(data: ColumnData) -> (Vec<f64>, usize) {
    match data {
        ColumnData::Numeric(cells) => (cells, 0),
        ColumnData::Text(cells) => {
            let mut failures = 0;
            let values = cells
                .iter()
                .map(|cell| match cell {
                    None => f64::NAN,
                    Some(s) if s.trim().is_empty() => f64::NAN,
                    Some(s) => s.trim().parse::<f64>().unwrap_or_else(|_| {
                        failures += 1;
                        f64::NAN
                    }),
                })
                .collect();
            (values, failures)
        }
    }
}

/// NaN-skipping row sums over column-major inputs.
fn row_sums(columns: &[Vec<f64>], n_rows: usize) -> Vec<f64> {
    (0..n_rows)
        .map(|row| {
            columns
                .iter()
                .map(|col| col[row])
                .filter(|v| !v.is_nan())
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ColumnClassifier;
    use cs_common::{DiagnosticKind, ValueKind};

    fn text(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    fn run(table: RecordTable) -> Normalized {
        let schema = SchemaConfig::default();
        let roles = ColumnClassifier::new(&schema).classify(&table.schema()).roles;
        FeatureNormalizer::new(&schema)
            .normalize(table, &roles)
            .unwrap()
    }

    fn claims_table() -> RecordTable {
        RecordTable::from_columns(vec![
            Column::text("BENE_ID", text(&[Some("A1"), Some("A2"), Some("A3")])),
            Column::numeric("CLM_PMT_AMT", vec![100.0, 250.0, f64::NAN]),
            Column::numeric("CLM_ADMSN_DT", vec![20080101.0, 20080110.0, 20080301.0]),
            Column::numeric("NCH_BENE_DSCHRG_DT", vec![20080105.0, 20080101.0, f64::NAN]),
            Column::text(
                "CLM_FROM_DT",
                text(&[Some("2008-01-01"), Some("garbage"), Some("2008-03-01")]),
            ),
            Column::text(
                "CLM_THRU_DT",
                text(&[Some("2008-01-05"), Some("2008-01-10"), Some("2008-03-04")]),
            ),
            Column::text("ICD9_DGNS_CD_1", text(&[Some("4019"), Some("V5861"), None])),
            Column::text("CLM_POA_IND_SW1", text(&[Some(" Y "), None, Some("N")])),
            Column::numeric("CLM_DRG_CD", vec![1.0, f64::NAN, 1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_output_shape_and_order() {
        let out = run(claims_table());
        assert_eq!(out.table.n_rows(), 3);
        assert_eq!(
            out.table.column_names(),
            vec!["CLM_PMT_AMT", "length_of_stay", "statement_days", "code_burden"]
        );
        assert!(out.table.columns().iter().all(|c| c.kind() == ValueKind::Numeric));
        assert_eq!(out.summary.dropped_identifiers, vec!["BENE_ID"]);
    }

    #[test]
    fn test_negative_date_difference_preserved() {
        let out = run(claims_table());
        let los = out.table.column("length_of_stay").unwrap().as_numeric().unwrap();
        assert_eq!(los[0], 20080105000000.0 - 20080101000000.0);
        // discharge before admission stays negative
        assert_eq!(los[1], 20080101000000.0 - 20080110000000.0);
        assert!(los[1] < 0.0);
        assert!(los[2].is_nan());
    }

    #[test]
    fn test_date_parse_failure_is_diagnostic() {
        let out = run(claims_table());
        let stmt = out.table.column("statement_days").unwrap().as_numeric().unwrap();
        assert!(stmt[1].is_nan());
        let failure = out
            .diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::ParseFailure)
            .unwrap();
        assert_eq!(failure.column, "CLM_FROM_DT");
        assert_eq!(failure.count, 1);
        assert_eq!(out.summary.parse_failures, 1);
    }

    #[test]
    fn test_code_burden_is_row_sum_of_encodings() {
        let out = run(claims_table());
        // ICD9_DGNS_CD_1: '4'=52, 'V'=86, missing=NaN
        // CLM_POA_IND_SW1: "Y"→0, "U"→1, "N"→2
        // CLM_DRG_CD: "1"→0, "-1"→1, "1"→0
        let burden = out.table.column("code_burden").unwrap().as_numeric().unwrap();
        assert_eq!(burden, &[52.0, 86.0 + 1.0 + 1.0, 2.0]);
        assert_eq!(
            out.summary.burden_sources,
            vec!["ICD9_DGNS_CD_1", "CLM_POA_IND_SW1", "CLM_DRG_CD"]
        );
    }

    #[test]
    fn test_missing_date_source_skips_feature() {
        let table = RecordTable::from_columns(vec![
            Column::numeric("CLM_FROM_DT", vec![20080101.0]),
            Column::numeric("CLM_THRU_DT", vec![20080103.0]),
        ])
        .unwrap();
        let out = run(table);
        assert_eq!(out.table.column_names(), vec!["statement_days", "code_burden"]);
        let mismatches: Vec<&str> = out
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::SchemaMismatch)
            .map(|d| d.column.as_str())
            .collect();
        assert_eq!(mismatches, vec!["NCH_BENE_DSCHRG_DT", "CLM_ADMSN_DT"]);
    }

    #[test]
    fn test_blank_presence_flag_is_not_missing() {
        let table = RecordTable::from_columns(vec![
            Column::text("CLM_POA_IND_SW1", text(&[Some("Y"), Some("  "), None])),
            Column::text("NOTE", text(&[Some(" "), Some("2"), None])),
        ])
        .unwrap();
        let out = run(table);
        // "Y"→0, blank→1, "U"→2
        let burden = out.table.column("code_burden").unwrap().as_numeric().unwrap();
        assert_eq!(burden, &[0.0, 1.0, 2.0]);
        // blanks coerce to NaN without counting as failures
        let note = out.table.column("NOTE").unwrap().as_numeric().unwrap();
        assert!(note[0].is_nan());
        assert_eq!(note[1], 2.0);
        assert_eq!(out.summary.parse_failures, 0);
    }

    #[test]
    fn test_derived_feature_replaces_same_named_input() {
        let table = RecordTable::from_columns(vec![
            Column::numeric("CLM_PMT_AMT", vec![10.0, 20.0]),
            Column::numeric("code_burden", vec![7.0, 9.0]),
            Column::numeric("length_of_stay", vec![3.0, 4.0]),
            Column::numeric("CLM_ADMSN_DT", vec![20080101.0, 20080110.0]),
            Column::numeric("NCH_BENE_DSCHRG_DT", vec![20080105.0, 20080111.0]),
        ])
        .unwrap();
        let out = run(table);
        assert_eq!(
            out.table.column_names(),
            vec!["CLM_PMT_AMT", "length_of_stay", "code_burden"]
        );
        let los = out.table.column("length_of_stay").unwrap().as_numeric().unwrap();
        assert_eq!(los[0], 20080105000000.0 - 20080101000000.0);
        // no code sources, so the derived burden is all zeros
        let burden = out.table.column("code_burden").unwrap().as_numeric().unwrap();
        assert_eq!(burden, &[0.0, 0.0]);
        let conflicts: Vec<&str> = out
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::NameConflict)
            .map(|d| d.column.as_str())
            .collect();
        assert_eq!(conflicts, vec!["length_of_stay", "code_burden"]);
    }

    #[test]
    fn test_unmatched_text_is_coerced() {
        let table = RecordTable::from_columns(vec![Column::text(
            "NOTE",
            text(&[Some("1.5"), Some("abc"), None]),
        )])
        .unwrap();
        let out = run(table);
        let note = out.table.column("NOTE").unwrap().as_numeric().unwrap();
        assert_eq!(note[0], 1.5);
        assert!(note[1].is_nan() && note[2].is_nan());
        assert_eq!(out.summary.parse_failures, 1);
    }

    #[test]
    fn test_no_burden_sources_yields_zero_column() {
        let table =
            RecordTable::from_columns(vec![Column::numeric("x", vec![1.0, 2.0])]).unwrap();
        let out = run(table);
        let burden = out.table.column("code_burden").unwrap().as_numeric().unwrap();
        assert_eq!(burden, &[0.0, 0.0]);
    }

    #[test]
    fn test_only_identifiers_keeps_row_count() {
        let table = RecordTable::from_columns(vec![Column::text(
            "CLM_ID",
            text(&[Some("1"), Some("2")]),
        )])
        .unwrap();
        let out = run(table);
        assert_eq!(out.table.n_rows(), 2);
        assert_eq!(out.table.column_names(), vec!["code_burden"]);
    }
}
