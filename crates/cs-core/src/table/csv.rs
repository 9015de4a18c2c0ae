//! Delimited-file ingest and export.
//!
//! Reading infers a value kind per column: a column is numeric when every
//! non-missing cell parses as `f64`, text otherwise. The usual spreadsheet
//! and dataframe missing tokens read as missing. A cell holding only
//! whitespace is an observed blank, not a missing value; numeric inference
//! still reads it as NaN.

use super::{Column, RecordTable, TableError};
use cs_math::Matrix;
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Cell values read as missing.
const MISSING_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Whether a raw cell value denotes a missing value.
pub fn is_missing_token(cell: &str) -> bool {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return cell.is_empty();
    }
    MISSING_TOKENS.contains(&trimmed)
}

/// Read a record table from a CSV file.
pub fn read_csv_path(path: &Path) -> Result<RecordTable, TableError> {
    let file = File::open(path)?;
    let table = read_csv(file)?;
    info!(
        path = %path.display(),
        rows = table.n_rows(),
        columns = table.n_cols(),
        "Record table loaded"
    );
    Ok(table)
}

/// Read a record table from any CSV source with a header row.
pub fn read_csv<R: Read>(source: R) -> Result<RecordTable, TableError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
        return Err(TableError::MissingHeader);
    }
    let mut seen = HashSet::new();
    for name in &headers {
        if !seen.insert(name.as_str()) {
            return Err(TableError::DuplicateColumn(name.clone()));
        }
    }

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(TableError::RaggedRow {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: headers.len(),
                found: record.len(),
            });
        }
        for (col, cell) in cells.iter_mut().zip(record.iter()) {
            col.push(if is_missing_token(cell) {
                None
            } else {
                Some(cell.to_string())
            });
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| infer_column(name, values))
        .collect();
    RecordTable::from_columns(columns)
}

fn infer_column(name: String, values: Vec<Option<String>>) -> Column {
    let parsed: Option<Vec<f64>> = values
        .iter()
        .map(|cell| match cell {
            None => Some(f64::NAN),
            Some(s) if s.trim().is_empty() => Some(f64::NAN),
            Some(s) => s.trim().parse::<f64>().ok(),
        })
        .collect();

    match parsed {
        Some(numbers) => {
            debug!(column = %name, "inferred numeric");
            Column::numeric(name, numbers)
        }
        None => {
            debug!(column = %name, "inferred text");
            Column::text(name, values)
        }
    }
}

/// Write a numeric matrix as CSV: header row, no index column.
///
/// Missing values are written as empty cells.
pub fn write_matrix_csv<W: Write>(
    sink: W,
    headers: &[String],
    matrix: &Matrix,
) -> Result<(), TableError> {
    let mut writer = ::csv::Writer::from_writer(sink);
    writer.write_record(headers)?;
    for row in matrix.iter_rows() {
        writer.write_record(row.iter().map(|v| format_cell(*v)))?;
    }
    writer.flush()?;
    Ok(())
}

fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}
