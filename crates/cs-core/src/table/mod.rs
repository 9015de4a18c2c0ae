//! In-memory record table.
//!
//! A [`RecordTable`] is an ordered set of equally long, uniquely named
//! columns. Each column is either numeric (`f64`, NaN for missing) or text
//! (`Option<String>`, `None` for missing). Stages take the table by value
//! and hand a new one to the next stage.

pub mod csv;

pub use self::csv::{is_missing_token, read_csv, read_csv_path, write_matrix_csv};

use cs_common::ValueKind;
use cs_math::{Matrix, ShapeError};
use thiserror::Error;

/// Errors raised while building or reading a record table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("input has no header row")]
    MissingHeader,

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("line {line}: expected {expected} fields, found {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("column '{column}' has {found} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("column '{0}' is not numeric")]
    NotNumeric(String),

    #[error(transparent)]
    Matrix(#[from] ShapeError),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TableError> for cs_common::Error {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Io(e) => cs_common::Error::Io(e),
            TableError::LengthMismatch { .. } | TableError::Matrix(_) => {
                cs_common::Error::Shape(err.to_string())
            }
            other => cs_common::Error::Ingest(other.to_string()),
        }
    }
}

/// Cell storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ColumnData::Numeric(_) => ValueKind::Numeric,
            ColumnData::Text(_) => ValueKind::Text,
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.data.kind()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Text(_) => None,
        }
    }
}

/// Ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordTable {
    n_rows: usize,
    columns: Vec<Column>,
}

impl RecordTable {
    /// An empty table that will hold `n_rows` rows.
    pub fn with_rows(n_rows: usize) -> Self {
        Self {
            n_rows,
            columns: Vec::new(),
        }
    }

    /// Build a table, checking names are unique and lengths agree.
    ///
    /// `n_rows` is taken from the first column; a table with no columns has
    /// zero rows.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        let mut table = Self::with_rows(n_rows);
        for column in columns {
            table.push(column)?;
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Name and value kind of every column, in order.
    pub fn schema(&self) -> Vec<(String, ValueKind)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.kind()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Append a column.
    pub fn push(&mut self, column: Column) -> Result<(), TableError> {
        if self.contains(&column.name) {
            return Err(TableError::DuplicateColumn(column.name));
        }
        let found = column.len();
        if found != self.n_rows {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.n_rows,
                found,
            });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Remove and return a column by name.
    pub fn remove(&mut self, name: &str) -> Option<Column> {
        let pos = self.position(name)?;
        Some(self.columns.remove(pos))
    }

    /// Dense row-major matrix of an all-numeric table.
    pub fn to_matrix(&self) -> Result<Matrix, TableError> {
        let mut data = Vec::with_capacity(self.n_rows * self.columns.len());
        let numeric: Vec<&[f64]> = self
            .columns
            .iter()
            .map(|c| c.as_numeric().ok_or_else(|| TableError::NotNumeric(c.name.clone())))
            .collect::<Result<_, _>>()?;
        for row in 0..self.n_rows {
            data.extend(numeric.iter().map(|col| col[row]));
        }
        Ok(Matrix::from_vec(self.n_rows, self.columns.len(), data)?)
    }
}
