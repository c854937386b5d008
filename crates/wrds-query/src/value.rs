//! Raw result rows as returned by an executor.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single value of a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point (numeric and decimal columns arrive here)
    Float(f64),
    /// Text
    Text(String),
    /// Calendar date
    Date(NaiveDate),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Whether the value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Best-effort numeric view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(v) => Some(f64::from(u8::from(*v))),
            _ => None,
        }
    }

    /// Date view of the value, parsing text in ISO form.
    ///
    /// Returns `Ok(None)` for NULL and `Err` with the offending text when the
    /// value cannot be read as a date.
    pub fn as_date(&self) -> std::result::Result<Option<NaiveDate>, String> {
        match self {
            Self::Null => Ok(None),
            Self::Date(d) => Ok(Some(*d)),
            Self::Timestamp(t) => Ok(Some(t.date())),
            Self::Text(s) => parse_date(s).map(Some).ok_or_else(|| s.clone()),
            other => Err(format!("{other:?}")),
        }
    }

    /// Timestamp view of the value, parsing text in ISO form. Dates read as
    /// midnight.
    pub fn as_timestamp(&self) -> std::result::Result<Option<NaiveDateTime>, String> {
        match self {
            Self::Null => Ok(None),
            Self::Timestamp(t) => Ok(Some(*t)),
            Self::Date(d) => Ok(d.and_hms_opt(0, 0, 0)),
            Self::Text(s) => parse_timestamp(s).map(Some).ok_or_else(|| s.clone()),
            other => Err(format!("{other:?}")),
        }
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|t| t.date())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.date())
        })
        .or_else(|| NaiveDate::parse_from_str(text, "%Y%m%d").ok())
}

/// A result row, positionally aligned with its batch's column names.
pub type Row = Vec<Value>;

/// A batch of result rows with the column names they share.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    /// Column names in result order
    pub columns: Vec<String>,
    /// Rows, each as long as `columns`
    pub rows: Vec<Row>,
}

impl RowBatch {
    /// Create a batch from column names and rows.
    pub const fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate over one column's values.
    pub fn values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).unwrap_or(&Value::Null))
    }
}
