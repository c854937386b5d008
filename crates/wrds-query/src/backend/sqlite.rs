//! Embedded SQLite backend for local mirrors of WRDS tables.
//!
//! Dates are stored as ISO text. The connection registers the scalar
//! functions the CRSP value-weight query relies on: `fiscal_year(date,
//! month, last)`, `ln` and `exp`.

use crate::error::Result;
use crate::schema::{ColumnDef, ColumnType, SchemaProvider, TableDef};
use crate::session::{QueryExecutor, RowCursor};
use crate::sql::Dialect;
use crate::value::{Row, Value};
use chrono::{Datelike, Months, NaiveDate};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use std::collections::VecDeque;
use std::path::Path;

/// SQLite database used as schema provider and executor.
///
/// [`QueryExecutor::query`] reads the whole result set before returning its
/// cursor, so chunked fetching bounds the size of each panel batch but not
/// the memory held by the rows. Local mirrors that outgrow memory should be
/// read through narrower date ranges or a `limit`.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        register_functions(&conn)?;
        Ok(Self { conn })
    }

    /// The underlying connection.
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// End (`last`) or start of the fiscal year ending in `month` that contains
/// `date`.
pub fn fiscal_year_bound(date: NaiveDate, month: u32, last: bool) -> Option<NaiveDate> {
    let end_year = if date.month() <= month {
        date.year()
    } else {
        date.year() + 1
    };
    if last {
        NaiveDate::from_ymd_opt(end_year, month, 1)?
            .checked_add_months(Months::new(1))?
            .pred_opt()
    } else {
        NaiveDate::from_ymd_opt(end_year - 1, month, 1)?.checked_add_months(Months::new(1))
    }
}

fn register_functions(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("fiscal_year", 3, flags, |ctx| {
        let date: Option<String> = ctx.get(0)?;
        let month: i64 = ctx.get(1)?;
        let last: bool = ctx.get(2)?;

        let month = u32::try_from(month).ok().filter(|m| (1..=12).contains(m));
        let bound = date
            .and_then(|text| Value::Text(text).as_date().ok().flatten())
            .zip(month)
            .and_then(|(date, month)| fiscal_year_bound(date, month, last));
        Ok(bound.map(|d| d.format("%Y-%m-%d").to_string()))
    })?;

    conn.create_scalar_function("ln", 1, flags, |ctx| {
        let x: Option<f64> = ctx.get(0)?;
        Ok(x.filter(|x| *x > 0.0).map(f64::ln))
    })?;

    conn.create_scalar_function("exp", 1, flags, |ctx| {
        let x: Option<f64> = ctx.get(0)?;
        Ok(x.map(f64::exp))
    })?;

    Ok(())
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Cursor over a fully read result set.
#[derive(Debug)]
struct BufferedCursor {
    columns: Vec<String>,
    rows: VecDeque<Row>,
}

impl RowCursor for BufferedCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch_many(&mut self, size: usize) -> Result<Vec<Row>> {
        let n = size.min(self.rows.len());
        Ok(self.rows.drain(..n).collect())
    }
}

impl SchemaProvider for SqliteBackend {
    fn table(&self, name: &str) -> Result<Option<TableDef>> {
        let mut statement = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let columns = statement
            .query_map(params![name], |row| {
                let declared: String = row.get(1)?;
                Ok(ColumnDef {
                    name: row.get(0)?,
                    column_type: ColumnType::from_sql(&declared),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if columns.is_empty() {
            return Ok(None);
        }
        Ok(Some(TableDef {
            name: name.to_string(),
            columns,
        }))
    }
}

impl QueryExecutor for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Runs `sql` to completion and buffers every row; `fetch_many` then
    /// drains the buffer.
    fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor + '_>> {
        let mut statement = self.conn.prepare(sql)?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let mut buffered = VecDeque::new();
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| row.get_ref(i).map(to_value))
                .collect::<rusqlite::Result<Row>>()?;
            buffered.push_back(values);
        }

        Ok(Box::new(BufferedCursor {
            columns,
            rows: buffered,
        }))
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}
