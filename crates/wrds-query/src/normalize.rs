//! Result rows to panel.
//!
//! [`PanelNormalizer`] turns a batch of raw rows into a polars [`DataFrame`]:
//!
//! 1. every column is coerced to a typed series, configured date and
//!    timestamp columns are parsed from text and anything unreadable becomes
//!    null;
//! 2. the effective `date` is derived from the source date, moved forward by
//!    the disclosure delay in month ends;
//! 3. an announcement date replaces the effective date when it falls strictly
//!    between zero and 182 days after it;
//! 4. rows sharing an (entity, date) key keep their first occurrence;
//! 5. the entity and `date` columns lead the frame.

use crate::error::{QueryError, Result};
use crate::value::{RowBatch, Value};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use wrds_panel::temporal::shift_month_end;
use wrds_panel::{DATE_COLUMN, EntityKey, Formula, derive_panel};

/// Days from 0001-01-01 to the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Announcements later than this many days after the effective date are
/// treated as unrelated to the period.
const MAX_ANNOUNCEMENT_DAYS: i64 = 182;

pub(crate) fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Shapes raw result batches into keyed panels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelNormalizer {
    entity: Option<EntityKey>,
    effective_date: Option<String>,
    date_columns: Vec<String>,
    timestamp_columns: Vec<String>,
    delay_months: u32,
    announcement: Option<String>,
    dedup: bool,
    formulas: Vec<Formula>,
}

impl PanelNormalizer {
    /// Normalizer that only coerces values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier namespace of the panel.
    pub const fn with_entity(mut self, entity: EntityKey) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Column the effective `date` is derived from.
    pub fn with_effective_date(mut self, column: impl Into<String>) -> Self {
        self.effective_date = Some(column.into());
        self
    }

    /// Columns parsed as dates.
    pub fn with_date_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Columns parsed as timestamps.
    pub fn with_timestamp_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.timestamp_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Months until the data becomes public; zero keeps the source date.
    pub const fn with_delay_months(mut self, months: u32) -> Self {
        self.delay_months = months;
        self
    }

    /// Announcement date column that may replace the effective date.
    pub fn with_announcement(mut self, column: impl Into<String>) -> Self {
        self.announcement = Some(column.into());
        self
    }

    /// Keep only the first row of each (entity, date) key.
    pub const fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    /// Formulas applied to the assembled panel.
    pub fn with_formulas(mut self, formulas: Vec<Formula>) -> Self {
        self.formulas = formulas;
        self
    }

    /// Identifier namespace, if the panel has one.
    pub const fn entity(&self) -> Option<EntityKey> {
        self.entity
    }

    /// Formulas applied by [`Self::derive`].
    pub fn formulas(&self) -> &[Formula] {
        &self.formulas
    }

    /// Disclosure delay in months.
    pub const fn delay_months(&self) -> u32 {
        self.delay_months
    }

    fn is_date_column(&self, name: &str) -> bool {
        self.date_columns.iter().any(|c| c == name)
    }

    fn is_timestamp_column(&self, name: &str) -> bool {
        self.timestamp_columns.iter().any(|c| c == name)
    }

    fn index_of(batch: &RowBatch, column: &str) -> Result<usize> {
        batch
            .column_index(column)
            .ok_or_else(|| QueryError::UnknownColumn {
                table: "result".to_string(),
                column: column.to_string(),
            })
    }

    /// Normalize one batch of rows.
    pub fn normalize(&self, batch: &RowBatch) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(batch.columns.len() + 1);
        for (index, name) in batch.columns.iter().enumerate() {
            let series = if self.is_date_column(name) {
                let mut unreadable = 0_usize;
                let dates = batch.values(index).map(|value| {
                    value.as_date().unwrap_or_else(|_| {
                        unreadable += 1;
                        None
                    })
                });
                let series = date_series(name, dates)?;
                if unreadable > 0 {
                    tracing::warn!(column = %name, unreadable, "unparseable dates set to null");
                }
                series
            } else if self.is_timestamp_column(name) {
                let mut unreadable = 0_usize;
                let stamps = batch.values(index).map(|value| {
                    value.as_timestamp().unwrap_or_else(|_| {
                        unreadable += 1;
                        None
                    })
                });
                let series = timestamp_series(name, stamps)?;
                if unreadable > 0 {
                    tracing::warn!(column = %name, unreadable, "unparseable timestamps set to null");
                }
                series
            } else {
                coerce_series(name, batch.values(index).collect())?
            };
            columns.push(series.into());
        }
        let mut frame = DataFrame::new(columns)?;

        if let Some(source) = &self.effective_date {
            let dates = self.effective_dates(batch, source)?;
            frame.with_column(date_series(DATE_COLUMN, dates)?)?;
        }

        if let Some(key) = self.entity {
            if frame.column(key.column()).is_err() {
                return Err(QueryError::UnknownColumn {
                    table: "result".to_string(),
                    column: key.column().to_string(),
                });
            }
        }

        let frame = self.drop_duplicates(frame)?;
        self.keys_first(frame)
    }

    fn effective_dates(&self, batch: &RowBatch, source: &str) -> Result<Vec<Option<NaiveDate>>> {
        let source = Self::index_of(batch, source)?;
        let announced = self
            .announcement
            .as_deref()
            .map(|column| Self::index_of(batch, column))
            .transpose()?;

        let read = |row: &[Value], index: usize| {
            row.get(index)
                .and_then(|value| value.as_date().ok().flatten())
        };

        let dates = batch
            .rows
            .iter()
            .map(|row| {
                let row = row.as_slice();
                let date = read(row, source)?;
                let date = if self.delay_months > 0 {
                    shift_month_end(date, self.delay_months)?
                } else {
                    date
                };
                let announcement = announced.and_then(|index| read(row, index));
                match announcement {
                    Some(rdq) if (1..MAX_ANNOUNCEMENT_DAYS).contains(&(rdq - date).num_days()) => {
                        Some(rdq)
                    }
                    _ => Some(date),
                }
            })
            .collect();
        Ok(dates)
    }

    fn drop_duplicates(&self, frame: DataFrame) -> Result<DataFrame> {
        let Some(key) = self.entity.filter(|_| self.dedup) else {
            return Ok(frame);
        };
        if frame.height() == 0 || frame.column(DATE_COLUMN).is_err() {
            return Ok(frame);
        }

        let before = frame.height();
        let unique = frame
            .lazy()
            .unique_stable(
                Some(vec![key.column().into(), DATE_COLUMN.into()]),
                UniqueKeepStrategy::First,
            )
            .collect()?;

        let dropped = before - unique.height();
        if dropped > 0 {
            tracing::warn!(key = %key, dropped, "dropped duplicate panel rows");
        }
        Ok(unique)
    }

    fn keys_first(&self, frame: DataFrame) -> Result<DataFrame> {
        let mut keys: Vec<String> = Vec::new();
        if let Some(key) = self.entity {
            keys.push(key.column().to_string());
        }
        if frame.column(DATE_COLUMN).is_ok() {
            keys.push(DATE_COLUMN.to_string());
        }

        let rest: Vec<String> = frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| !keys.contains(name))
            .collect();
        keys.extend(rest);
        Ok(frame.select(keys)?)
    }

    /// Finish an assembled panel: resolve duplicates across batches and apply
    /// the formulas.
    pub fn finish(&self, panel: DataFrame) -> Result<DataFrame> {
        let panel = self.drop_duplicates(panel)?;
        self.derive(panel)
    }

    /// Apply the formulas to a panel.
    pub fn derive(&self, panel: DataFrame) -> Result<DataFrame> {
        match self.entity {
            Some(key) if !self.formulas.is_empty() => {
                Ok(derive_panel(panel, key, &self.formulas)?)
            }
            _ => Ok(panel),
        }
    }
}

fn date_series<I>(name: &str, dates: I) -> Result<Series>
where
    I: IntoIterator<Item = Option<NaiveDate>>,
{
    let days: Vec<Option<i32>> = dates
        .into_iter()
        .map(|date| date.map(days_since_epoch))
        .collect();
    Ok(Series::new(name.into(), days).cast(&DataType::Date)?)
}

fn timestamp_series<I>(name: &str, stamps: I) -> Result<Series>
where
    I: IntoIterator<Item = Option<NaiveDateTime>>,
{
    let micros: Vec<Option<i64>> = stamps
        .into_iter()
        .map(|t| t.map(|t| t.and_utc().timestamp_micros()))
        .collect();
    Ok(Series::new(name.into(), micros)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Float,
    Text,
    Date,
    Timestamp,
}

impl Kind {
    const fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Bool),
            Value::Int(_) => Some(Self::Int),
            Value::Float(_) => Some(Self::Float),
            Value::Text(_) => Some(Self::Text),
            Value::Date(_) => Some(Self::Date),
            Value::Timestamp(_) => Some(Self::Timestamp),
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Bool | Self::Int, Self::Bool | Self::Int) => Self::Int,
            (Self::Bool | Self::Int | Self::Float, Self::Bool | Self::Int | Self::Float) => {
                Self::Float
            }
            (Self::Date | Self::Timestamp, Self::Date | Self::Timestamp) => Self::Timestamp,
            _ => Self::Text,
        }
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(s) => Some(s.clone()),
        Value::Bool(v) => Some(v.to_string()),
        Value::Int(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Date(v) => Some(v.to_string()),
        Value::Timestamp(v) => Some(v.to_string()),
    }
}

/// Coerce a column to the narrowest series type that holds all its values.
///
/// Mixed numeric columns become floats, a mix of dates and timestamps becomes
/// timestamps, and any other mix falls back to text. A column with no values
/// at all is a null float column.
fn coerce_series(name: &str, values: Vec<&Value>) -> Result<Series> {
    let name = PlSmallStr::from(name);
    let kind = values
        .iter()
        .filter_map(|value| Kind::of(value))
        .reduce(Kind::merge);

    let series = match kind {
        None => Series::full_null(name, values.len(), &DataType::Float64),
        Some(Kind::Bool) => {
            let v: Vec<Option<bool>> = values
                .iter()
                .map(|value| match value {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Series::new(name, v)
        }
        Some(Kind::Int) => {
            let v: Vec<Option<i64>> = values
                .iter()
                .map(|value| match value {
                    Value::Int(i) => Some(*i),
                    Value::Bool(b) => Some(i64::from(*b)),
                    _ => None,
                })
                .collect();
            Series::new(name, v)
        }
        Some(Kind::Float) => {
            let v: Vec<Option<f64>> = values.iter().map(|value| value.as_f64()).collect();
            Series::new(name, v)
        }
        Some(Kind::Date) => {
            return date_series(
                name.as_str(),
                values.iter().map(|value| value.as_date().ok().flatten()),
            );
        }
        Some(Kind::Timestamp) => {
            return timestamp_series(
                name.as_str(),
                values.iter().map(|value| value.as_timestamp().ok().flatten()),
            );
        }
        Some(Kind::Text) => {
            let v: Vec<Option<String>> = values.iter().map(|value| text_of(value)).collect();
            Series::new(name, v)
        }
    };
    Ok(series)
}
