//! Query sessions.
//!
//! A [`QuerySession`] pairs a built dataset query with an executor. It can
//! fetch the results as one panel, as a lazy sequence of normalized batches,
//! or persist them server-side with `CREATE TABLE ... AS SELECT`.

use crate::datasets::BuiltQuery;
use crate::error::{QueryError, Result};
use crate::options::DatasetOptions;
use crate::schema::SchemaProvider;
use crate::sql::{CreateTableAs, Dialect};
use crate::value::{Row, RowBatch};
use polars::prelude::*;
use sea_query::{Alias, Asterisk, Query, Table};
use std::iter::FusedIterator;
use std::time::Instant;

/// Default number of rows fetched per round trip.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// An open result set.
pub trait RowCursor {
    /// Column names of the result.
    fn columns(&self) -> &[String];

    /// Fetch up to `size` rows; an empty vector means the result is exhausted.
    fn fetch_many(&mut self, size: usize) -> Result<Vec<Row>>;
}

/// Runs SQL against a database.
pub trait QueryExecutor {
    /// Dialect the executor speaks.
    fn dialect(&self) -> Dialect;

    /// Whether a table of this name exists.
    fn has_table(&self, name: &str) -> Result<bool>;

    /// Run a query and open a cursor over its rows.
    fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor + '_>>;

    /// Run a statement that returns no rows.
    fn execute(&mut self, sql: &str) -> Result<()>;
}

/// How results are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Rows per batch; `None` assembles a single panel
    pub chunk_size: Option<usize>,
}

impl FetchOptions {
    /// Fetch lazily in batches of `size` rows.
    pub const fn chunked(size: usize) -> Self {
        Self {
            chunk_size: Some(size),
        }
    }
}

/// Fetched results.
#[derive(Debug)]
pub enum Fetch<'a> {
    /// The whole result as one panel, formulas applied
    Panel(DataFrame),
    /// Lazily normalized batches
    Batches(PanelBatches<'a>),
}

impl Fetch<'_> {
    /// The panel, when the results were fetched whole.
    pub fn into_panel(self) -> Option<DataFrame> {
        match self {
            Self::Panel(panel) => Some(panel),
            Self::Batches(_) => None,
        }
    }
}

/// Lazy, non-restartable sequence of normalized batches.
///
/// Ends at the first empty fetch or the first error; run the query again to
/// iterate a second time.
pub struct PanelBatches<'a> {
    cursor: Box<dyn RowCursor + 'a>,
    query: &'a BuiltQuery,
    chunk_size: usize,
    rows: usize,
    started: Instant,
    done: bool,
}

impl std::fmt::Debug for PanelBatches<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelBatches")
            .field("dataset", &self.query.dataset)
            .field("chunk_size", &self.chunk_size)
            .field("rows", &self.rows)
            .field("done", &self.done)
            .finish()
    }
}

impl PanelBatches<'_> {
    /// Rows fetched so far.
    pub const fn rows_fetched(&self) -> usize {
        self.rows
    }
}

impl Iterator for PanelBatches<'_> {
    type Item = Result<DataFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let rows = match self.cursor.fetch_many(self.chunk_size) {
            Ok(rows) => rows,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        if rows.is_empty() {
            self.done = true;
            tracing::debug!(
                dataset = %self.query.dataset,
                rows = self.rows,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "result exhausted"
            );
            return None;
        }

        self.rows += rows.len();
        tracing::debug!(dataset = %self.query.dataset, batch = rows.len(), "fetched batch");

        let batch = RowBatch::new(self.cursor.columns().to_vec(), rows);
        let frame = self.query.normalizer.normalize(&batch);
        if frame.is_err() {
            self.done = true;
        }
        Some(frame)
    }
}

impl FusedIterator for PanelBatches<'_> {}

/// A built query bound to an executor.
#[derive(Debug)]
pub struct QuerySession<E> {
    executor: E,
    query: BuiltQuery,
}

impl<E: QueryExecutor + SchemaProvider> QuerySession<E> {
    /// Build `options` against the executor's own schema.
    pub fn build(executor: E, options: &DatasetOptions) -> Result<Self> {
        let query = options.build(&executor, executor.dialect())?;
        Ok(Self::new(executor, query))
    }
}

impl<E: QueryExecutor> QuerySession<E> {
    /// Pair a built query with an executor.
    pub const fn new(executor: E, query: BuiltQuery) -> Self {
        Self { executor, query }
    }

    /// The built query.
    pub const fn query(&self) -> &BuiltQuery {
        &self.query
    }

    /// The executor.
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Give back the executor.
    pub fn into_executor(self) -> E {
        self.executor
    }

    /// The query rendered for the executor's dialect.
    pub fn sql(&self) -> String {
        self.query.sql(self.executor.dialect())
    }

    /// Run the query.
    ///
    /// Without a chunk size the batches are concatenated into one panel, and
    /// duplicates and formulas are resolved over the whole panel. An empty
    /// result is an empty frame.
    pub fn execute(&mut self, options: FetchOptions) -> Result<Fetch<'_>> {
        match options.chunk_size {
            Some(size) => Ok(Fetch::Batches(self.batches(size)?)),
            None => self.read_frame().map(Fetch::Panel),
        }
    }

    /// Run the query and open a lazy batch sequence.
    pub fn batches(&mut self, chunk_size: usize) -> Result<PanelBatches<'_>> {
        if chunk_size == 0 {
            return Err(QueryError::InvalidOption(
                "chunk size must be positive".to_string(),
            ));
        }
        let sql = self.query.sql(self.executor.dialect());
        tracing::debug!(dataset = %self.query.dataset, %sql, "executing query");

        let started = Instant::now();
        let cursor = self.executor.query(&sql)?;
        Ok(PanelBatches {
            cursor,
            query: &self.query,
            chunk_size,
            rows: 0,
            started,
            done: false,
        })
    }

    /// Run the query and assemble the whole result as one panel.
    pub fn read_frame(&mut self) -> Result<DataFrame> {
        let started = Instant::now();
        let frames = self
            .batches(DEFAULT_CHUNK_SIZE)?
            .collect::<Result<Vec<_>>>()?;

        let panel = match frames.len() {
            0 => DataFrame::empty(),
            1 => frames.into_iter().next().unwrap_or_default(),
            _ => {
                let frames: Vec<LazyFrame> = frames.into_iter().map(DataFrame::lazy).collect();
                concat(
                    frames,
                    UnionArgs {
                        to_supertypes: true,
                        ..Default::default()
                    },
                )?
                .collect()?
            }
        };
        let panel = if panel.height() == 0 {
            panel
        } else {
            self.query.normalizer.finish(panel)?
        };

        tracing::debug!(
            dataset = %self.query.dataset,
            rows = panel.height(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "read_frame finished"
        );
        Ok(panel)
    }

    /// Persist the query results as `new_table_name`.
    ///
    /// An existing table is dropped first when `drop_if_exists` is set;
    /// otherwise it is left alone and [`QueryError::TableExists`] is returned.
    pub fn materialize(&mut self, new_table_name: &str, drop_if_exists: bool) -> Result<()> {
        let started = Instant::now();
        let dialect = self.executor.dialect();

        if self.executor.has_table(new_table_name)? {
            if !drop_if_exists {
                return Err(QueryError::TableExists(new_table_name.to_string()));
            }
            let drop = Table::drop()
                .table(Alias::new(new_table_name))
                .if_exists()
                .to_owned();
            self.executor.execute(&dialect.render_drop(&drop))?;
            tracing::debug!(table = new_table_name, "dropped existing table");
        }

        let select = Query::select()
            .column(Asterisk)
            .from_subquery(self.query.statement.clone(), Alias::new("create"))
            .to_owned();
        let sql = CreateTableAs::new(select, new_table_name).compile(dialect);
        tracing::debug!(%sql, "materializing query");
        self.executor.execute(&sql)?;

        tracing::info!(
            dataset = %self.query.dataset,
            table = new_table_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "table created"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{DatasetOptions, GuidanceOptions};
    use crate::schema::Catalog;
    use crate::value::Value;
    use std::collections::VecDeque;

    /// Executor replaying canned rows and recording statements.
    #[derive(Debug, Default)]
    struct Replay {
        columns: Vec<String>,
        rows: Vec<Row>,
        tables: Vec<String>,
        executed: Vec<String>,
        fail_after: Option<usize>,
    }

    struct ReplayCursor {
        columns: Vec<String>,
        rows: VecDeque<Row>,
        fetches: usize,
        fail_after: Option<usize>,
    }

    impl RowCursor for ReplayCursor {
        fn columns(&self) -> &[String] {
            &self.columns
        }

        fn fetch_many(&mut self, size: usize) -> Result<Vec<Row>> {
            if self.fail_after == Some(self.fetches) {
                return Err(QueryError::Execution("connection reset".into()));
            }
            self.fetches += 1;
            let n = size.min(self.rows.len());
            Ok(self.rows.drain(..n).collect())
        }
    }

    impl QueryExecutor for Replay {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        fn has_table(&self, name: &str) -> Result<bool> {
            Ok(self.tables.iter().any(|t| t == name))
        }

        fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor + '_>> {
            self.executed.push(sql.to_string());
            Ok(Box::new(ReplayCursor {
                columns: self.columns.clone(),
                rows: self.rows.clone().into(),
                fetches: 0,
                fail_after: self.fail_after,
            }))
        }

        fn execute(&mut self, sql: &str) -> Result<()> {
            self.executed.push(sql.to_string());
            Ok(())
        }
    }

    fn guidance_rows(n: usize) -> Replay {
        let columns = ["ibesticker", "announcedatetime", "value1"]
            .map(String::from)
            .to_vec();
        let rows = (0..n)
            .map(|i| {
                vec![
                    Value::Text(format!("T{i}")),
                    Value::Text("2020-01-02 16:00:00".to_string()),
                    Value::Float(i as f64),
                ]
            })
            .collect();
        Replay {
            columns,
            rows,
            ..Replay::default()
        }
    }

    fn session(executor: Replay) -> QuerySession<Replay> {
        let query = DatasetOptions::Guidance(GuidanceOptions::default())
            .build(&Catalog::wrds(), Dialect::Postgres)
            .unwrap();
        QuerySession::new(executor, query)
    }

    #[test]
    fn test_chunked_batches() {
        let mut session = session(guidance_rows(5));
        let Fetch::Batches(batches) = session.execute(FetchOptions::chunked(2)).unwrap() else {
            panic!("expected batches");
        };
        let heights: Vec<usize> = batches.map(|b| b.unwrap().height()).collect();
        assert_eq!(heights, vec![2, 2, 1]);
    }

    #[test]
    fn test_batches_are_fused() {
        let mut session = session(guidance_rows(1));
        let mut batches = session.batches(10).unwrap();
        assert!(batches.next().is_some());
        assert!(batches.next().is_none());
        assert!(batches.next().is_none());
        assert_eq!(batches.rows_fetched(), 1);
    }

    #[test]
    fn test_whole_panel() {
        let mut session = session(guidance_rows(3));
        let panel = session
            .execute(FetchOptions::default())
            .unwrap()
            .into_panel()
            .unwrap();
        assert_eq!(panel.height(), 3);
        assert_eq!(panel.get_column_names()[0].as_str(), "ibesticker");
        assert_eq!(panel.get_column_names()[1].as_str(), "date");
    }

    #[test]
    fn test_empty_result() {
        let mut session = session(guidance_rows(0));
        assert_eq!(session.read_frame().unwrap().height(), 0);
        assert_eq!(session.batches(10).unwrap().count(), 0);
    }

    #[test]
    fn test_execution_error_propagates() {
        let mut session = session(Replay {
            fail_after: Some(1),
            ..guidance_rows(4)
        });
        let results: Vec<_> = session.batches(2).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(QueryError::Execution(_))));
    }

    #[test]
    fn test_zero_chunk_size() {
        let mut session = session(guidance_rows(1));
        assert!(matches!(
            session.batches(0),
            Err(QueryError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_materialize_refuses_existing_table() {
        let mut session = session(Replay {
            tables: vec!["guidance_copy".to_string()],
            ..guidance_rows(0)
        });
        let err = session.materialize("guidance_copy", false).unwrap_err();
        assert!(matches!(err, QueryError::TableExists(_)));
        assert!(session.executor().executed.is_empty());
    }

    #[test]
    fn test_materialize_drops_then_creates() {
        let mut session = session(Replay {
            tables: vec!["guidance_copy".to_string()],
            ..guidance_rows(0)
        });
        session.materialize("guidance_copy", true).unwrap();

        let executed = &session.executor().executed;
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0], r#"DROP TABLE IF EXISTS "guidance_copy""#);
        assert!(executed[1].starts_with(r#"CREATE TABLE guidance_copy AS SELECT * FROM (SELECT"#));
        assert!(executed[1].ends_with(r#") AS "create""#));
    }
}
