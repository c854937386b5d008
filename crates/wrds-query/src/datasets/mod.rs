//! Dataset query builders.
//!
//! Every dataset is a [`DatasetStrategy`]: its option struct knows how to
//! turn itself into a composed select statement against a schema, along with
//! the [`PanelNormalizer`] that shapes the rows the statement returns.

pub mod crsp;
pub mod funda;
pub mod fundq;
pub mod guidance;
pub mod names;

use crate::error::Result;
use crate::normalize::PanelNormalizer;
use crate::options::{DatasetKind, DatasetOptions};
use crate::schema::{BoundTable, SchemaProvider};
use crate::sql::Dialect;
use sea_query::{Alias, Cond, Condition, Expr, JoinType, Query, SelectStatement, SimpleExpr};

/// A composed query ready to run, with the normalizer for its rows.
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    /// Dataset the query was built for
    pub dataset: DatasetKind,
    /// The composed select statement
    pub statement: SelectStatement,
    /// Output columns, in select order
    pub columns: Vec<String>,
    /// Shapes result rows into a panel
    pub normalizer: PanelNormalizer,
}

impl BuiltQuery {
    /// Render the statement for `dialect`.
    pub fn sql(&self, dialect: Dialect) -> String {
        dialect.render(&self.statement)
    }
}

/// Translation of dataset options into a query.
pub trait DatasetStrategy {
    /// Dataset the strategy builds.
    fn kind(&self) -> DatasetKind;

    /// Validate the options against `schema` and compose the query.
    fn build(&self, schema: &dyn SchemaProvider, dialect: Dialect) -> Result<BuiltQuery>;
}

impl DatasetOptions {
    /// Strategy for these options.
    pub fn strategy(&self) -> &dyn DatasetStrategy {
        match self {
            Self::Funda(options) => options,
            Self::Fundq(options) => options,
            Self::Crsp(options) => options,
            Self::Names(options) => options,
            Self::Guidance(options) => options,
        }
    }

    /// Build the query for these options.
    pub fn build(&self, schema: &dyn SchemaProvider, dialect: Dialect) -> Result<BuiltQuery> {
        let strategy = self.strategy();
        tracing::info!(dataset = %strategy.kind(), "building dataset query");
        let built = strategy.build(schema, dialect)?;
        tracing::debug!(
            dataset = %built.dataset,
            columns = built.columns.len(),
            sql = %built.sql(dialect),
            "dataset query built"
        );
        Ok(built)
    }
}

/// Build the query for the dataset called `name` from JSON options.
pub fn build_query(
    name: &str,
    options: serde_json::Value,
    schema: &dyn SchemaProvider,
    dialect: Dialect,
) -> Result<BuiltQuery> {
    DatasetOptions::from_json(name, options)?.build(schema, dialect)
}

/// Ordered select list that keeps each output name once.
#[derive(Debug, Default)]
pub(crate) struct Selection {
    items: Vec<(String, SimpleExpr, bool)>,
}

impl Selection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|(n, _, _)| n == name)
    }

    /// Select a column of `table` unless one of that name is already selected.
    pub(crate) fn column(&mut self, table: &BoundTable, name: &str) -> Result<&mut Self> {
        let expr = table.col(name)?;
        if !self.contains(name) {
            self.items.push((name.to_string(), expr.into(), false));
        }
        Ok(self)
    }

    /// Select several columns of `table`.
    pub(crate) fn columns(&mut self, table: &BoundTable, names: &[&str]) -> Result<&mut Self> {
        for name in names {
            self.column(table, name)?;
        }
        Ok(self)
    }

    /// Select every column of `table` not selected yet.
    pub(crate) fn all(&mut self, table: &BoundTable) -> Result<&mut Self> {
        for name in table.column_names() {
            self.column(table, &name)?;
        }
        Ok(self)
    }

    /// Select an expression under `alias`.
    pub(crate) fn expr_as(&mut self, expr: SimpleExpr, alias: &str) -> &mut Self {
        if !self.contains(alias) {
            self.items.push((alias.to_string(), expr, true));
        }
        self
    }

    /// Output names, in order.
    pub(crate) fn names(&self) -> Vec<String> {
        self.items.iter().map(|(name, _, _)| name.clone()).collect()
    }

    /// Write the select list into `select`.
    pub(crate) fn apply(&self, select: &mut SelectStatement) {
        for (name, expr, aliased) in &self.items {
            if *aliased {
                select.expr_as(expr.clone(), Alias::new(name.as_str()));
            } else {
                select.expr(expr.clone());
            }
        }
    }
}

/// Restrict `column` to the optional `[start, end]` range.
pub(crate) fn date_range<T>(
    select: &mut SelectStatement,
    column: Expr,
    start: Option<T>,
    end: Option<T>,
) where
    T: Into<SimpleExpr>,
{
    if let Some(start) = start {
        select.and_where(column.clone().gte(start));
    }
    if let Some(end) = end {
        select.and_where(column.lte(end));
    }
}

/// Quality and validity filter of the CCM link table.
///
/// Keeps primary links (`linkprim` P or C) of the `L*` types that are in use,
/// and requires `[start, end]` to fall inside the link's validity interval,
/// with a NULL bound treated as open-ended.
pub(crate) fn link_filter(link: &BoundTable, start: Expr, end: Expr) -> Result<Condition> {
    Ok(Cond::all()
        .add(link.col("linktype")?.like("L%"))
        .add(link.col("linkprim")?.is_in(["P", "C"]))
        .add(link.col("usedflag")?.eq(1))
        .add(
            Cond::any()
                .add(link.col("linkdt")?.lte(start))
                .add(link.col("linkdt")?.is_null()),
        )
        .add(
            Cond::any()
                .add(end.lte(link.col("linkenddt")?))
                .add(link.col("linkenddt")?.is_null()),
        ))
}

/// Wrap a Compustat query as `a` and join `lpermno`/`lpermco` from the link
/// table for the link valid at `date_column`.
pub(crate) fn link_permno(
    schema: &dyn SchemaProvider,
    inner: SelectStatement,
    inner_columns: Vec<String>,
    date_column: &str,
) -> Result<(SelectStatement, Vec<String>)> {
    let a = BoundTable::derived("a", &inner_columns);
    let link = schema.bind_as("ccmxpf_linktable", "b")?;

    let date = a.col(date_column)?;
    let on = link_filter(&link, date.clone(), date)?
        .add(a.col("gvkey")?.equals(link.column("gvkey")?));

    let statement = Query::select()
        .column(a.asterisk())
        .column(link.column("lpermno")?)
        .column(link.column("lpermco")?)
        .from_subquery(inner, Alias::new(a.alias()))
        .join_as(
            JoinType::InnerJoin,
            Alias::new(link.name()),
            Alias::new(link.alias()),
            on,
        )
        .to_owned();

    let mut columns = inner_columns;
    columns.extend(["lpermno".to_string(), "lpermco".to_string()]);
    Ok((statement, columns))
}

/// Compustat standardized-format filters: industrial format, standard data,
/// domestic population, consolidated statements.
pub(crate) fn compustat_filters(table: &BoundTable, select: &mut SelectStatement) -> Result<()> {
    for (column, value) in [
        ("indfmt", "INDL"),
        ("datafmt", "STD"),
        ("popsrc", "D"),
        ("consol", "C"),
    ] {
        select.and_where(table.col(column)?.eq(value));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::options::FundaOptions;
    use crate::schema::Catalog;
    use std::collections::HashSet;

    pub(crate) fn render(built: &BuiltQuery) -> String {
        built.sql(Dialect::Postgres)
    }

    #[test]
    fn test_selection_dedups() {
        let catalog = Catalog::wrds();
        let funda = catalog.bind("funda").unwrap();
        let mut selection = Selection::new();
        selection
            .columns(&funda, &["gvkey", "at", "che"])
            .unwrap()
            .columns(&funda, &["at", "dlc"])
            .unwrap();
        assert_eq!(selection.names(), vec!["gvkey", "at", "che", "dlc"]);
    }

    #[test]
    fn test_link_filter_sql() {
        let catalog = Catalog::wrds();
        let link = catalog.bind_as("ccmxpf_linktable", "b").unwrap();
        let a = BoundTable::derived("a", &["datadate"]);
        let cond = link_filter(&link, a.col("datadate").unwrap(), a.col("datadate").unwrap())
            .unwrap();
        let sql = Dialect::Postgres.render(
            &Query::select()
                .column(link.column("gvkey").unwrap())
                .from_as(Alias::new("ccmxpf_linktable"), Alias::new("b"))
                .cond_where(cond)
                .to_owned(),
        );

        assert!(sql.contains(r#""b"."linktype" LIKE 'L%'"#));
        assert!(sql.contains(r#""b"."linkprim" IN ('P', 'C')"#));
        assert!(sql.contains(r#""b"."usedflag" = 1"#));
        assert!(sql.contains(r#""b"."linkdt" <= "a"."datadate" OR "b"."linkdt" IS NULL"#));
        assert!(sql.contains(r#""a"."datadate" <= "b"."linkenddt" OR "b"."linkenddt" IS NULL"#));
    }

    #[test]
    fn test_build_by_name() {
        let built = build_query(
            "funda",
            serde_json::json!({"ag": true}),
            &Catalog::wrds(),
            Dialect::Postgres,
        )
        .unwrap();
        assert_eq!(built.dataset, DatasetKind::Funda);
        assert!(built.columns.contains(&"at".to_string()));
    }

    #[test]
    fn test_same_options_same_columns() {
        let options = FundaOptions {
            tac: true,
            noa: true,
            oscore: true,
            ..FundaOptions::default()
        };
        let catalog = Catalog::wrds();
        let first: HashSet<_> = options
            .build(&catalog, Dialect::Postgres)
            .unwrap()
            .columns
            .into_iter()
            .collect();
        let second: HashSet<_> = options
            .build(&catalog, Dialect::Postgres)
            .unwrap()
            .columns
            .into_iter()
            .collect();
        assert_eq!(first, second);
    }
}
