//! SQL rendering helpers and `CREATE TABLE ... AS SELECT`.

use sea_query::{
    PostgresQueryBuilder, QueryStatementWriter, SchemaStatementBuilder, SelectStatement,
    SqliteQueryBuilder, TableDropStatement,
};
use serde::{Deserialize, Serialize};

/// SQL dialect a query is rendered for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL, as served by WRDS
    #[default]
    Postgres,
    /// SQLite, for local mirrors
    Sqlite,
}

impl Dialect {
    /// Render a select statement with inlined values.
    pub fn render(&self, statement: &SelectStatement) -> String {
        match self {
            Self::Postgres => statement.to_string(PostgresQueryBuilder),
            Self::Sqlite => statement.to_string(SqliteQueryBuilder),
        }
    }

    /// Render a `DROP TABLE` statement.
    pub fn render_drop(&self, statement: &TableDropStatement) -> String {
        match self {
            Self::Postgres => statement.to_string(PostgresQueryBuilder),
            Self::Sqlite => statement.to_string(SqliteQueryBuilder),
        }
    }

    /// Calendar year of a date expression, as an integer.
    pub fn year(&self, expr: &str) -> String {
        match self {
            Self::Postgres => format!("EXTRACT(YEAR FROM {expr})"),
            Self::Sqlite => format!("CAST(strftime('%Y', {expr}) AS INTEGER)"),
        }
    }

    /// Calendar month of a date expression, as an integer.
    pub fn month(&self, expr: &str) -> String {
        match self {
            Self::Postgres => format!("EXTRACT(MONTH FROM {expr})"),
            Self::Sqlite => format!("CAST(strftime('%m', {expr}) AS INTEGER)"),
        }
    }
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"table"."column"`
pub fn qualified(table: &str, column: &str) -> String {
    format!("{}.{}", quote(table), quote(column))
}

/// What happens to a temporary table when the transaction commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnCommit {
    /// `ON COMMIT DELETE ROWS`
    DeleteRows,
    /// `ON COMMIT DROP`
    Drop,
}

impl OnCommit {
    const fn as_sql(&self) -> &'static str {
        match self {
            Self::DeleteRows => "ON COMMIT DELETE ROWS",
            Self::Drop => "ON COMMIT DROP",
        }
    }
}

/// `CREATE [TEMPORARY] TABLE <name> AS SELECT ...`
///
/// Compiles the select statement and splices the table-creation prefix into
/// its leading `SELECT` keyword; the rest of the select text is left as the
/// builder rendered it. With an empty table name the plain select is returned.
#[derive(Debug, Clone)]
pub struct CreateTableAs {
    select: SelectStatement,
    new_table_name: String,
    is_temporary: bool,
    on_commit: Option<OnCommit>,
}

impl CreateTableAs {
    /// Create a statement persisting `select` as `new_table_name`.
    pub fn new(select: SelectStatement, new_table_name: impl Into<String>) -> Self {
        Self {
            select,
            new_table_name: new_table_name.into(),
            is_temporary: false,
            on_commit: None,
        }
    }

    /// Create a temporary table.
    pub const fn temporary(mut self, is_temporary: bool) -> Self {
        self.is_temporary = is_temporary;
        self
    }

    /// Commit behaviour of the table.
    pub const fn on_commit(mut self, on_commit: OnCommit) -> Self {
        self.on_commit = Some(on_commit);
        self
    }

    /// Target table name.
    pub fn new_table_name(&self) -> &str {
        &self.new_table_name
    }

    /// The select on its own, as it would be sent without the prefix.
    pub fn select_sql(&self, dialect: Dialect) -> String {
        dialect.render(&self.select)
    }

    /// Compile to SQL text.
    pub fn compile(&self, dialect: Dialect) -> String {
        let text = self.select_sql(dialect);
        if self.new_table_name.is_empty() {
            return text;
        }

        let mut prefix = vec!["CREATE"];
        if self.is_temporary {
            prefix.push("TEMPORARY");
        }
        prefix.extend(["TABLE", self.new_table_name.as_str(), "AS SELECT"]);

        let mut sql = text.replacen("SELECT", &prefix.join(" "), 1);
        if let Some(on_commit) = self.on_commit {
            sql.push(' ');
            sql.push_str(on_commit.as_sql());
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{Alias, Expr, Query};

    fn select() -> SelectStatement {
        Query::select()
            .column(Alias::new("permno"))
            .from(Alias::new("msf"))
            .and_where(Expr::col(Alias::new("ret")).gt(0))
            .to_owned()
    }

    #[test]
    fn test_temporary_on_commit_drop() {
        let plain = Dialect::Postgres.render(&select());
        let sql = CreateTableAs::new(select(), "tmp1")
            .temporary(true)
            .on_commit(OnCommit::Drop)
            .compile(Dialect::Postgres);

        assert!(sql.starts_with("CREATE TEMPORARY TABLE tmp1 AS SELECT "));
        assert!(sql.ends_with(" ON COMMIT DROP"));

        let body = plain.strip_prefix("SELECT").unwrap();
        assert!(sql.contains(body));
    }

    #[test]
    fn test_permanent_table() {
        let sql = CreateTableAs::new(select(), "returns").compile(Dialect::Sqlite);
        assert!(sql.starts_with("CREATE TABLE returns AS SELECT "));
        assert!(!sql.contains("ON COMMIT"));
    }

    #[test]
    fn test_on_commit_delete_rows() {
        let sql = CreateTableAs::new(select(), "tmp2")
            .temporary(true)
            .on_commit(OnCommit::DeleteRows)
            .compile(Dialect::Postgres);
        assert!(sql.ends_with("ON COMMIT DELETE ROWS"));
    }

    #[test]
    fn test_empty_name_returns_select() {
        let statement = CreateTableAs::new(select(), "");
        assert_eq!(
            statement.compile(Dialect::Postgres),
            Dialect::Postgres.render(&select())
        );
    }

    #[test]
    fn test_only_leading_select_is_replaced() {
        let nested = Query::select()
            .column(Alias::new("permno"))
            .from_subquery(select(), Alias::new("a"))
            .to_owned();
        let sql = CreateTableAs::new(nested, "t").compile(Dialect::Postgres);
        assert_eq!(sql.matches("CREATE TABLE").count(), 1);
        assert_eq!(sql.matches("SELECT").count(), 2);
    }

    #[test]
    fn test_quoting() {
        assert_eq!(qualified("a", "date"), "\"a\".\"date\"");
        assert_eq!(quote("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_date_parts() {
        assert_eq!(Dialect::Postgres.month("x"), "EXTRACT(MONTH FROM x)");
        assert_eq!(
            Dialect::Sqlite.year("x"),
            "CAST(strftime('%Y', x) AS INTEGER)"
        );
    }
}
