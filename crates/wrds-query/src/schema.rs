//! Schema provider and typed column binding.
//!
//! Query builders never reference a column by a bare string: they bind the
//! table once against a [`SchemaProvider`] and ask the resulting
//! [`BoundTable`] for each column, so a typo or a missing table fails while
//! the query is being constructed rather than when the database runs it.

use crate::error::{QueryError, Result};
use crate::sql;
use sea_query::{Alias, Asterisk, Expr, SelectStatement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Logical type of a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Integer
    Integer,
    /// Floating point or numeric
    Float,
    /// Character data
    Text,
    /// Calendar date
    Date,
    /// Timestamp
    Timestamp,
    /// Boolean
    Boolean,
    /// Anything else, with its declared type
    Other(String),
}

impl ColumnType {
    /// Map a declared SQL type name onto a logical type.
    pub fn from_sql(declared: &str) -> Self {
        let lower = declared.trim().to_ascii_lowercase();
        if lower.contains("int") {
            Self::Integer
        } else if lower.starts_with("timestamp") || lower.contains("datetime") {
            Self::Timestamp
        } else if lower == "date" {
            Self::Date
        } else if lower.contains("char") || lower.contains("text") || lower.contains("clob") {
            Self::Text
        } else if lower.contains("real")
            || lower.contains("floa")
            || lower.contains("doub")
            || lower.contains("num")
            || lower.contains("dec")
        {
            Self::Float
        } else if lower.starts_with("bool") {
            Self::Boolean
        } else {
            Self::Other(declared.to_string())
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Logical type
    pub column_type: ColumnType,
}

/// A table definition as reported by a schema provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Create a table definition from `(name, type)` pairs.
    pub fn new<'a, I>(name: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, ColumnType)>,
    {
        Self {
            name: name.to_string(),
            columns: columns
                .into_iter()
                .map(|(name, column_type)| ColumnDef {
                    name: name.to_string(),
                    column_type,
                })
                .collect(),
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Source of table definitions.
pub trait SchemaProvider {
    /// Definition of `name`, or `None` when the table does not exist.
    fn table(&self, name: &str) -> Result<Option<TableDef>>;

    /// Bind `name` for query construction, qualified by its own name.
    fn bind(&self, name: &str) -> Result<BoundTable> {
        self.table(name)?
            .map(|def| BoundTable::new(def, name))
            .ok_or_else(|| QueryError::MissingTable(name.to_string()))
    }

    /// Bind `name` for query construction under `alias`.
    fn bind_as(&self, name: &str, alias: &str) -> Result<BoundTable> {
        self.table(name)?
            .map(|def| BoundTable::new(def, alias))
            .ok_or_else(|| QueryError::MissingTable(name.to_string()))
    }
}

/// A table whose columns have been validated against the schema.
#[derive(Debug, Clone)]
pub struct BoundTable {
    def: TableDef,
    alias: String,
}

impl BoundTable {
    fn new(def: TableDef, alias: &str) -> Self {
        Self {
            def,
            alias: alias.to_string(),
        }
    }

    /// Bind the output columns of a subquery aliased as `alias`.
    pub fn derived<S: AsRef<str>>(alias: &str, columns: &[S]) -> Self {
        let def = TableDef::new(
            alias,
            columns
                .iter()
                .map(|c| (c.as_ref(), ColumnType::Other("derived".to_string()))),
        );
        Self::new(def, alias)
    }

    /// Underlying table name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Qualifier used in generated SQL.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Table definition.
    pub const fn def(&self) -> &TableDef {
        &self.def
    }

    /// Validate `column` and return its qualified reference.
    pub fn column(&self, column: &str) -> Result<(Alias, Alias)> {
        if self.def.column(column).is_none() {
            return Err(QueryError::UnknownColumn {
                table: self.def.name.clone(),
                column: column.to_string(),
            });
        }
        Ok((Alias::new(self.alias.as_str()), Alias::new(column)))
    }

    /// Validate `column` and return it as an expression.
    pub fn col(&self, column: &str) -> Result<Expr> {
        self.column(column).map(Expr::col)
    }

    /// Validate `column` and return its quoted, qualified SQL text.
    pub fn qualified(&self, column: &str) -> Result<String> {
        self.column(column)?;
        Ok(sql::qualified(&self.alias, column))
    }

    /// Add the table to the `FROM` clause of `select`.
    pub fn select_from(&self, select: &mut SelectStatement) {
        if self.alias == self.def.name {
            select.from(Alias::new(self.def.name.as_str()));
        } else {
            select.from_as(
                Alias::new(self.def.name.as_str()),
                Alias::new(self.alias.as_str()),
            );
        }
    }

    /// `alias.*`
    pub fn asterisk(&self) -> (Alias, Asterisk) {
        (Alias::new(self.alias.as_str()), Asterisk)
    }

    /// Every column name of the table.
    pub fn column_names(&self) -> Vec<String> {
        self.def.column_names().map(str::to_string).collect()
    }
}

/// In-memory schema provider.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<String, TableDef>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table definition.
    pub fn insert(&mut self, table: TableDef) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Builder-style [`Self::insert`].
    pub fn with_table(mut self, table: TableDef) -> Self {
        self.insert(table);
        self
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Catalog of the standard WRDS tables used by the dataset builders.
    ///
    /// Useful for rendering queries without a database connection.
    pub fn wrds() -> Self {
        use ColumnType::{Date, Float, Integer, Text, Timestamp};

        let compustat_flags = [
            ("indfmt", Text),
            ("datafmt", Text),
            ("popsrc", Text),
            ("consol", Text),
        ];

        let funda_numeric = [
            "seq", "ceq", "pstk", "at", "lt", "txditc", "txdb", "pstkrv", "pstkl", "csho",
            "prcc_f", "ajex", "act", "che", "lct", "dlc", "txp", "dp", "dltt", "mib", "gp",
            "ppegt", "invt", "ib", "ni", "wcap", "ebitda", "sale", "cogs", "xsga",
        ];
        let funda = TableDef::new(
            "funda",
            [("gvkey", Text), ("datadate", Date), ("fyear", Integer)]
                .into_iter()
                .chain(compustat_flags.clone())
                .chain(funda_numeric.iter().map(|c| (*c, Float))),
        );

        let fundq_numeric = [
            "ibq", "atq", "niq", "ltq", "cheq", "pstkq", "txditcq", "seqq", "ceqq", "txdbq",
            "saleq",
        ];
        let fundq = TableDef::new(
            "fundq",
            [
                ("gvkey", Text),
                ("datadate", Date),
                ("rdq", Date),
                ("fyearq", Integer),
                ("fqtr", Integer),
            ]
            .into_iter()
            .chain(compustat_flags)
            .chain(fundq_numeric.iter().map(|c| (*c, Float))),
        );

        let linktable = TableDef::new(
            "ccmxpf_linktable",
            [
                ("gvkey", Text),
                ("linkprim", Text),
                ("liid", Text),
                ("linktype", Text),
                ("lpermno", Integer),
                ("lpermco", Integer),
                ("usedflag", Integer),
                ("linkdt", Date),
                ("linkenddt", Date),
            ],
        );

        let security_file = |name: &str| {
            TableDef::new(
                name,
                [
                    ("cusip", Text),
                    ("permno", Integer),
                    ("permco", Integer),
                    ("issuno", Integer),
                    ("hexcd", Integer),
                    ("hsiccd", Integer),
                    ("date", Date),
                    ("bidlo", Float),
                    ("askhi", Float),
                    ("prc", Float),
                    ("vol", Float),
                    ("ret", Float),
                    ("bid", Float),
                    ("ask", Float),
                    ("shrout", Float),
                    ("cfacpr", Float),
                    ("cfacshr", Float),
                    ("retx", Float),
                ],
            )
        };

        let names_file = |name: &str| {
            TableDef::new(
                name,
                [
                    ("permno", Integer),
                    ("permco", Integer),
                    ("namedt", Date),
                    ("nameendt", Date),
                    ("shrcd", Integer),
                    ("exchcd", Integer),
                    ("siccd", Integer),
                    ("ncusip", Text),
                    ("ticker", Text),
                    ("comnam", Text),
                    ("shrcls", Text),
                ],
            )
        };

        let sedelist = TableDef::new(
            "sedelist",
            [
                ("permno", Integer),
                ("dlstdt", Date),
                ("dlstcd", Integer),
                ("nwperm", Integer),
                ("nwcomp", Integer),
                ("nextdt", Date),
                ("dlamt", Float),
                ("dlretx", Float),
                ("dlprc", Float),
                ("dlpdt", Date),
                ("dlret", Float),
            ],
        );

        let guidance_text = [
            "ibesticker",
            "measure",
            "measuredescription",
            "measurepershare",
            "currency",
            "units",
            "rangedescriptioncode",
            "rangedescription",
            "differencecode",
            "differencedescription",
            "accountingstandard",
            "accountingstandarddescription",
            "actionflag",
            "actionflagdescription",
            "guidancecode",
            "guidancecodedescription",
            "cusiporsedol",
            "officialticker",
            "homemarketcode",
            "longcompanyname",
            "instrumenttype",
            "instrumenttypedescription",
            "exchangecode",
            "exchangename",
            "countryid",
            "countryname",
            "exchangecountryid",
            "exchangecountryname",
            "sectorname",
            "industryname",
            "periodicity",
        ];
        let guidance = TableDef::new(
            "guidancenew",
            guidance_text
                .iter()
                .map(|c| (*c, Text))
                .chain([
                    ("periodyear", Integer),
                    ("periodmonth", Integer),
                    ("earningsestimatesfiscalyearend", Integer),
                    ("value1", Float),
                    ("value2", Float),
                    ("meanatdate", Float),
                    ("activationdatetime", Timestamp),
                    ("announcedatetime", Timestamp),
                    ("modifieddatetime", Timestamp),
                    ("ibestickerstartdate", Date),
                    ("ibestickerenddate", Date),
                    ("modifieddate", Date),
                    ("splitactivationdate", Date),
                    ("splitentrydate", Date),
                    ("splitfactor", Float),
                    ("cumulativesplitfactor", Float),
                ]),
        );

        Self::new()
            .with_table(funda)
            .with_table(fundq)
            .with_table(linktable)
            .with_table(security_file("msf"))
            .with_table(security_file("dsf"))
            .with_table(names_file("senames"))
            .with_table(names_file("msenames"))
            .with_table(sedelist)
            .with_table(guidance)
    }
}

impl SchemaProvider for Catalog {
    fn table(&self, name: &str) -> Result<Option<TableDef>> {
        Ok(self.tables.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("INTEGER", ColumnType::Integer)]
    #[case("bigint", ColumnType::Integer)]
    #[case("double precision", ColumnType::Float)]
    #[case("NUMERIC(12,3)", ColumnType::Float)]
    #[case("varchar(6)", ColumnType::Text)]
    #[case("DATE", ColumnType::Date)]
    #[case("timestamp without time zone", ColumnType::Timestamp)]
    #[case("boolean", ColumnType::Boolean)]
    fn test_column_type_from_sql(#[case] declared: &str, #[case] expected: ColumnType) {
        assert_eq!(ColumnType::from_sql(declared), expected);
    }

    #[test]
    fn test_bind_missing_table() {
        let err = Catalog::new().bind("funda").unwrap_err();
        assert!(matches!(err, QueryError::MissingTable(name) if name == "funda"));
    }

    #[test]
    fn test_bound_column_validation() {
        let catalog = Catalog::wrds();
        let funda = catalog.bind("funda").unwrap();

        assert!(funda.column("gvkey").is_ok());
        let err = funda.column("gvkye").unwrap_err();
        match err {
            QueryError::UnknownColumn { table, column } => {
                assert_eq!(table, "funda");
                assert_eq!(column, "gvkye");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bind_as_uses_alias() {
        let catalog = Catalog::wrds();
        let link = catalog.bind_as("ccmxpf_linktable", "b").unwrap();
        assert_eq!(link.name(), "ccmxpf_linktable");
        assert_eq!(link.alias(), "b");
    }

    #[test]
    fn test_derived_table() {
        let a = BoundTable::derived("a", &["gvkey", "datadate"]);
        assert_eq!(a.qualified("datadate").unwrap(), "\"a\".\"datadate\"");
        assert!(matches!(
            a.qualified("lpermno"),
            Err(QueryError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_wrds_catalog_tables() {
        let catalog = Catalog::wrds();
        assert_eq!(catalog.len(), 9);
        for name in ["funda", "fundq", "msf", "dsf", "sedelist", "guidancenew"] {
            assert!(catalog.table(name).unwrap().is_some(), "{name}");
        }
    }
}
