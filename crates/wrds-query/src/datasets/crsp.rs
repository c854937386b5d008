//! CRSP security files (`msf`, `dsf`).
//!
//! The base query joins the stock file to the name history valid on each
//! observation date. Two optional layers wrap it, each as an aliased
//! subquery:
//!
//! - delisting adjustment: a left join to `sedelist` in the same calendar
//!   month (monthly file) or on the same day (daily file), producing
//!   `ret_adj = (1 + ret) * (1 + coalesce(dlret, 0)) - 1`;
//! - value weights (monthly file only): market equity at the anchor month of
//!   fiscal year `Y`, compounded by the returns of fiscal year `Y + 1` up to
//!   and including each observation date.

use super::{BuiltQuery, DatasetStrategy, Selection, date_range};
use crate::error::Result;
use crate::normalize::PanelNormalizer;
use crate::options::{CrspOptions, DatasetKind, Frequency};
use crate::schema::{BoundTable, SchemaProvider};
use crate::sql::Dialect;
use sea_query::{Alias, Cond, Expr, Func, JoinType, Query, SelectStatement, SimpleExpr};
use wrds_panel::EntityKey;

const SECURITY_COLUMNS: [&str; 7] = ["permno", "permco", "date", "prc", "shrout", "ret", "retx"];
const NAME_COLUMNS: [&str; 4] = ["ticker", "ncusip", "shrcd", "exchcd"];

fn delist_adjust(
    schema: &dyn SchemaProvider,
    dialect: Dialect,
    frequency: Frequency,
    base: SelectStatement,
    base_columns: Vec<String>,
) -> Result<(SelectStatement, Vec<String>)> {
    let a = BoundTable::derived("a", &base_columns);
    let b = schema.bind_as("sedelist", "b")?;

    let same_period = match frequency {
        Frequency::Daily => Cond::all().add(a.col("date")?.equals(b.column("dlstdt")?)),
        Frequency::Monthly => {
            let (date, dlstdt) = (a.qualified("date")?, b.qualified("dlstdt")?);
            Cond::all()
                .add(Expr::cust(format!(
                    "{} = {}",
                    dialect.year(&date),
                    dialect.year(&dlstdt)
                )))
                .add(Expr::cust(format!(
                    "{} = {}",
                    dialect.month(&date),
                    dialect.month(&dlstdt)
                )))
        }
    };
    let on = Cond::all()
        .add(a.col("permno")?.equals(b.column("permno")?))
        .add(same_period);

    let ret_adj = Expr::cust(format!(
        "(1 + {}) * (1 + COALESCE({}, 0)) - 1",
        a.qualified("ret")?,
        b.qualified("dlret")?
    ));

    let statement = Query::select()
        .column(a.asterisk())
        .expr_as(ret_adj, Alias::new("ret_adj"))
        .from_subquery(base, Alias::new(a.alias()))
        .join_as(
            JoinType::LeftJoin,
            Alias::new(b.name()),
            Alias::new(b.alias()),
            on,
        )
        .to_owned();

    let mut columns = base_columns;
    columns.push("ret_adj".to_string());
    Ok((statement, columns))
}

fn value_weight(
    dialect: Dialect,
    month: u32,
    base: SelectStatement,
    base_columns: Vec<String>,
) -> Result<(SelectStatement, Vec<String>)> {
    let a = BoundTable::derived("a", &base_columns);
    let fiscal_date = || -> Result<SimpleExpr> {
        Ok(Expr::cust(format!(
            "fiscal_year({}, {month}, TRUE)",
            a.qualified("date")?
        )))
    };

    let periods = Query::select()
        .expr_as(fiscal_date()?, Alias::new("fdate"))
        .column(a.asterisk())
        .from_subquery(base.clone(), Alias::new(a.alias()))
        .to_owned();
    let anchors = Query::select()
        .expr_as(fiscal_date()?, Alias::new("fdate"))
        .column(a.column("date")?)
        .column(a.column("permno")?)
        .column(a.column("me")?)
        .from_subquery(base, Alias::new(a.alias()))
        .and_where(Expr::cust(format!(
            "{} = {month}",
            dialect.month(&a.qualified("date")?)
        )))
        .to_owned();

    let mut columns = vec!["fdate".to_string()];
    columns.extend(base_columns);
    let b = BoundTable::derived("b", &columns);
    let c = BoundTable::derived("c", &["fdate", "date", "permno", "me"]);

    let vweight = Expr::cust(format!(
        "{} * EXP(SUM(LN(1 + COALESCE({}, 0))) OVER (PARTITION BY {}, {} ORDER BY {}))",
        c.qualified("me")?,
        b.qualified("ret")?,
        b.qualified("permno")?,
        dialect.year(&b.qualified("fdate")?),
        b.qualified("date")?,
    ));
    let on = Cond::all()
        .add(b.col("permno")?.equals(c.column("permno")?))
        .add(Expr::cust(format!(
            "{} = {} + 1",
            dialect.year(&b.qualified("fdate")?),
            dialect.year(&c.qualified("fdate")?)
        )));

    let statement = Query::select()
        .column(b.asterisk())
        .expr_as(vweight, Alias::new("vweight"))
        .from_subquery(periods, Alias::new(b.alias()))
        .join_subquery(JoinType::LeftJoin, anchors, Alias::new(c.alias()), on)
        .to_owned();

    columns.push("vweight".to_string());
    Ok((statement, columns))
}

impl DatasetStrategy for CrspOptions {
    fn kind(&self) -> DatasetKind {
        match self.frequency {
            Frequency::Monthly => DatasetKind::Msf,
            Frequency::Daily => DatasetKind::Dsf,
        }
    }

    fn build(&self, schema: &dyn SchemaProvider, dialect: Dialect) -> Result<BuiltQuery> {
        self.validate()?;

        let sf = schema.bind(self.frequency.table())?;
        let names = schema.bind("senames")?;

        let mut selection = Selection::new();
        selection.columns(&sf, &SECURITY_COLUMNS)?;
        selection.expr_as(
            SimpleExpr::from(Func::abs(sf.col("prc")?)).mul(sf.col("shrout")?),
            "me",
        );
        if self.all_vars {
            selection.all(&sf)?;
        }
        selection.columns(&names, &NAME_COLUMNS)?;

        let valid_name = Cond::all()
            .add(sf.col("permno")?.equals(names.column("permno")?))
            .add(sf.col("date")?.gte(names.col("namedt")?))
            .add(sf.col("date")?.lte(names.col("nameendt")?));

        let mut statement = Query::select();
        selection.apply(&mut statement);
        sf.select_from(&mut statement);
        statement.join(
            JoinType::InnerJoin,
            Alias::new(names.name()),
            valid_name,
        );
        date_range(&mut statement, sf.col("date")?, self.start_date, self.end_date);

        let mut columns = selection.names();
        if self.delist {
            (statement, columns) =
                delist_adjust(schema, dialect, self.frequency, statement, columns)?;
        }
        let mut date_columns = vec!["date"];
        if let Some(month) = self.vwm {
            (statement, columns) = value_weight(dialect, month, statement, columns)?;
            date_columns.push("fdate");
        }
        if let Some(limit) = self.limit {
            statement.limit(limit);
        }

        let normalizer = PanelNormalizer::new()
            .with_entity(EntityKey::Permno)
            .with_effective_date("date")
            .with_date_columns(date_columns)
            .with_formulas(self.formulas());

        Ok(BuiltQuery {
            dataset: self.kind(),
            statement,
            columns,
            normalizer,
        })
    }
}
