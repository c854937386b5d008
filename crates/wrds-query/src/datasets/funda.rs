//! Compustat annual fundamentals (`funda`).

use super::{BuiltQuery, DatasetStrategy, Selection, compustat_filters, date_range, link_permno};
use crate::error::Result;
use crate::normalize::PanelNormalizer;
use crate::options::{DatasetKind, FundaOptions};
use crate::schema::{BoundTable, SchemaProvider};
use crate::sql::Dialect;
use sea_query::{Expr, Func, Query, SimpleExpr};
use wrds_panel::EntityKey;

/// Book equity: shareholders' equity plus deferred taxes minus preferred
/// stock, each taken from the first available Compustat item.
pub(crate) fn book_equity(table: &BoundTable) -> Result<SimpleExpr> {
    let zero = || SimpleExpr::from(Expr::val(0));

    let shareholders_equity = Func::coalesce([
        table.col("seq")?.into(),
        table
            .col("ceq")?
            .add(Func::coalesce([table.col("pstk")?.into(), zero()])),
        table.col("at")?.sub(table.col("lt")?),
    ]);
    let deferred_taxes = Func::coalesce([
        table.col("txditc")?.into(),
        table.col("txdb")?.into(),
        zero(),
    ]);
    let preferred_stock = Func::coalesce([
        table.col("pstkrv")?.into(),
        table.col("pstkl")?.into(),
        table.col("pstk")?.into(),
        zero(),
    ]);

    Ok(SimpleExpr::from(shareholders_equity)
        .add(deferred_taxes)
        .sub(preferred_stock))
}

impl DatasetStrategy for FundaOptions {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Funda
    }

    fn build(&self, schema: &dyn SchemaProvider, _dialect: Dialect) -> Result<BuiltQuery> {
        let funda = schema.bind("funda")?;
        let formulas = self.formulas();

        let mut selection = Selection::new();
        selection.columns(&funda, &["gvkey", "datadate"])?;
        if self.be {
            selection.expr_as(book_equity(&funda)?, "be");
        }
        if self.me_comp {
            selection.expr_as(funda.col("csho")?.mul(funda.col("prcc_f")?), "me_comp");
        }
        for formula in &formulas {
            selection.columns(&funda, formula.required_columns())?;
        }
        if self.all_vars {
            selection.all(&funda)?;
        }

        let mut statement = Query::select();
        selection.apply(&mut statement);
        funda.select_from(&mut statement);
        compustat_filters(&funda, &mut statement)?;
        date_range(
            &mut statement,
            funda.col("datadate")?,
            self.start_date,
            self.end_date,
        );

        let (mut statement, columns) = if self.permno {
            link_permno(schema, statement, selection.names(), "datadate")?
        } else {
            (statement, selection.names())
        };
        if let Some(limit) = self.limit {
            statement.limit(limit);
        }

        let normalizer = PanelNormalizer::new()
            .with_entity(EntityKey::Gvkey)
            .with_effective_date("datadate")
            .with_date_columns(["datadate"])
            .with_delay_months(self.delay_months)
            .with_formulas(formulas);

        Ok(BuiltQuery {
            dataset: self.kind(),
            statement,
            columns,
            normalizer,
        })
    }
}
