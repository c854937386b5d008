//! Compustat quarterly fundamentals (`fundq`).

use super::{BuiltQuery, DatasetStrategy, Selection, compustat_filters, date_range, link_permno};
use crate::error::Result;
use crate::normalize::PanelNormalizer;
use crate::options::{DatasetKind, FundqOptions};
use crate::schema::SchemaProvider;
use crate::sql::Dialect;
use sea_query::Query;
use wrds_panel::EntityKey;

/// Inputs of the Campbell, Hilscher and Szilagyi distress probability.
const CHS_COLUMNS: [&str; 8] = [
    "niq", "ltq", "cheq", "pstkq", "txditcq", "seqq", "ceqq", "txdbq",
];

impl DatasetStrategy for FundqOptions {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Fundq
    }

    fn build(&self, schema: &dyn SchemaProvider, _dialect: Dialect) -> Result<BuiltQuery> {
        let fundq = schema.bind("fundq")?;
        let formulas = self.formulas();

        let mut selection = Selection::new();
        selection.columns(&fundq, &["gvkey", "datadate", "rdq"])?;
        for formula in &formulas {
            selection.columns(&fundq, formula.required_columns())?;
        }
        if self.chsdp {
            selection.columns(&fundq, &CHS_COLUMNS)?;
        }
        if self.all_vars {
            selection.all(&fundq)?;
        }

        let mut statement = Query::select();
        selection.apply(&mut statement);
        fundq.select_from(&mut statement);
        compustat_filters(&fundq, &mut statement)?;
        date_range(
            &mut statement,
            fundq.col("datadate")?,
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
            .with_date_columns(["datadate", "rdq"])
            .with_delay_months(self.delay_months)
            .with_announcement("rdq")
            .with_dedup(true)
            .with_formulas(formulas);

        Ok(BuiltQuery {
            dataset: self.kind(),
            statement,
            columns,
            normalizer,
        })
    }
}
