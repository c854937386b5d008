//! CRSP/Compustat merged name history (`ccmnames`).

use super::{BuiltQuery, DatasetStrategy, link_filter};
use crate::error::Result;
use crate::normalize::PanelNormalizer;
use crate::options::{DatasetKind, NamesOptions};
use crate::schema::SchemaProvider;
use crate::sql::Dialect;
use sea_query::{Alias, Expr, Func, JoinType, Order, Query};
use wrds_panel::EntityKey;

impl DatasetStrategy for NamesOptions {
    fn kind(&self) -> DatasetKind {
        DatasetKind::CcmNames
    }

    fn build(&self, schema: &dyn SchemaProvider, _dialect: Dialect) -> Result<BuiltQuery> {
        let names = schema.bind("msenames")?;
        let link = schema.bind("ccmxpf_linktable")?;

        let ids = [
            names.column("permno")?,
            names.column("permco")?,
            link.column("gvkey")?,
            names.column("comnam")?,
        ];
        let first_name = Func::min(names.col("namedt")?);
        let last_name = Func::max(names.col("nameendt")?);

        let on = link_filter(&link, names.col("namedt")?, names.col("nameendt")?)?
            .add(names.col("permno")?.equals(link.column("lpermno")?))
            .add(names.col("permco")?.equals(link.column("lpermco")?));

        let mut statement = Query::select();
        statement
            .columns(ids.clone())
            .expr_as(first_name.clone(), Alias::new("sdate"))
            .expr_as(last_name.clone(), Alias::new("edate"));
        names.select_from(&mut statement);
        statement
            .join(JoinType::InnerJoin, Alias::new(link.name()), on)
            .group_by_columns(ids.clone());
        for id in ids {
            statement.order_by(id, Order::Asc);
        }
        if let Some(start) = self.start_date {
            statement.and_having(Expr::expr(first_name).gte(start));
        }
        if let Some(end) = self.end_date {
            statement.and_having(Expr::expr(last_name).lte(end));
        }
        if let Some(limit) = self.limit {
            statement.limit(limit);
        }

        let normalizer = PanelNormalizer::new()
            .with_entity(EntityKey::Permno)
            .with_date_columns(["sdate", "edate"]);

        Ok(BuiltQuery {
            dataset: self.kind(),
            statement,
            columns: ["permno", "permco", "gvkey", "comnam", "sdate", "edate"]
                .map(String::from)
                .to_vec(),
            normalizer,
        })
    }
}
