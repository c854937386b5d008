//! I/B/E/S management guidance (`guidancenew`).

use super::{BuiltQuery, DatasetStrategy, Selection, date_range};
use crate::error::Result;
use crate::normalize::PanelNormalizer;
use crate::options::{DatasetKind, GuidanceOptions};
use crate::schema::SchemaProvider;
use crate::sql::Dialect;
use sea_query::Query;
use wrds_panel::EntityKey;

const GUIDANCE_TABLE: &str = "guidancenew";

const GUIDANCE_COLUMNS: [&str; 8] = [
    "ibesticker",
    "cusiporsedol",
    "announcedatetime",
    "periodyear",
    "periodmonth",
    "measure",
    "value1",
    "value2",
];

impl DatasetStrategy for GuidanceOptions {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Guidance
    }

    fn build(&self, schema: &dyn SchemaProvider, _dialect: Dialect) -> Result<BuiltQuery> {
        let guidance = schema.bind(GUIDANCE_TABLE)?;

        let mut selection = Selection::new();
        selection.columns(&guidance, &GUIDANCE_COLUMNS)?;
        if self.all_vars {
            selection.all(&guidance)?;
        }

        let mut statement = Query::select();
        selection.apply(&mut statement);
        guidance.select_from(&mut statement);
        date_range(
            &mut statement,
            guidance.col("announcedatetime")?,
            self.start_date,
            self.end_date,
        );
        if let Some(limit) = self.limit {
            statement.limit(limit);
        }

        let normalizer = PanelNormalizer::new()
            .with_entity(EntityKey::IbesTicker)
            .with_effective_date("announcedatetime")
            .with_timestamp_columns(["announcedatetime"]);

        Ok(BuiltQuery {
            dataset: self.kind(),
            statement,
            columns: selection.names(),
            normalizer,
        })
    }
}
