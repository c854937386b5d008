#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/wrds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use polars::prelude::DataFrame;

// Re-export sub-crates
pub use wrds_panel as panel;
pub use wrds_query as query;

// Re-export common types
pub use wrds_panel::{
    EntityKey, Formula, FormulaInfo, available_formulas, derive_panel, get_formula_info,
};
pub use wrds_query::{
    BuiltQuery, Catalog, CrspOptions, DatasetKind, DatasetOptions, Dialect, Fetch, FetchOptions,
    FundaOptions, FundqOptions, GuidanceOptions, NamesOptions, QueryError, QueryExecutor,
    QuerySession, SchemaProvider, SqliteBackend,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build `options` against the executor's schema and read the whole panel.
pub fn read_panel<E>(executor: E, options: &DatasetOptions) -> wrds_query::Result<DataFrame>
where
    E: QueryExecutor + SchemaProvider,
{
    QuerySession::build(executor, options)?.read_frame()
}

/// Like [`read_panel`], with the dataset picked by name and its options read
/// from JSON.
pub fn read_panel_json<E>(
    executor: E,
    dataset: &str,
    options: serde_json::Value,
) -> wrds_query::Result<DataFrame>
where
    E: QueryExecutor + SchemaProvider,
{
    read_panel(executor, &DatasetOptions::from_json(dataset, options)?)
}
