#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/wrds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod datasets;
pub mod error;
pub mod normalize;
pub mod options;
pub mod schema;
pub mod session;
pub mod sql;
pub mod value;

pub use backend::SqliteBackend;
pub use datasets::{BuiltQuery, DatasetStrategy, build_query};
pub use error::{QueryError, Result};
pub use normalize::PanelNormalizer;
pub use options::{
    CrspOptions, DatasetKind, DatasetOptions, Frequency, FundaOptions, FundqOptions,
    GuidanceOptions, NamesOptions,
};
pub use schema::{BoundTable, Catalog, ColumnDef, ColumnType, SchemaProvider, TableDef};
pub use session::{
    DEFAULT_CHUNK_SIZE, Fetch, FetchOptions, PanelBatches, QueryExecutor, QuerySession, RowCursor,
};
pub use sql::{CreateTableAs, Dialect, OnCommit};
pub use value::{Row, RowBatch, Value};
