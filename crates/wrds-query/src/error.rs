//! Error types for query construction and execution.

use thiserror::Error;

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors that can occur while building, running or materializing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A table the dataset needs is not known to the schema provider
    #[error("Table not found: {0}")]
    MissingTable(String),

    /// A column the dataset needs is not defined on its table
    #[error("Column {column} not found in table {table}")]
    UnknownColumn {
        /// Table that was searched
        table: String,
        /// Column that was requested
        column: String,
    },

    /// The requested dataset or option combination is not implemented
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// An option value or key was rejected
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Unknown dataset name
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// Materialization target exists and dropping was not requested
    #[error("Table {0} already exists")]
    TableExists(String),

    /// Error reported by an external database driver
    #[error("Execution error: {0}")]
    Execution(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Panel derivation error
    #[error("Panel error: {0}")]
    Panel(#[from] wrds_panel::PanelError),

    /// Options deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
