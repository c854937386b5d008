//! Error types for panel operations.

use thiserror::Error;

/// Result type for panel operations.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Errors that can occur while deriving panel columns.
#[derive(Debug, Error)]
pub enum PanelError {
    /// A formula needs a column the panel does not carry
    #[error("Formula {formula} requires column {column}, which is not in the panel")]
    MissingColumn {
        /// Output name of the formula
        formula: String,
        /// Missing input column
        column: String,
    },

    /// Invalid formula parameter
    #[error("Invalid parameter for {formula}: {reason}")]
    InvalidParameter {
        /// Output name of the formula
        formula: String,
        /// Why the parameter was rejected
        reason: String,
    },

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}
