//! Database backends.
//!
//! A backend is both a [`SchemaProvider`](crate::schema::SchemaProvider) and
//! a [`QueryExecutor`](crate::session::QueryExecutor), so a session can build
//! its query against the same database it runs on.

pub mod sqlite;

pub use sqlite::SqliteBackend;
