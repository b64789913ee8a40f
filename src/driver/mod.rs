//! Driver capability layer.
//!
//! A driver is reached through four traits, from outermost to innermost:
//!
//! ```text
//! Driver ──connect──▶ DriverConnection ──metadata──▶ CatalogMetadata ──get_*──▶ Cursor
//! ```
//!
//! [`DriverRegistry`] resolves a [`DriverConfig`](crate::config::DriverConfig)
//! to a [`Driver`]. Two drivers ship with the crate: the built-in
//! [`SqliteDriver`] and [`WorkerDriver`], which forwards every call to an
//! external driver process.

mod cursor;
mod registry;
pub mod sqlite;
pub mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::worker::WorkerError;

pub use cursor::BufferedCursor;
pub use registry::DriverRegistry;
pub use sqlite::SqliteDriver;
pub use worker::WorkerDriver;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors raised by driver adapters.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no driver registered as '{0}' and no libpath given to load one")]
    UnknownDriver(String),

    #[error("invalid connection url '{0}'")]
    InvalidUrl(String),

    #[error("driver has not been initialized")]
    NotInitialized,

    #[error("connection is closed")]
    Closed,

    #[error("column index {index} out of range 1..={count}")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("cursor is not positioned on a row")]
    NoCurrentRow,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("driver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

/// A registered database driver.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Identifier the driver was registered under.
    fn name(&self) -> &str;

    /// Open one live connection.
    async fn connect(
        &self,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> DriverResult<Box<dyn DriverConnection>>;

    /// Whether the driver can still open connections. A driver whose
    /// backing process died reports `false` and gets reloaded.
    fn is_available(&self) -> bool {
        true
    }
}

/// One live connection produced by a [`Driver`].
#[async_trait]
pub trait DriverConnection: Send + Sync {
    /// Obtain the catalog-introspection handle of this connection.
    async fn metadata(&self) -> DriverResult<Arc<dyn CatalogMetadata>>;

    /// Release the connection. Handles obtained from [`metadata`](Self::metadata)
    /// fail with [`DriverError::Closed`] afterwards.
    async fn close(&self) -> DriverResult<()>;
}

/// Catalog-introspection capability of an open connection.
///
/// `None` arguments mean "no constraint". Table and column arguments of
/// [`get_tables`](Self::get_tables) and [`get_columns`](Self::get_columns)
/// are search patterns (`%`, `_`); key lookups take exact table names.
#[async_trait]
pub trait CatalogMetadata: Send + Sync {
    /// Tables and views. An empty `types` slice means every table type.
    async fn get_tables(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        types: &[String],
    ) -> DriverResult<Box<dyn Cursor>>;

    async fn get_columns(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>>;

    async fn get_primary_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>>;

    /// Foreign keys declared by `table` (the child side).
    async fn get_imported_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>>;

    /// Foreign keys of other tables referencing `table` (the parent side).
    async fn get_exported_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>>;
}

/// Forward-only result of a catalog call.
///
/// Columns are numbered from 1. A cursor starts before the first row;
/// [`next`](Self::next) advances it and reports whether a row is available.
pub trait Cursor: Send {
    fn column_count(&self) -> DriverResult<usize>;

    fn column_name(&self, index: usize) -> DriverResult<String>;

    fn next(&mut self) -> DriverResult<bool>;

    /// Value of `index` in the current row; `None` for SQL NULL.
    fn get_string(&self, index: usize) -> DriverResult<Option<String>>;

    fn close(&mut self) -> DriverResult<()>;
}
