//! Errors surfaced by [`MetadataFacade`](crate::MetadataFacade).

use std::fmt;

use thiserror::Error;

use crate::driver::DriverError;

/// Result type for facade operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// The catalog call a [`MetadataError::Query`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogOperation {
    Tables,
    Columns,
    PrimaryKeys,
    ImportedKeys,
    ExportedKeys,
}

impl CatalogOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogOperation::Tables => "get_tables",
            CatalogOperation::Columns => "get_columns",
            CatalogOperation::PrimaryKeys => "get_primary_keys",
            CatalogOperation::ImportedKeys => "get_imported_keys",
            CatalogOperation::ExportedKeys => "get_exported_keys",
        }
    }
}

impl fmt::Display for CatalogOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by the facade, one variant per lifecycle step.
///
/// None of them are retried internally; calling the operation again retries
/// the step that failed.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The driver named by the config could not be resolved or loaded.
    #[error("driver configuration error: {0}")]
    Config(#[source] DriverError),

    #[error("failed to open connection: {0}")]
    Connection(#[source] DriverError),

    #[error("failed to acquire database metadata: {0}")]
    MetadataAcquisition(#[source] DriverError),

    #[error("catalog call {operation} failed: {source}")]
    Query {
        operation: CatalogOperation,
        #[source]
        source: DriverError,
    },

    /// Reading column descriptors or rows failed.
    #[error("failed to read catalog result: {0}")]
    Cursor(#[source] DriverError),

    #[error("failed to close connection: {0}")]
    Close(#[source] DriverError),

    /// The facade was closed and cannot be reused.
    #[error("metadata facade is closed")]
    Closed,
}

impl MetadataError {
    /// The underlying driver error, if any.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            MetadataError::Config(e)
            | MetadataError::Connection(e)
            | MetadataError::MetadataAcquisition(e)
            | MetadataError::Cursor(e)
            | MetadataError::Close(e) => Some(e),
            MetadataError::Query { source, .. } => Some(source),
            MetadataError::Closed => None,
        }
    }
}
