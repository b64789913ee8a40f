//! Protocol types for external driver workers.
//!
//! A worker is a long-running child process that owns the native database
//! driver. Requests and responses are single JSON objects, one per line.

use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Envelope
// ============================================================================

/// Request envelope sent to the worker.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation.
    pub id: String,
    /// Method name (e.g., "catalog.get_tables").
    pub method: String,
    /// Method-specific parameters.
    pub params: serde_json::Value,
}

/// Response envelope received from the worker.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to.
    pub id: String,
    /// Whether the request succeeded.
    pub success: bool,
    /// Result data (present if success = true).
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error information (present if success = false).
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

/// Error information in a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Method names understood by a driver worker.
pub mod methods {
    pub const REGISTER_DRIVER: &str = "driver.register";
    pub const OPEN: &str = "connection.open";
    pub const METADATA: &str = "connection.metadata";
    pub const CLOSE: &str = "connection.close";
    pub const GET_TABLES: &str = "catalog.get_tables";
    pub const GET_COLUMNS: &str = "catalog.get_columns";
    pub const GET_PRIMARY_KEYS: &str = "catalog.get_primary_keys";
    pub const GET_IMPORTED_KEYS: &str = "catalog.get_imported_keys";
    pub const GET_EXPORTED_KEYS: &str = "catalog.get_exported_keys";
}

// ============================================================================
// Driver and connection lifecycle
// ============================================================================

/// Parameters for `driver.register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterDriverParams {
    /// Driver identifier to instantiate inside the worker.
    pub driver: String,
}

/// Parameters for `connection.open`.
#[derive(Debug, Clone, Serialize)]
pub struct OpenParams {
    pub driver: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Response for `connection.open`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenResponse {
    /// Worker-side handle for the opened connection.
    pub connection_id: String,
}

/// Parameters for `connection.metadata` and `connection.close`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRef {
    pub connection_id: String,
}

// ============================================================================
// Catalog calls
// ============================================================================

/// Parameters shared by every `catalog.*` method.
///
/// `None` fields are sent as `null`, meaning "no constraint".
#[derive(Debug, Clone, Serialize)]
pub struct CatalogParams {
    pub connection_id: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub types: Option<Vec<String>>,
}

/// Tabular result of a catalog call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultSetPayload {
    /// Column names in declaration order.
    pub columns: Vec<String>,
    /// Row values, `null` for SQL NULL.
    #[serde(default)]
    pub rows: Vec<Vec<Option<String>>>,
}
