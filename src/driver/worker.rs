//! Driver backed by an external worker process.
//!
//! The worker binary is the driver artifact named by `libpath`. Loading the
//! driver spawns it once and asks it to register `drivername`; every
//! connection opened through the driver then shares that process.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{
    BufferedCursor, CatalogMetadata, Cursor, Driver, DriverConnection, DriverError, DriverResult,
};
use crate::worker::protocol::{
    methods, CatalogParams, ConnectionRef, OpenParams, OpenResponse, RegisterDriverParams,
    ResultSetPayload,
};
use crate::worker::WorkerClient;

/// A driver whose catalog calls are answered by a worker process.
pub struct WorkerDriver {
    name: String,
    client: Arc<WorkerClient>,
}

impl WorkerDriver {
    /// Spawn the worker at `libpath` and register `drivername` inside it.
    pub async fn load(libpath: &Path, drivername: &str, timeout: Duration) -> DriverResult<Self> {
        let client = WorkerClient::spawn_with_timeout(libpath, timeout).await?;
        debug!(
            driver = drivername,
            timeout_secs = client.timeout().as_secs(),
            "registering driver with worker"
        );
        Self::register(Arc::new(client), drivername).await
    }

    /// Register `drivername` with an already running worker.
    pub async fn register(client: Arc<WorkerClient>, drivername: &str) -> DriverResult<Self> {
        let _: serde_json::Value = client
            .request(
                methods::REGISTER_DRIVER,
                RegisterDriverParams {
                    driver: drivername.to_string(),
                },
            )
            .await?;

        Ok(Self {
            name: drivername.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Driver for WorkerDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.client.is_alive()
    }

    async fn connect(
        &self,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> DriverResult<Box<dyn DriverConnection>> {
        let response: OpenResponse = self
            .client
            .request(
                methods::OPEN,
                OpenParams {
                    driver: self.name.clone(),
                    url: url.to_string(),
                    user: user.map(str::to_string),
                    password: password.map(str::to_string),
                },
            )
            .await?;

        debug!(connection_id = %response.connection_id, "worker connection opened");

        Ok(Box::new(WorkerConnection {
            client: self.client.clone(),
            connection_id: response.connection_id,
        }))
    }
}

struct WorkerConnection {
    client: Arc<WorkerClient>,
    connection_id: String,
}

impl WorkerConnection {
    fn connection_ref(&self) -> ConnectionRef {
        ConnectionRef {
            connection_id: self.connection_id.clone(),
        }
    }
}

#[async_trait]
impl DriverConnection for WorkerConnection {
    async fn metadata(&self) -> DriverResult<Arc<dyn CatalogMetadata>> {
        let _: serde_json::Value = self
            .client
            .request(methods::METADATA, self.connection_ref())
            .await?;

        Ok(Arc::new(WorkerMetadata {
            client: self.client.clone(),
            connection_id: self.connection_id.clone(),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        let _: serde_json::Value = self
            .client
            .request(methods::CLOSE, self.connection_ref())
            .await?;
        Ok(())
    }
}

/// Metadata handle of a worker connection.
///
/// The worker owns the real handle; after the connection is closed the
/// worker rejects calls that name it.
struct WorkerMetadata {
    client: Arc<WorkerClient>,
    connection_id: String,
}

impl WorkerMetadata {
    fn params(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> CatalogParams {
        CatalogParams {
            connection_id: self.connection_id.clone(),
            catalog: catalog.map(str::to_string),
            schema: schema.map(str::to_string),
            table: table.map(str::to_string),
            column: None,
            types: None,
        }
    }

    async fn fetch(&self, method: &str, params: CatalogParams) -> DriverResult<Box<dyn Cursor>> {
        let payload: ResultSetPayload = self.client.request(method, params).await?;
        if payload.columns.is_empty() && !payload.rows.is_empty() {
            return Err(DriverError::Other(format!(
                "{method} returned rows without column names"
            )));
        }
        Ok(Box::new(BufferedCursor::new(payload.columns, payload.rows)))
    }
}

#[async_trait]
impl CatalogMetadata for WorkerMetadata {
    async fn get_tables(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        types: &[String],
    ) -> DriverResult<Box<dyn Cursor>> {
        let mut params = self.params(catalog, schema_pattern, table_pattern);
        params.types = Some(types.to_vec());
        self.fetch(methods::GET_TABLES, params).await
    }

    async fn get_columns(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        let mut params = self.params(catalog, schema_pattern, table_pattern);
        params.column = column_pattern.map(str::to_string);
        self.fetch(methods::GET_COLUMNS, params).await
    }

    async fn get_primary_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.fetch(methods::GET_PRIMARY_KEYS, self.params(catalog, schema, table))
            .await
    }

    async fn get_imported_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.fetch(methods::GET_IMPORTED_KEYS, self.params(catalog, schema, table))
            .await
    }

    async fn get_exported_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.fetch(methods::GET_EXPORTED_KEYS, self.params(catalog, schema, table))
            .await
    }
}
