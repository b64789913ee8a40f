//! MetadataFacade: lazily connected, cached catalog access.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{normalize, QueryOptions, Record};
use crate::config::DriverConfig;
use crate::connection::ConnectionHandle;
use crate::driver::{CatalogMetadata, Cursor, DriverError, DriverRegistry, DriverResult};
use crate::error::{CatalogOperation, MetadataError, MetadataResult};

/// Snapshot of where a facade is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeStatus {
    Cold,
    ConnectedNoMetadata,
    Ready,
    Closed,
}

impl fmt::Display for FacadeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FacadeStatus::Cold => "cold",
            FacadeStatus::ConnectedNoMetadata => "connected",
            FacadeStatus::Ready => "ready",
            FacadeStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

enum FacadeState {
    Cold,
    ConnectedNoMetadata,
    Ready(Arc<dyn CatalogMetadata>),
    Closed,
}

impl FacadeState {
    fn status(&self) -> FacadeStatus {
        match self {
            FacadeState::Cold => FacadeStatus::Cold,
            FacadeState::ConnectedNoMetadata => FacadeStatus::ConnectedNoMetadata,
            FacadeState::Ready(_) => FacadeStatus::Ready,
            FacadeState::Closed => FacadeStatus::Closed,
        }
    }
}

struct Inner {
    handle: ConnectionHandle,
    state: FacadeState,
}

/// Catalog introspection over one lazily opened connection.
///
/// Construction never touches the database. The first operation initializes
/// the driver, opens the connection and acquires the metadata handle; later
/// operations reuse that handle. Each operation holds an internal lock until
/// it completes, so a facade can be shared behind an [`Arc`] and concurrent
/// first calls acquire metadata once.
///
/// A closed facade stays closed: every later query fails with
/// [`MetadataError::Closed`].
///
/// # Example
///
/// ```ignore
/// use dbmeta::{DriverConfig, MetadataFacade, QueryOptions};
///
/// let facade = MetadataFacade::new(DriverConfig::sqlite("./app.db"));
/// let keys = facade
///     .primary_keys(&QueryOptions::new().table("employees"))
///     .await?;
/// for key in &keys {
///     println!("{:?} {:?}", key.get("columnName"), key.get("keySeq"));
/// }
/// facade.close().await?;
/// ```
pub struct MetadataFacade {
    config: Arc<DriverConfig>,
    inner: Mutex<Inner>,
}

impl MetadataFacade {
    /// Create a facade resolving drivers through a fresh built-in registry.
    pub fn new(config: DriverConfig) -> Self {
        Self::with_registry(config, Arc::new(DriverRegistry::with_builtin()))
    }

    /// Create a facade resolving drivers through `registry`.
    pub fn with_registry(config: DriverConfig, registry: Arc<DriverRegistry>) -> Self {
        let config = Arc::new(config);
        Self {
            inner: Mutex::new(Inner {
                handle: ConnectionHandle::new(config.clone(), registry),
                state: FacadeState::Cold,
            }),
            config,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Current lifecycle state. Waits for an in-flight operation to finish.
    pub async fn state(&self) -> FacadeStatus {
        self.inner.lock().await.state.status()
    }

    /// The cached metadata handle, connecting first if needed.
    pub async fn metadata(&self) -> MetadataResult<Arc<dyn CatalogMetadata>> {
        let mut inner = self.inner.lock().await;
        Self::ensure_ready(&mut inner).await
    }

    /// Tables and views matching `catalog`, `schema`, `table` and `types`.
    pub async fn tables(&self, options: &QueryOptions) -> MetadataResult<Vec<Record>> {
        let operation = CatalogOperation::Tables;
        let mut inner = self.inner.lock().await;
        let metadata = Self::ensure_ready(&mut inner).await?;

        let cursor = metadata
            .get_tables(
                options.catalog_ref(),
                options.schema_ref(),
                options.table_ref(),
                &options.types,
            )
            .await;
        Self::records(operation, cursor)
    }

    /// Columns matching `catalog`, `schema`, `table` and `column`.
    pub async fn columns(&self, options: &QueryOptions) -> MetadataResult<Vec<Record>> {
        let operation = CatalogOperation::Columns;
        let mut inner = self.inner.lock().await;
        let metadata = Self::ensure_ready(&mut inner).await?;

        let cursor = metadata
            .get_columns(
                options.catalog_ref(),
                options.schema_ref(),
                options.table_ref(),
                options.column_ref(),
            )
            .await;
        Self::records(operation, cursor)
    }

    /// Primary key columns of `table`, one record per key column.
    ///
    /// Only `catalog`, `schema` and `table` are forwarded to the driver. The
    /// `column` and `types` filters do not apply to key lookups.
    ///
    /// # Errors
    ///
    /// Returns the connection error if the facade cannot become ready, or
    /// [`MetadataError::Query`] if the driver call or row read fails.
    pub async fn primary_keys(&self, options: &QueryOptions) -> MetadataResult<Vec<Record>> {
        let operation = CatalogOperation::PrimaryKeys;
        let mut inner = self.inner.lock().await;
        let metadata = Self::ensure_ready(&mut inner).await?;

        let cursor = metadata
            .get_primary_keys(options.catalog_ref(), options.schema_ref(), options.table_ref())
            .await;
        Self::records(operation, cursor)
    }

    /// Foreign keys declared by `table`.
    pub async fn imported_keys(&self, options: &QueryOptions) -> MetadataResult<Vec<Record>> {
        let operation = CatalogOperation::ImportedKeys;
        let mut inner = self.inner.lock().await;
        let metadata = Self::ensure_ready(&mut inner).await?;

        let cursor = metadata
            .get_imported_keys(options.catalog_ref(), options.schema_ref(), options.table_ref())
            .await;
        Self::records(operation, cursor)
    }

    /// Foreign keys in other tables that reference `table`.
    pub async fn exported_keys(&self, options: &QueryOptions) -> MetadataResult<Vec<Record>> {
        let operation = CatalogOperation::ExportedKeys;
        let mut inner = self.inner.lock().await;
        let metadata = Self::ensure_ready(&mut inner).await?;

        let cursor = metadata
            .get_exported_keys(options.catalog_ref(), options.schema_ref(), options.table_ref())
            .await;
        Self::records(operation, cursor)
    }

    /// Release the connection and cached handle.
    ///
    /// No-op on a facade that never connected, and on one already closed.
    pub async fn close(&self) -> MetadataResult<()> {
        let mut inner = self.inner.lock().await;
        let opened = matches!(
            inner.state,
            FacadeState::ConnectedNoMetadata | FacadeState::Ready(_)
        );
        if !opened {
            return Ok(());
        }

        inner.state = FacadeState::Closed;
        let result = inner.handle.close().await;
        info!(driver = %self.config.drivername, "metadata facade closed");
        result
    }

    /// Advance the state machine until a metadata handle is cached.
    ///
    /// A failure leaves the state at the last completed step, so the next
    /// call retries only the step that failed.
    async fn ensure_ready(inner: &mut Inner) -> MetadataResult<Arc<dyn CatalogMetadata>> {
        loop {
            match &inner.state {
                FacadeState::Ready(metadata) => return Ok(metadata.clone()),
                FacadeState::Closed => return Err(MetadataError::Closed),
                FacadeState::Cold => {
                    inner.handle.initialize().await?;
                    inner.handle.open().await?;
                    inner.state = FacadeState::ConnectedNoMetadata;
                }
                FacadeState::ConnectedNoMetadata => {
                    let connection = inner
                        .handle
                        .connection()
                        .ok_or(MetadataError::MetadataAcquisition(DriverError::Closed))?;
                    let metadata = connection
                        .metadata()
                        .await
                        .map_err(MetadataError::MetadataAcquisition)?;
                    debug!(driver = %inner.handle.config().drivername, "metadata acquired");
                    inner.state = FacadeState::Ready(metadata);
                }
            }
        }
    }

    fn records(
        operation: CatalogOperation,
        cursor: DriverResult<Box<dyn Cursor>>,
    ) -> MetadataResult<Vec<Record>> {
        let cursor = cursor.map_err(|source| MetadataError::Query { operation, source })?;
        let records = normalize(cursor).map_err(MetadataError::Cursor)?;
        debug!(operation = %operation, rows = records.len(), "catalog call completed");
        Ok(records)
    }
}

impl fmt::Debug for MetadataFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataFacade")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
