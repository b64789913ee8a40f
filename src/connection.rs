//! Lifecycle of the single connection behind a facade.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::DriverConfig;
use crate::driver::{Driver, DriverConnection, DriverError, DriverRegistry};
use crate::error::{MetadataError, MetadataResult};

/// Observable state of a [`ConnectionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    Unopened,
    Open,
    Closed,
}

impl fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandleStatus::Unopened => "unopened",
            HandleStatus::Open => "open",
            HandleStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

enum HandleState {
    Unopened,
    Open(Box<dyn DriverConnection>),
    Closed,
}

/// Owns at most one live connection: `Unopened -> Open -> Closed`.
///
/// `Closed` is terminal. The handle has no internal locking; its owner
/// serializes calls.
pub struct ConnectionHandle {
    config: Arc<DriverConfig>,
    registry: Arc<DriverRegistry>,
    driver: Option<Arc<dyn Driver>>,
    state: HandleState,
}

impl ConnectionHandle {
    pub fn new(config: Arc<DriverConfig>, registry: Arc<DriverRegistry>) -> Self {
        Self {
            config,
            registry,
            driver: None,
            state: HandleState::Unopened,
        }
    }

    /// Resolve and register the configured driver. No-op once it succeeded,
    /// unless the resolved driver has since become unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Config`] if the registry cannot resolve or
    /// load the driver.
    pub async fn initialize(&mut self) -> MetadataResult<()> {
        if matches!(&self.driver, Some(driver) if driver.is_available()) {
            return Ok(());
        }

        let driver = self
            .registry
            .load(&self.config)
            .await
            .map_err(MetadataError::Config)?;
        info!(driver = %self.config.drivername, "driver initialized");
        self.driver = Some(driver);
        Ok(())
    }

    /// Whether a driver has been resolved. Stays `true` after the driver
    /// becomes unavailable; [`initialize`](Self::initialize) re-resolves it.
    pub fn is_initialized(&self) -> bool {
        self.driver.is_some()
    }

    /// Open the connection. No-op when already open.
    pub async fn open(&mut self) -> MetadataResult<()> {
        match self.state {
            HandleState::Open(_) => return Ok(()),
            HandleState::Closed => return Err(MetadataError::Connection(DriverError::Closed)),
            HandleState::Unopened => {}
        }

        let driver = self
            .driver
            .as_ref()
            .ok_or(MetadataError::Connection(DriverError::NotInitialized))?;

        let connection = driver
            .connect(
                &self.config.url,
                self.config.user.as_deref(),
                self.config.password.as_deref(),
            )
            .await
            .map_err(MetadataError::Connection)?;

        debug!(driver = %self.config.drivername, "connection opened");
        self.state = HandleState::Open(connection);
        Ok(())
    }

    /// The live connection, if open.
    pub fn connection(&self) -> Option<&dyn DriverConnection> {
        match &self.state {
            HandleState::Open(conn) => Some(conn.as_ref()),
            _ => None,
        }
    }

    /// Release the connection. No-op unless open.
    ///
    /// The handle is `Closed` afterwards even if the driver reports an error,
    /// so the driver close runs at most once.
    pub async fn close(&mut self) -> MetadataResult<()> {
        match std::mem::replace(&mut self.state, HandleState::Closed) {
            HandleState::Open(conn) => {
                debug!(driver = %self.config.drivername, "closing connection");
                conn.close().await.map_err(MetadataError::Close)
            }
            // Never opened: stay reusable.
            HandleState::Unopened => {
                self.state = HandleState::Unopened;
                Ok(())
            }
            HandleState::Closed => Ok(()),
        }
    }

    /// Current lifecycle position of the handle.
    pub fn status(&self) -> HandleStatus {
        match self.state {
            HandleState::Unopened => HandleStatus::Unopened,
            HandleState::Open(_) => HandleStatus::Open,
            HandleState::Closed => HandleStatus::Closed,
        }
    }

    /// The configuration this handle connects with.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}
