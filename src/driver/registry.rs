//! Runtime driver registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Driver, DriverError, DriverResult, SqliteDriver, WorkerDriver};
use crate::config::DriverConfig;
use crate::worker::DEFAULT_TIMEOUT_SECS;

/// Names the built-in SQLite driver answers to.
const SQLITE_ALIASES: &[&str] = &["sqlite", "sqlite3", "org.sqlite.JDBC"];

/// Maps driver identifiers to loaded drivers.
///
/// Lookups are exact on the identifier. Drivers loaded from a `libpath` are
/// registered under the config's `drivername`, so the external artifact is
/// spawned at most once per registry.
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
    worker_timeout: Duration,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl DriverRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            worker_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// A registry holding the drivers that ship with this crate.
    pub fn with_builtin() -> Self {
        let registry = Self::empty();
        let sqlite: Arc<dyn Driver> = Arc::new(SqliteDriver);
        for alias in SQLITE_ALIASES {
            registry.register(*alias, sqlite.clone());
        }
        registry
    }

    /// Request timeout applied to workers this registry spawns.
    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Register `driver` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        let name = name.into();
        debug!(driver = %name, "registering driver");
        self.write().insert(name, driver);
    }

    /// Look up a registered driver.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Resolve the driver a config asks for.
    ///
    /// A driver already registered under `drivername` wins. Otherwise the
    /// config's `libpath` is loaded as a driver worker and registered.
    ///
    /// A registered driver that is no longer available is replaced by a
    /// fresh load when the config names a `libpath`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::UnknownDriver`] when nothing is registered and
    /// no `libpath` is set, or the worker error if loading fails.
    pub async fn load(&self, config: &DriverConfig) -> DriverResult<Arc<dyn Driver>> {
        if let Some(driver) = self.get(&config.drivername) {
            if driver.is_available() || config.libpath.is_none() {
                return Ok(driver);
            }
            warn!(driver = %config.drivername, "driver worker exited, reloading");
            self.write().remove(&config.drivername);
        }

        let libpath = config
            .libpath
            .as_ref()
            .ok_or_else(|| DriverError::UnknownDriver(config.drivername.clone()))?;

        let driver: Arc<dyn Driver> = Arc::new(
            WorkerDriver::load(libpath, &config.drivername, self.worker_timeout).await?,
        );
        info!(driver = %config.drivername, libpath = %libpath.display(), "loaded driver worker");
        self.register(config.drivername.clone(), driver.clone());
        Ok(driver)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn Driver>>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.drivers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn Driver>>> {
        self.drivers.write().unwrap_or_else(|e| e.into_inner())
    }
}
