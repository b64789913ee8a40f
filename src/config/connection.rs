//! Driver connection configuration.
//!
//! Supports configuration via environment variables:
//! - `DBMETA_DRIVER`: Driver identifier (e.g. `sqlite`, `com.mysql.jdbc.Driver`)
//! - `DBMETA_URL`: Connection string
//! - `DBMETA_LIBPATH`: Path to an external driver worker (optional)
//! - `DBMETA_USER` / `DBMETA_PASSWORD`: Credentials (optional)

use std::env;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Error type for connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Everything needed to locate a driver and open one connection with it.
///
/// Supplied once when a [`MetadataFacade`](crate::MetadataFacade) is built
/// and never mutated afterwards.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Location of the driver artifact to load. Built-in drivers ignore it.
    #[serde(default)]
    pub libpath: Option<PathBuf>,
    /// Driver identifier to resolve and register.
    pub drivername: String,
    /// Connection string.
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl DriverConfig {
    /// Create a config for a driver and connection string, without credentials.
    pub fn new(drivername: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            libpath: None,
            drivername: drivername.into(),
            url: url.into(),
            user: None,
            password: None,
        }
    }

    /// Create a config for the built-in SQLite driver.
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self::new("sqlite", format!("jdbc:sqlite:{}", path.as_ref()))
    }

    /// Set the external driver artifact.
    pub fn with_libpath(mut self, libpath: impl Into<PathBuf>) -> Self {
        self.libpath = Some(libpath.into());
        self
    }

    /// Set user and password.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Required: `DBMETA_DRIVER`, `DBMETA_URL`.
    /// Optional: `DBMETA_LIBPATH`, `DBMETA_USER`, `DBMETA_PASSWORD`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let drivername = env::var("DBMETA_DRIVER")
            .map_err(|_| ConfigError::MissingEnvVar("DBMETA_DRIVER".to_string()))?;
        let url = env::var("DBMETA_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DBMETA_URL".to_string()))?;

        let config = Self {
            libpath: env::var_os("DBMETA_LIBPATH").map(PathBuf::from),
            drivername,
            url,
            user: env::var("DBMETA_USER").ok(),
            password: env::var("DBMETA_PASSWORD").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that can never open a connection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drivername.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("drivername is empty".to_string()));
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("url is empty".to_string()));
        }
        if matches!(&self.libpath, Some(p) if p.as_os_str().is_empty()) {
            return Err(ConfigError::InvalidConfig("libpath is empty".to_string()));
        }
        Ok(())
    }
}

// Keep the password out of logs and panic messages.
impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("libpath", &self.libpath)
            .field("drivername", &self.drivername)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
