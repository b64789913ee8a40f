//! TOML-based configuration for dbmeta.
//!
//! Supports a config file (dbmeta.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [connections.dev]
//! drivername = "sqlite"
//! url = "jdbc:sqlite:./data/dev.db"
//!
//! [connections.warehouse]
//! libpath = "/opt/drivers/dbmeta-mysql-worker"
//! drivername = "com.mysql.jdbc.Driver"
//! url = "jdbc:mysql://localhost:3306/test"
//! user = "root"
//! password = "${MYSQL_PASSWORD}"
//!
//! [worker]
//! timeout_secs = 60
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::connection::DriverConfig;
use crate::worker::DEFAULT_TIMEOUT_SECS;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid variable reference: {0}")]
    InvalidSyntax(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Named database connections.
    pub connections: HashMap<String, ConnectionSettings>,

    /// Driver worker configuration.
    pub worker: WorkerSettings,
}

/// One named connection. String fields support `${ENV_VAR}` expansion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub libpath: Option<String>,
    pub drivername: String,
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ConnectionSettings {
    /// Build a [`DriverConfig`] with environment variables expanded.
    pub fn to_driver_config(&self) -> Result<DriverConfig, SettingsError> {
        let expand_opt = |value: &Option<String>| value.as_deref().map(expand_env_vars).transpose();

        Ok(DriverConfig {
            libpath: expand_opt(&self.libpath)?.map(PathBuf::from),
            drivername: self.drivername.clone(),
            url: expand_env_vars(&self.url)?,
            user: expand_opt(&self.user)?,
            password: expand_opt(&self.password)?,
        })
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Per-request timeout for external driver workers.
    pub timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl WorkerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `DBMETA_CONFIG`
    /// 2. `./dbmeta.toml`
    /// 3. `<config dir>/dbmeta/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("DBMETA_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("dbmeta.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dbmeta").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Get a connection by name.
    pub fn get_connection(&self, name: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(name)
            .ok_or_else(|| SettingsError::ConnectionNotFound(name.to_string()))
    }

    /// Get the default connection: the one named "default", or the only one defined.
    pub fn default_connection(&self) -> Option<(&str, &ConnectionSettings)> {
        if let Some(conn) = self.connections.get("default") {
            return Some(("default", conn));
        }
        if self.connections.len() == 1 {
            return self.connections.iter().next().map(|(k, v)| (k.as_str(), v));
        }
        None
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. `$$` yields a literal `$`, and a
/// `$` not followed by a name is kept as-is.
///
/// # Errors
///
/// Returns [`SettingsError::MissingEnvVar`] for an unset variable and
/// [`SettingsError::InvalidSyntax`] for an empty or unterminated `${`.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        if chars.peek() == Some(&'$') {
            chars.next();
            result.push('$');
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                var_name.push(ch);
            }
            if !closed {
                return Err(SettingsError::InvalidSyntax(format!(
                    "unterminated `${{{var_name}` in {s:?}"
                )));
            }
            if var_name.is_empty() {
                return Err(SettingsError::InvalidSyntax(format!("empty `${{}}` in {s:?}")));
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
