//! Configuration module for dbmeta.
//!
//! Handles driver configuration, environment variables, and settings files.

mod connection;
mod settings;

pub use connection::{ConfigError, DriverConfig};
pub use settings::{expand_env_vars, ConnectionSettings, Settings, SettingsError, WorkerSettings};
