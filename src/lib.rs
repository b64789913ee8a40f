//! # dbmeta
//!
//! Lazy, cached catalog introspection over pluggable database drivers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    MetadataFacade                        │
//! │   tables / columns / primary, imported, exported keys    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [ConnectionHandle]
//! ┌─────────────────────────────────────────────────────────┐
//! │                   DriverRegistry                         │
//! │        built-in SQLite  │  external worker drivers       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [Cursor]
//! ┌─────────────────────────────────────────────────────────┐
//! │              normalize ──▶ Vec<Record>                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! A facade is constructed from a [`DriverConfig`] and does nothing until the
//! first query. It then initializes the driver, opens one connection and
//! caches the connection's metadata handle for every later query.

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod metadata;
pub mod worker;

pub use config::DriverConfig;
pub use error::{CatalogOperation, MetadataError, MetadataResult};
pub use metadata::{FacadeStatus, MetadataFacade, QueryOptions, Record};
