//! Catalog metadata access.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MetadataFacade                             │
//! │  Cold ─▶ ConnectedNoMetadata ─▶ Ready(metadata) ─▶ Closed       │
//! │                                                                 │
//! │  tables() columns() primary_keys() imported_keys()              │
//! │  exported_keys()          ──▶ normalize(cursor) ──▶ Vec<Record>  │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           ConnectionHandle ──▶ DriverRegistry ──▶ Driver          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are keyed by the camelCase form of the driver's column names
//! (`TABLE_NAME` becomes `tableName`).

mod facade;
mod normalize;
mod options;
mod record;

pub use facade::{FacadeStatus, MetadataFacade};
pub use normalize::{field_name, normalize};
pub use options::QueryOptions;
pub use record::Record;
