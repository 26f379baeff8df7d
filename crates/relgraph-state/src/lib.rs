//! relgraph-state: row persistence for the relgraph cascade engine
//!
//! This crate owns every byte that hits a backend: flat rows keyed by
//! table and integer id, and the append-only activity log. The cascade
//! engine in `relgraph-core` only talks to the traits defined here.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: single-row atomic writes and a small select primitive. There is no
//! multi-row transaction.
//!
//! ## Key Components
//!
//! - `RowStore` / `ActivitySink`: the storage seams
//! - `MemoryRowStore` / `MemoryActivityLog`: in-memory fakes
//! - `SurrealHandle`: SurrealDB connection, hands out `SurrealRowStore` and
//!   `SurrealActivityLog`

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
pub mod query;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{ConnectionConfig, SurrealHandle};
pub use storage_traits::{
    value_as_row_id, ActivityAction, ActivityEntry, ActivityId, ActivityRecord, ActivitySink,
    ActivityType, Direction, Filter, Join, Row, RowId, RowQuery, RowStore, StorageResult,
    PRIMARY_KEY,
};
pub use surreal_store::{SurrealActivityLog, SurrealRowStore};

/// Result type for connection and setup operations
pub type Result<T> = std::result::Result<T, StateError>;
