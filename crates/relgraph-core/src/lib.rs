//! relgraph core library
//!
//! Persists nested record graphs against a relational schema and reads
//! them back in the same nested shape.
//!
//! ## Key Components
//!
//! - [`CascadeWriter`]: recursive save of a record and its related rows,
//!   with activity logging
//! - [`RelationshipHydrator`]: expands to-one, one-to-many and many-to-many
//!   columns of stored rows
//! - [`EntryService`]: paged listing, single lookup and collection updates
//! - [`coerce`]: storage values to typed JSON values
//!
//! Storage lives behind the `relgraph-state` traits; schemas, permissions,
//! the current actor and field validators are supplied through
//! [`Collaborators`].

pub mod access;
pub mod cascade;
pub mod coerce;
pub mod collaborators;
pub mod entries;
pub mod error;
pub mod hydrate;
pub mod obs;
pub mod record;
pub mod schema;
pub mod telemetry;
pub mod validation;

pub use access::{AccessControl, AllowAll, CurrentActor, ReadBlacklist, StaticActor};
pub use cascade::{ActivityMode, CascadeContext, CascadeWriter, PersistedRow};
pub use coerce::{coerce, coerce_row, TypeFamily};
pub use collaborators::Collaborators;
pub use entries::{
    find_record_identifier, Entries, EntriesQuery, EntrySet, EntryService, EntryTotals,
    StateCounts,
};
pub use error::{ErrorKind, RelgraphError, Result};
pub use hydrate::RelationshipHydrator;
pub use record::{contains_non_primary_key_data, fragment_from_value, Fragment};
pub use schema::{
    ColumnDescriptor, RelationshipKind, SchemaProvider, SchemaRegistry, TableSchema,
};
pub use telemetry::{init_tracing, LogFormat};
pub use validation::{FieldValidator, ValidatorRegistry};

pub use relgraph_state::{
    ActivityAction, ActivityEntry, ActivityRecord, ActivitySink, ActivityType, Row, RowId,
    RowStore, SurrealHandle,
};

/// relgraph version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
