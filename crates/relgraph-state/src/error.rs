//! Error types for relgraph-state

use thiserror::Error;

/// Errors raised while connecting to or preparing a backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors raised by [`RowStore`](crate::RowStore) and
/// [`ActivitySink`](crate::ActivitySink) implementations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// An update targeted a row that does not exist
    #[error("row not found: {table}#{id}")]
    RowNotFound { table: String, id: i64 },

    /// A stored row could not be encoded or decoded
    #[error("row codec failed for table {table}: {reason}")]
    Codec { table: String, reason: String },

    /// A query referenced something the backend cannot evaluate
    #[error("invalid query on {table}: {reason}")]
    InvalidQuery { table: String, reason: String },

    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
