//! Error taxonomy for the cascade engine.

use relgraph_state::{RowId, StorageError};

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The schema itself is broken; fix metadata before retrying.
    Configuration,
    /// Caller input was rejected; retry after correcting it.
    Validation,
    /// A row vanished right after being written.
    Consistency,
    /// The payload is not shaped like a record fragment.
    Payload,
    /// Backend failure.
    Storage,
}

/// relgraph engine errors.
#[derive(Debug, thiserror::Error)]
pub enum RelgraphError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("relationship metadata on {table}.{column} lacks values: {}", .missing.join(" "))]
    RelationshipMetadata {
        table: String,
        column: String,
        missing: Vec<String>,
    },

    #[error("custom field validation failed for {table}[{column}] via {ui}: {reason}")]
    Validation {
        table: String,
        column: String,
        ui: String,
        reason: String,
    },

    #[error("reload of {state} record {table}#{row_id:?} after write returned nothing")]
    Consistency {
        table: String,
        row_id: Option<RowId>,
        state: &'static str,
    },

    #[error("invalid payload for {table}: {reason}")]
    InvalidPayload { table: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelgraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelgraphError::UnknownTable(_) | RelgraphError::RelationshipMetadata { .. } => {
                ErrorKind::Configuration
            }
            RelgraphError::Validation { .. } => ErrorKind::Validation,
            RelgraphError::Consistency { .. } => ErrorKind::Consistency,
            RelgraphError::InvalidPayload { .. } | RelgraphError::Serialization(_) => {
                ErrorKind::Payload
            }
            RelgraphError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the same call may succeed once the caller fixes its input.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Payload)
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RelgraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_error_lists_missing_keys() {
        let err = RelgraphError::RelationshipMetadata {
            table: "people".to_string(),
            column: "tags".to_string(),
            missing: vec!["junction_table".to_string(), "junction_key_left".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("people.tags"));
        assert!(msg.contains("junction_table junction_key_left"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_error_is_retryable() {
        let err = RelgraphError::Validation {
            table: "people".to_string(),
            column: "tags".to_string(),
            ui: "checkboxes".to_string(),
            reason: "too many".to_string(),
        };
        assert!(err.to_string().contains("people[tags]"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_consistency_error_is_fatal() {
        let err = RelgraphError::Consistency {
            table: "people".to_string(),
            row_id: Some(3),
            state: "new",
        };
        assert!(err.to_string().contains("new record people#Some(3)"));
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(!err.is_retryable());
    }
}
