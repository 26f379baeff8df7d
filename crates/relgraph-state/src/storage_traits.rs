//! Storage trait definitions for relgraph
//!
//! These traits define the storage seams the cascade engine talks to:
//! - `RowStore`: row persistence (insert/update/find/delete) plus a small
//!   select primitive with projection, filters, one join, grouping and paging
//! - `ActivitySink`: append-only audit log of changed records
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Primary key of a stored row.
pub type RowId = i64;

/// Name of the primary key column on every table.
pub const PRIMARY_KEY: &str = "id";

/// A flat stored row: column id to JSON value.
pub type Row = Map<String, Value>;

/// Read a primary/foreign key out of a JSON value.
///
/// Accepts integers, integral floats and numeric strings; everything else
/// (including `null`) is not an id.
pub fn value_as_row_id(value: &Value) -> Option<RowId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// RowQuery: select primitive
// ---------------------------------------------------------------------------

/// A single predicate applied to the (possibly joined) row.
///
/// Column names are either plain (`label`) or qualified with a table name
/// (`post_tags.post_id`); joined columns are only reachable qualified.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value` (numeric strings compare equal to numbers)
    Eq { column: String, value: Value },
    /// `column IN (values)`
    In { column: String, values: Vec<Value> },
    /// Case-insensitive substring match on any of the columns (OR-ed)
    ContainsAny { columns: Vec<String>, needle: String },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In {
            column: column.into(),
            values,
        }
    }

    pub fn contains_any(columns: Vec<String>, needle: impl Into<String>) -> Self {
        Filter::ContainsAny {
            columns,
            needle: needle.into(),
        }
    }
}

/// Inner join of the base table against a second table.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Joined table name
    pub table: String,
    /// Column on the base table
    pub base_column: String,
    /// Column on the joined table that must equal `base_column`
    pub joined_column: String,
    /// Joined columns copied into the result as `(alias, column)`
    pub columns: Vec<(String, String)>,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Parameterized select against one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowQuery {
    pub table: String,
    /// Base-table projection; `None` selects every stored column
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub join: Option<Join>,
    /// Keep only the first row for each distinct value of this column
    pub group_by: Option<String>,
    pub order_by: Vec<(String, Direction)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl RowQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Row persistence primitive.
///
/// Guarantees:
/// - `insert` assigns a fresh, strictly increasing id per table and stores it
///   under [`PRIMARY_KEY`]; any id present in `fields` is ignored.
/// - `update` merges `fields` into the stored row and fails with
///   `StorageError::RowNotFound` when the row is absent.
/// - Each call is atomic on its own; there is no multi-call transaction.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert a new row and return its id.
    async fn insert(&self, table: &str, fields: Row) -> StorageResult<RowId>;

    /// Merge `fields` into an existing row.
    async fn update(&self, table: &str, id: RowId, fields: Row) -> StorageResult<()>;

    /// Fetch a full row by id.
    async fn find_by_id(&self, table: &str, id: RowId) -> StorageResult<Option<Row>>;

    /// Delete every row matching all filters, returning how many went away.
    async fn delete_where(&self, table: &str, filters: &[Filter]) -> StorageResult<u64>;

    /// Run a select.
    async fn select(&self, query: &RowQuery) -> StorageResult<Vec<Row>>;

    /// Count rows matching the query's filters (paging is ignored).
    async fn count(&self, query: &RowQuery) -> StorageResult<u64>;
}

// ---------------------------------------------------------------------------
// ActivitySink: audit trail
// ---------------------------------------------------------------------------

/// Identifier of a stored activity entry
pub type ActivityId = i64;

/// What happened to the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityAction {
    Add,
    Update,
}

/// Coarse category of the logged record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityType {
    Entry,
    Media,
    Settings,
}

impl ActivityType {
    /// Derive the log category from the table a record lives in.
    pub fn for_table(table: &str) -> Self {
        if table.ends_with("media") {
            ActivityType::Media
        } else if table.ends_with("settings") {
            ActivityType::Settings
        } else {
            ActivityType::Entry
        }
    }
}

/// One audit entry for a meaningfully changed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub table_name: String,
    pub action: ActivityAction,
    pub actor_id: Option<RowId>,
    pub timestamp: DateTime<Utc>,
    /// Full post-write snapshot of the row
    pub data: Value,
    /// Submitted fields that landed on the row (empty for new rows)
    pub delta: Value,
    pub row_id: RowId,
    /// Row id of the top-level record when this entry came from a nested save
    pub parent_id: Option<RowId>,
    pub identifier: Option<String>,
    pub parent_changed: Option<bool>,
}

/// An activity entry as stored, with its log id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub activity_id: ActivityId,
    pub entry: ActivityEntry,
}

/// Append-only activity log.
///
/// Entries are returned by `list` in append order.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Persist one entry.
    async fn append(&self, entry: ActivityEntry) -> StorageResult<ActivityId>;

    /// Persist several entries in order.
    async fn append_batch(&self, entries: Vec<ActivityEntry>) -> StorageResult<Vec<ActivityId>> {
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(self.append(entry).await?);
        }
        Ok(ids)
    }

    /// Every stored entry, oldest first.
    async fn list(&self) -> StorageResult<Vec<ActivityRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_id_accepts_numbers_and_numeric_strings() {
        assert_eq!(value_as_row_id(&json!(7)), Some(7));
        assert_eq!(value_as_row_id(&json!(7.0)), Some(7));
        assert_eq!(value_as_row_id(&json!(" 12 ")), Some(12));
        assert_eq!(value_as_row_id(&json!(7.5)), None);
        assert_eq!(value_as_row_id(&json!(null)), None);
        assert_eq!(value_as_row_id(&json!("abc")), None);
    }

    #[test]
    fn activity_type_from_table_name() {
        assert_eq!(ActivityType::for_table("app_media"), ActivityType::Media);
        assert_eq!(ActivityType::for_table("settings"), ActivityType::Settings);
        assert_eq!(ActivityType::for_table("people"), ActivityType::Entry);
    }

    #[test]
    fn activity_entry_serializes_type_field() {
        let entry = ActivityEntry {
            kind: ActivityType::Entry,
            table_name: "people".to_string(),
            action: ActivityAction::Add,
            actor_id: Some(1),
            timestamp: Utc::now(),
            data: json!({"id": 1}),
            delta: json!({}),
            row_id: 1,
            parent_id: None,
            identifier: Some("Alice".to_string()),
            parent_changed: Some(true),
        };
        let text = serde_json::to_string(&entry).unwrap();
        assert!(text.contains("\"type\":\"ENTRY\""));
        assert!(text.contains("\"action\":\"ADD\""));
    }
}
