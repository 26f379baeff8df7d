//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRowStore` and `MemoryActivityLog` that satisfy the trait
//! contracts without any external dependencies.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::query;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryRowStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TableState {
    rows: BTreeMap<RowId, Row>,
    last_id: RowId,
}

/// In-memory row store backed by a `HashMap<table, BTreeMap<id, row>>`.
///
/// Counts every successful insert, update and delete so tests can assert
/// that a save performed no writes.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: Mutex<HashMap<String, TableState>>,
    writes: AtomicU64,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of row writes performed so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of rows currently stored in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().unwrap();
        tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Snapshot of every row in `table`, ordered by id.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn snapshot(&self, table: &str) -> Vec<Row> {
        self.rows(table)
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn insert(&self, table: &str, mut fields: Row) -> StorageResult<RowId> {
        let mut tables = self.tables.lock().unwrap();
        let state = tables.entry(table.to_string()).or_default();
        state.last_id += 1;
        let id = state.last_id;
        fields.insert(PRIMARY_KEY.to_string(), Value::from(id));
        state.rows.insert(id, fields);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update(&self, table: &str, id: RowId, fields: Row) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .get_mut(table)
            .and_then(|t| t.rows.get_mut(&id))
            .ok_or_else(|| StorageError::RowNotFound {
                table: table.to_string(),
                id,
            })?;
        for (column, value) in fields {
            if column != PRIMARY_KEY {
                row.insert(column, value);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_id(&self, table: &str, id: RowId) -> StorageResult<Option<Row>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(table).and_then(|t| t.rows.get(&id)).cloned())
    }

    async fn delete_where(&self, table: &str, filters: &[Filter]) -> StorageResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let Some(state) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = state.rows.len();
        state
            .rows
            .retain(|_, row| !query::row_matches(table, row, filters));
        let removed = (before - state.rows.len()) as u64;
        if removed > 0 {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    async fn select(&self, q: &RowQuery) -> StorageResult<Vec<Row>> {
        let base = self.snapshot(&q.table);
        let joined = q.join.as_ref().map(|j| self.snapshot(&j.table));
        query::evaluate(q, &base, joined.as_deref())
    }

    async fn count(&self, q: &RowQuery) -> StorageResult<u64> {
        let unpaged = RowQuery {
            limit: None,
            offset: 0,
            ..q.clone()
        };
        Ok(self.select(&unpaged).await?.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// MemoryActivityLog
// ---------------------------------------------------------------------------

/// In-memory activity log backed by a `Vec<ActivityRecord>`.
#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    records: Mutex<Vec<ActivityRecord>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries only, in append order.
    pub fn entries(&self) -> Vec<ActivityEntry> {
        let records = self.records.lock().unwrap();
        records.iter().map(|r| r.entry.clone()).collect()
    }
}

#[async_trait]
impl ActivitySink for MemoryActivityLog {
    async fn append(&self, entry: ActivityEntry) -> StorageResult<ActivityId> {
        let mut records = self.records.lock().unwrap();
        let activity_id = records.len() as ActivityId + 1;
        records.push(ActivityRecord { activity_id, entry });
        Ok(activity_id)
    }

    async fn list(&self) -> StorageResult<Vec<ActivityRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.clone())
    }
}
