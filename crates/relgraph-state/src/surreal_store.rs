//! SurrealDB-backed RowStore and ActivitySink implementations
//!
//! Every logical table maps to a SurrealDB table of `{row_id, data}`
//! documents where `data` is the JSON-encoded row. Ids are allocated as
//! `max(row_id) + 1`; query evaluation happens in [`crate::query`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::debug;

use crate::error::StorageError;
use crate::migrations::ACTIVITY_TABLE;
use crate::query;
use crate::storage_traits::{
    ActivityEntry, ActivityId, ActivityRecord, ActivitySink, Filter, Row, RowId, RowQuery,
    RowStore, StorageResult, PRIMARY_KEY,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbRow {
    row_id: i64,
    data: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DbRowId {
    row_id: i64,
}

impl DbRow {
    fn encode(table: &str, row_id: RowId, row: &Row) -> StorageResult<Self> {
        let data = serde_json::to_string(row).map_err(|e| StorageError::Codec {
            table: table.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { row_id, data })
    }

    fn decode(self, table: &str) -> StorageResult<Row> {
        let mut row: Row = serde_json::from_str(&self.data).map_err(|e| StorageError::Codec {
            table: table.to_string(),
            reason: e.to_string(),
        })?;
        row.insert(PRIMARY_KEY.to_string(), Value::from(self.row_id));
        Ok(row)
    }
}

/// SurrealDB-backed implementation of [`RowStore`].
#[derive(Clone)]
pub struct SurrealRowStore {
    db: Surreal<Any>,
}

impl SurrealRowStore {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    // -- private helpers -----------------------------------------------------

    async fn load_table(&self, table: &str) -> StorageResult<Vec<Row>> {
        let mut res = self
            .db
            .query("SELECT row_id, data FROM type::table($tb) ORDER BY row_id ASC")
            .bind(("tb", table.to_string()))
            .await?;
        let rows: Vec<DbRow> = res.take(0)?;
        rows.into_iter().map(|r| r.decode(table)).collect()
    }

    async fn fetch(&self, table: &str, id: RowId) -> StorageResult<Option<Row>> {
        let mut res = self
            .db
            .query("SELECT row_id, data FROM type::table($tb) WHERE row_id = $id")
            .bind(("tb", table.to_string()))
            .bind(("id", id))
            .await?;
        let rows: Vec<DbRow> = res.take(0)?;
        rows.into_iter().next().map(|r| r.decode(table)).transpose()
    }

    async fn next_id(&self, table: &str) -> StorageResult<RowId> {
        let mut res = self
            .db
            .query("SELECT row_id FROM type::table($tb) ORDER BY row_id DESC LIMIT 1")
            .bind(("tb", table.to_string()))
            .await?;
        let rows: Vec<DbRowId> = res.take(0)?;
        Ok(rows.first().map(|r| r.row_id).unwrap_or(0) + 1)
    }
}

#[async_trait]
impl RowStore for SurrealRowStore {
    async fn insert(&self, table: &str, mut fields: Row) -> StorageResult<RowId> {
        let id = self.next_id(table).await?;
        fields.remove(PRIMARY_KEY);
        let doc = DbRow::encode(table, id, &fields)?;

        self.db
            .query("CREATE type::table($tb) CONTENT $doc")
            .bind(("tb", table.to_string()))
            .bind(("doc", doc))
            .await?
            .check()?;

        debug!(table, id, "row inserted");
        Ok(id)
    }

    async fn update(&self, table: &str, id: RowId, fields: Row) -> StorageResult<()> {
        let mut row = self
            .fetch(table, id)
            .await?
            .ok_or_else(|| StorageError::RowNotFound {
                table: table.to_string(),
                id,
            })?;
        for (column, value) in fields {
            if column != PRIMARY_KEY {
                row.insert(column, value);
            }
        }
        row.remove(PRIMARY_KEY);
        let doc = DbRow::encode(table, id, &row)?;

        self.db
            .query("UPDATE type::table($tb) SET data = $data WHERE row_id = $id")
            .bind(("tb", table.to_string()))
            .bind(("data", doc.data))
            .bind(("id", id))
            .await?
            .check()?;

        debug!(table, id, "row updated");
        Ok(())
    }

    async fn find_by_id(&self, table: &str, id: RowId) -> StorageResult<Option<Row>> {
        self.fetch(table, id).await
    }

    async fn delete_where(&self, table: &str, filters: &[Filter]) -> StorageResult<u64> {
        let ids: Vec<i64> = self
            .load_table(table)
            .await?
            .iter()
            .filter(|row| query::row_matches(table, row, filters))
            .filter_map(|row| row.get(PRIMARY_KEY).and_then(Value::as_i64))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = ids.len() as u64;

        self.db
            .query("DELETE type::table($tb) WHERE row_id IN $ids")
            .bind(("tb", table.to_string()))
            .bind(("ids", ids))
            .await?
            .check()?;

        debug!(table, removed, "rows deleted");
        Ok(removed)
    }

    async fn select(&self, q: &RowQuery) -> StorageResult<Vec<Row>> {
        let base = self.load_table(&q.table).await?;
        let joined = match &q.join {
            Some(join) => Some(self.load_table(&join.table).await?),
            None => None,
        };
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

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbActivity {
    activity_id: i64,
    table_name: String,
    row_id: i64,
    entry: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DbActivityId {
    activity_id: i64,
}

/// SurrealDB-backed implementation of [`ActivitySink`].
#[derive(Clone)]
pub struct SurrealActivityLog {
    db: Surreal<Any>,
}

impl SurrealActivityLog {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    async fn next_id(&self) -> StorageResult<ActivityId> {
        let mut res = self
            .db
            .query("SELECT activity_id FROM type::table($tb) ORDER BY activity_id DESC LIMIT 1")
            .bind(("tb", ACTIVITY_TABLE))
            .await?;
        let rows: Vec<DbActivityId> = res.take(0)?;
        Ok(rows.first().map(|r| r.activity_id).unwrap_or(0) + 1)
    }
}

#[async_trait]
impl ActivitySink for SurrealActivityLog {
    async fn append(&self, entry: ActivityEntry) -> StorageResult<ActivityId> {
        let activity_id = self.next_id().await?;
        let doc = DbActivity {
            activity_id,
            table_name: entry.table_name.clone(),
            row_id: entry.row_id,
            entry: serde_json::to_string(&entry).map_err(|e| StorageError::Codec {
                table: ACTIVITY_TABLE.to_string(),
                reason: e.to_string(),
            })?,
        };

        self.db
            .query("CREATE type::table($tb) CONTENT $doc")
            .bind(("tb", ACTIVITY_TABLE))
            .bind(("doc", doc))
            .await?
            .check()?;

        debug!(activity_id, "activity appended");
        Ok(activity_id)
    }

    async fn list(&self) -> StorageResult<Vec<ActivityRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT activity_id, table_name, row_id, entry FROM type::table($tb) \
                 ORDER BY activity_id ASC",
            )
            .bind(("tb", ACTIVITY_TABLE))
            .await?;
        let rows: Vec<DbActivity> = res.take(0)?;

        rows.into_iter()
            .map(|row| {
                let entry = serde_json::from_str(&row.entry).map_err(|e| StorageError::Codec {
                    table: ACTIVITY_TABLE.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(ActivityRecord {
                    activity_id: row.activity_id,
                    entry,
                })
            })
            .collect()
    }
}
