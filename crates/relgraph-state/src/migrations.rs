//! SurrealDB schema initialization
//!
//! User tables are schemaless documents created on first insert; only the
//! activity log gets an explicit definition with indexes.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Table holding activity entries.
pub const ACTIVITY_TABLE: &str = "relgraph_activity";

/// Initialize the relgraph support tables.
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing relgraph SurrealDB schema");
    init_activity_table(db).await?;
    info!("relgraph schema initialization complete");
    Ok(())
}

/// Initialize the activity table
///
/// Schema:
/// ```text
/// TABLE relgraph_activity {
///   activity_id:  INT (unique, append order)
///   table_name:   STRING (indexed with row_id)
///   row_id:       INT
///   entry:        STRING (JSON-encoded ActivityEntry)
/// }
/// ```
///
/// Entries are never updated or deleted by the engine.
async fn init_activity_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing activity table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS relgraph_activity AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_activity_id ON TABLE relgraph_activity COLUMNS activity_id UNIQUE;

        DEFINE INDEX IF NOT EXISTS idx_activity_row ON TABLE relgraph_activity COLUMNS table_name, row_id;
    "#;

    db.query(sql).await?.check()?;
    debug!("activity table initialized");
    Ok(())
}
