//! relgraph - relational record-graph CLI
//!
//! Saves nested JSON records against a schema file and reads them back
//! hydrated.
//!
//! ## Commands
//!
//! - `save`: cascade-save a record (or an array of records) from a JSON file
//! - `get`: print one hydrated entry
//! - `list`: print a page of entries with totals
//! - `activity`: print the activity log

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use relgraph_core::{
    fragment_from_value, ActivityMode, CascadeContext, Collaborators, Entries, EntriesQuery,
    EntryService, LogFormat, RowId, SchemaRegistry, StaticActor,
};
use relgraph_state::{ActivitySink, Direction, SurrealHandle};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "relgraph")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relational record-graph persistence", long_about = None)]
struct Cli {
    /// Schema file (JSON map of table name to column list)
    #[arg(short, long, global = true, env = "RELGRAPH_SCHEMA")]
    schema: Option<PathBuf>,

    /// User id recorded on activity entries
    #[arg(long, global = true)]
    actor: Option<RowId>,

    /// Use a throwaway in-memory database
    #[arg(long, global = true)]
    in_memory: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Save a record graph
    Save {
        table: String,

        /// JSON file holding one record or an array of records
        payload: PathBuf,

        /// standalone, nested or disabled
        #[arg(long, default_value = "standalone")]
        mode: ActivityMode,
    },

    /// Show one hydrated entry
    Get { table: String, id: RowId },

    /// List entries
    List {
        table: String,

        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value_t = 500)]
        per_page: usize,

        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Comma-separated active states (0 trash, 1 active, 2 inactive)
        #[arg(long, value_delimiter = ',')]
        active: Vec<i64>,

        #[arg(long, default_value = "id")]
        order_by: String,

        /// Ascending order (default is descending)
        #[arg(long)]
        asc: bool,
    },

    /// Show the activity log
    Activity {
        /// Only the most recent N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    relgraph_core::init_tracing(format, level);

    let handle = if cli.in_memory {
        SurrealHandle::in_memory().await
    } else {
        SurrealHandle::from_env().await
    }
    .context("Failed to connect to relgraph database")?;

    let schema_path = cli.schema.clone();
    let actor = cli.actor;
    let service = || -> Result<EntryService> {
        let schema = load_schema(schema_path.as_deref())?;
        Ok(build_service(&handle, schema, actor))
    };

    let output = match cli.command {
        Commands::Save {
            table,
            payload,
            mode,
        } => cmd_save(&service()?, &table, &payload, mode).await?,
        Commands::Get { table, id } => cmd_get(&service()?, &table, id).await?,
        Commands::List {
            table,
            search,
            per_page,
            page,
            active,
            order_by,
            asc,
        } => {
            let direction = if asc { Direction::Asc } else { Direction::Desc };
            let mut query = EntriesQuery::default()
                .with_page(page, per_page)
                .ordered_by(order_by, direction);
            if let Some(search) = search {
                query = query.with_search(search);
            }
            if !active.is_empty() {
                query = query.with_active(active);
            }
            cmd_list(&service()?, &table, &query).await?
        }
        Commands::Activity { limit } => cmd_activity(&handle.activity_log(), limit).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_schema(path: Option<&Path>) -> Result<SchemaRegistry> {
    let Some(path) = path else {
        bail!("--schema <FILE> (or RELGRAPH_SCHEMA) is required for this command");
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))?;
    let registry = SchemaRegistry::from_json(&text)
        .with_context(|| format!("Invalid schema file {}", path.display()))?;
    info!(tables = ?registry.table_names(), "schema loaded");
    Ok(registry)
}

fn build_service(
    handle: &SurrealHandle,
    schema: SchemaRegistry,
    actor: Option<RowId>,
) -> EntryService {
    let collab = Collaborators::new(
        Arc::new(handle.row_store()),
        Arc::new(schema),
        Arc::new(handle.activity_log()),
    )
    .with_actor(Arc::new(StaticActor(actor)));
    EntryService::new(collab)
}

/// Save one record or an array of records
async fn cmd_save(
    service: &EntryService,
    table: &str,
    payload: &Path,
    mode: ActivityMode,
) -> Result<Value> {
    let text = std::fs::read_to_string(payload)
        .with_context(|| format!("Failed to read payload {}", payload.display()))?;
    let value: Value = serde_json::from_str(&text).context("Payload is not valid JSON")?;

    if let Value::Array(items) = value {
        if mode == ActivityMode::NestedChild {
            bail!("--mode nested needs a single record; arrays are saved standalone or disabled");
        }
        let fragments = items
            .into_iter()
            .map(|item| fragment_from_value(table, item))
            .collect::<relgraph_core::Result<Vec<_>>>()?;
        let saved = match mode {
            ActivityMode::Disabled => {
                let mut saved = Vec::with_capacity(fragments.len());
                for fragment in fragments {
                    saved.push(
                        service
                            .writer()
                            .save_record_graph(table, fragment, mode)
                            .await
                            .with_context(|| format!("Failed to save collection into '{}'", table))?,
                    );
                }
                saved
            }
            _ => service
                .update_collection(table, fragments)
                .await
                .with_context(|| format!("Failed to save collection into '{}'", table))?,
        };
        info!(table, count = saved.len(), mode = ?mode, "collection saved");
        return Ok(Value::Array(saved.into_iter().map(|row| row.into_value()).collect()));
    }

    let fragment = fragment_from_value(table, value)?;
    if mode == ActivityMode::NestedChild {
        let mut ctx = CascadeContext::new();
        let saved = service
            .writer()
            .save_with_context(table, fragment, mode, &mut ctx)
            .await
            .with_context(|| format!("Failed to save record into '{}'", table))?;
        return Ok(json!({
            "row": saved.into_value(),
            "pending_activity": serde_json::to_value(&ctx.nested_entries)?,
            "relationships_changed": ctx.relationships_changed,
        }));
    }

    let saved = service
        .writer()
        .save_record_graph(table, fragment, mode)
        .await
        .with_context(|| format!("Failed to save record into '{}'", table))?;
    Ok(saved.into_value())
}

/// Show one hydrated entry
async fn cmd_get(service: &EntryService, table: &str, id: RowId) -> Result<Value> {
    match service.find_entry(table, id).await? {
        Some(row) => Ok(Value::Object(row)),
        None => bail!("{}#{} not found", table, id),
    }
}

/// List a page of entries
async fn cmd_list(service: &EntryService, table: &str, query: &EntriesQuery) -> Result<Value> {
    match service.get_entries(table, query).await? {
        Entries::Listing(set) => Ok(serde_json::to_value(set)?),
        Entries::Single(row) => Ok(row.map(Value::Object).unwrap_or(Value::Null)),
    }
}

/// Show the activity log, oldest first
async fn cmd_activity(sink: &dyn ActivitySink, limit: Option<usize>) -> Result<Value> {
    let mut records = sink.list().await.context("Failed to read activity log")?;
    if let Some(limit) = limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }
    Ok(serde_json::to_value(records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgraph_core::{ColumnDescriptor, TableSchema};
    use relgraph_state::fakes::{MemoryActivityLog, MemoryRowStore};

    fn memory_service() -> (EntryService, Arc<MemoryActivityLog>) {
        let registry = SchemaRegistry::new()
            .with_table(TableSchema::new(
                "people",
                vec![
                    ColumnDescriptor::new("id", "INT"),
                    ColumnDescriptor::new("name", "VARCHAR").as_master(),
                    ColumnDescriptor::one_to_many("pets", "pets", "owner"),
                ],
            ))
            .with_table(TableSchema::new(
                "pets",
                vec![
                    ColumnDescriptor::new("id", "INT"),
                    ColumnDescriptor::new("name", "VARCHAR"),
                    ColumnDescriptor::many_to_one("owner", "people"),
                ],
            ));
        let log = Arc::new(MemoryActivityLog::new());
        let collab = Collaborators::new(Arc::new(MemoryRowStore::new()), Arc::new(registry), log.clone())
            .with_actor(Arc::new(StaticActor(Some(9))));
        (EntryService::new(collab), log)
    }

    #[test]
    fn test_cli_parses_save_with_mode() {
        let cli = Cli::try_parse_from([
            "relgraph", "--schema", "schema.json", "--actor", "3", "save", "people", "p.json",
            "--mode", "disabled",
        ])
        .unwrap();
        assert_eq!(cli.actor, Some(3));
        match cli.command {
            Commands::Save { table, mode, .. } => {
                assert_eq!(table, "people");
                assert_eq!(mode, ActivityMode::Disabled);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_list_active_states() {
        let cli = Cli::try_parse_from(["relgraph", "list", "people", "--active", "1,2", "--asc"]).unwrap();
        match cli.command {
            Commands::List { active, asc, per_page, .. } => {
                assert_eq!(active, vec![1, 2]);
                assert!(asc);
                assert_eq!(per_page, 500);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["relgraph", "save", "people", "p.json", "--mode", "bogus"]).is_err());
    }

    #[test]
    fn test_schema_is_required_for_data_commands() {
        let err = load_schema(None).unwrap_err();
        assert!(err.to_string().contains("--schema"));
    }

    #[tokio::test]
    async fn test_save_then_get_round_trip() {
        let (service, log) = memory_service();
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("person.json");
        std::fs::write(&payload, r#"{"name": "Ann", "pets": [{"name": "Rex"}, {"name": "Tom"}]}"#).unwrap();

        let saved = cmd_save(&service, "people", &payload, ActivityMode::Standalone)
            .await
            .unwrap();
        let id = saved["id"].as_i64().unwrap();

        let fetched = cmd_get(&service, "people", id).await.unwrap();
        assert_eq!(fetched["name"], json!("Ann"));
        let pets = fetched["pets"]["rows"].as_array().unwrap();
        assert_eq!(pets.len(), 2);
        assert_eq!(pets[0]["name"], json!("Rex"));

        let activity = cmd_activity(log.as_ref(), Some(2)).await.unwrap();
        assert_eq!(activity.as_array().unwrap().len(), 2);
        assert_eq!(log.entries()[0].actor_id, Some(9));
    }

    #[tokio::test]
    async fn test_get_missing_entry_fails() {
        let (service, _) = memory_service();
        let err = cmd_get(&service, "people", 42).await.unwrap_err();
        assert!(err.to_string().contains("people#42 not found"));
    }

    #[tokio::test]
    async fn test_save_array_honours_mode() {
        let (service, log) = memory_service();
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("people.json");
        std::fs::write(&payload, r#"[{"name": "Ann"}, {"name": "Bob"}]"#).unwrap();

        let err = cmd_save(&service, "people", &payload, ActivityMode::NestedChild)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--mode nested"));
        assert_eq!(service.count_total("people").await.unwrap(), 0);

        let saved = cmd_save(&service, "people", &payload, ActivityMode::Disabled)
            .await
            .unwrap();
        assert_eq!(saved.as_array().unwrap().len(), 2);
        assert_eq!(service.count_total("people").await.unwrap(), 2);
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_save_array_and_list() {
        let (service, _) = memory_service();
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("people.json");
        std::fs::write(&payload, r#"[{"name": "Ann"}, {"name": "Bob"}, {"name": "Cat"}]"#).unwrap();

        let saved = cmd_save(&service, "people", &payload, ActivityMode::Standalone)
            .await
            .unwrap();
        assert_eq!(saved.as_array().unwrap().len(), 3);

        let query = EntriesQuery::default().with_search("b");
        let listing = cmd_list(&service, "people", &query).await.unwrap();
        assert_eq!(listing["total"], json!(3));
        assert_eq!(listing["rows"].as_array().unwrap().len(), 1);
        assert_eq!(listing["rows"][0]["name"], json!("Bob"));
    }
}
