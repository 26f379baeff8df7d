//! SurrealDB Handle - Connection management
//!
//! Resolves where rows live (remote endpoint, explicit URL, local SurrealKV
//! directory or in-memory) and hands out the backend stores bound to the
//! same connection.

use std::path::Path;

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::surreal_store::{SurrealActivityLog, SurrealRowStore};
use crate::Result;

const DEFAULT_NAMESPACE: &str = "relgraph";
const DEFAULT_DATABASE: &str = "main";
const DEFAULT_LOCAL_PATH: &str = ".relgraph/db";

/// Configuration for an authenticated remote connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint URL (e.g., "wss://db.example.com")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Namespace (default: "relgraph")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Sign in as root (true) or as a database user (false)
    pub is_root: bool,
}

impl ConnectionConfig {
    /// Configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - RELGRAPH_DB_ENDPOINT (required)
    /// - RELGRAPH_DB_USERNAME (required)
    /// - RELGRAPH_DB_PASSWORD (required)
    /// - RELGRAPH_DB_NAMESPACE (optional, default: "relgraph")
    /// - RELGRAPH_DB_DATABASE (optional, default: "main")
    /// - RELGRAPH_DB_ROOT (optional, "true" for root users)
    pub fn from_env() -> std::result::Result<Self, String> {
        let var = |name: &str| std::env::var(name).map_err(|_| format!("{name} not set"));
        let endpoint = var("RELGRAPH_DB_ENDPOINT")?;
        let username = var("RELGRAPH_DB_USERNAME")?;
        let password = var("RELGRAPH_DB_PASSWORD")?;
        let namespace =
            std::env::var("RELGRAPH_DB_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.into());
        let database =
            std::env::var("RELGRAPH_DB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.into());
        let is_root = std::env::var("RELGRAPH_DB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// SurrealDB connection handle
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Connect to an in-memory database (tests, throwaway sessions).
    #[instrument(skip_all)]
    pub async fn in_memory() -> Result<Self> {
        Self::connect_url("mem://").await
    }

    /// Open (or create) a SurrealKV database in `dir`.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub async fn local(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Self::connect_url(&format!("surrealkv://{}", dir.display())).await
    }

    /// Connect to any URL understood by `surrealdb::engine::any`, without
    /// authentication.
    pub async fn connect_url(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!(url = %url, "SurrealDB connected");
        Ok(Self { db })
    }

    /// Connect and authenticate against a remote endpoint.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Database authentication failed: {e}")))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {e}"))
            })?;

        migrations::init_schema(&db).await?;
        info!(root = config.is_root, "SurrealDB connected");
        Ok(Self { db })
    }

    /// Connect using environment variables
    ///
    /// If RELGRAPH_DB_ENDPOINT (and credentials) are set, authenticates
    /// against that endpoint. If RELGRAPH_DB_URL is set, connects to it.
    /// Otherwise persists locally under `.relgraph/db`.
    #[instrument(skip_all)]
    pub async fn from_env() -> Result<Self> {
        if let Ok(config) = ConnectionConfig::from_env() {
            return Self::connect(config).await;
        }
        if let Ok(url) = std::env::var("RELGRAPH_DB_URL") {
            return Self::connect_url(&url).await;
        }
        info!(
            path = DEFAULT_LOCAL_PATH,
            "No endpoint or RELGRAPH_DB_URL found, using local persistence"
        );
        Self::local(Path::new(DEFAULT_LOCAL_PATH)).await
    }

    /// Row store bound to this connection.
    pub fn row_store(&self) -> SurrealRowStore {
        SurrealRowStore::new(self.db.clone())
    }

    /// Activity log bound to this connection.
    pub fn activity_log(&self) -> SurrealActivityLog {
        SurrealActivityLog::new(self.db.clone())
    }
}
