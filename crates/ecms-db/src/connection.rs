//! SurrealDB connection management.

use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::info;

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Endpoint URL, e.g. `ws://127.0.0.1:8000`, or `mem://` for an
    /// embedded in-memory store.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Root credentials. Ignored for embedded endpoints.
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000".into(),
            namespace: "ecms".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl DbConfig {
    pub fn is_embedded(&self) -> bool {
        self.endpoint.starts_with("mem://")
    }
}

/// Manages a connection to SurrealDB.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
}

impl DbManager {
    /// Connects, authenticates as root for remote endpoints, and selects
    /// the configured namespace and database.
    pub async fn connect(config: &DbConfig) -> Result<Self, surrealdb::Error> {
        info!(
            endpoint = %config.endpoint,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = any::connect(config.endpoint.as_str()).await?;

        if !config.is_embedded() {
            db.signin(Root {
                username: config.username.clone(),
                password: config.password.clone(),
            })
            .await?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        info!("Successfully connected to SurrealDB");

        Ok(Self { db })
    }

    /// Returns a reference to the underlying SurrealDB client.
    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }
}
