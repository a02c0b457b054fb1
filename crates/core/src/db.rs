//! Database connection pool
//!
//! The pool is opened once at startup, handed to the stores that need it and
//! closed explicitly at shutdown.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};
use tracing::{debug, info};

use crate::Result;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL CHECK (length(title) BETWEEN 1 AND 200),
        description TEXT,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'in_progress', 'completed')),
        priority INTEGER NOT NULL DEFAULT 3 CHECK (priority BETWEEN 1 AND 5),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS tasks_status_idx ON tasks(status)",
    "CREATE INDEX IF NOT EXISTS tasks_created_idx ON tasks(created_at)",
];

/// Connection settings for the task database
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://tasks.db`
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout: Duration,
    /// Log every SQL statement at debug level
    pub log_statements: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://tasks.db".to_string(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            log_statements: false,
        }
    }
}

/// Owned handle to the connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the pool and make sure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout);
        if !config.log_statements {
            options = options.disable_statement_logging();
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        let database = Self { pool };
        database.init_schema().await?;
        info!(
            url = %config.url,
            max_connections = config.max_connections,
            "Database pool opened"
        );
        Ok(database)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Database schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection; later queries fail with `PoolClosed`
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) async fn open_test_database() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", temp_dir.path().join("tasks.db").display()),
            ..DatabaseConfig::default()
        };
        let database = Database::connect(&config).await.unwrap();
        (database, temp_dir)
    }

    #[tokio::test]
    async fn test_connect_creates_schema() {
        let (database, _temp) = open_test_database().await;

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tasks'",
        )
        .fetch_one(database.pool())
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_schema_bootstrap_is_repeatable() {
        let (database, temp) = open_test_database().await;
        database.close().await;

        let config = DatabaseConfig {
            url: format!("sqlite://{}", temp.path().join("tasks.db").display()),
            ..DatabaseConfig::default()
        };
        let reopened = Database::connect(&config).await.unwrap();
        assert!(!reopened.is_closed());
    }

    #[tokio::test]
    async fn test_close_rejects_queries() {
        let (database, _temp) = open_test_database().await;
        database.close().await;

        assert!(database.is_closed());
        let result = sqlx::query("SELECT 1").execute(database.pool()).await;
        assert!(matches!(result, Err(sqlx::Error::PoolClosed)));
    }
}
