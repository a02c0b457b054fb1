//! Application state

use std::sync::Arc;

use taskhub_core::batch::BatchCoordinator;
use taskhub_core::db::Database;
use taskhub_core::task::{InMemoryTaskStore, SqliteTaskStore, TaskRepository};

use crate::config::{AppConfig, StoreBackend};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    task_store: Arc<dyn TaskRepository>,
    batch: BatchCoordinator,
    /// Present when tasks live in SQLite; closed on shutdown
    database: Option<Database>,
}

impl AppState {
    /// Open the configured store and build the batch coordinator on top of it
    pub async fn new(config: &AppConfig) -> taskhub_core::Result<Self> {
        let (task_store, database) = match &config.store {
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory task store; tasks are lost on exit");
                let store: Arc<dyn TaskRepository> = Arc::new(InMemoryTaskStore::new());
                (store, None)
            }
            StoreBackend::Sqlite(db_config) => {
                let database = Database::connect(db_config).await?;
                let store: Arc<dyn TaskRepository> =
                    Arc::new(SqliteTaskStore::new(database.pool().clone()));
                (store, Some(database))
            }
        };

        let batch = BatchCoordinator::new(Arc::clone(&task_store), config.batch);
        Ok(Self::from_parts(task_store, batch, database))
    }

    /// Create an AppState around an existing store and coordinator
    #[cfg(test)]
    pub fn with_store(task_store: Arc<dyn TaskRepository>, batch: BatchCoordinator) -> Self {
        Self::from_parts(task_store, batch, None)
    }

    fn from_parts(
        task_store: Arc<dyn TaskRepository>,
        batch: BatchCoordinator,
        database: Option<Database>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                task_store,
                batch,
                database,
            }),
        }
    }

    /// Get reference to the task store
    pub fn task_store(&self) -> &dyn TaskRepository {
        self.inner.task_store.as_ref()
    }

    pub fn batch(&self) -> &BatchCoordinator {
        &self.inner.batch
    }

    /// Name of the storage backend, for diagnostics
    pub fn storage_backend(&self) -> &'static str {
        if self.inner.database.is_some() {
            "sqlite"
        } else {
            "memory"
        }
    }

    /// Release the connection pool
    pub async fn shutdown(&self) {
        if let Some(database) = &self.inner.database {
            database.close().await;
        }
    }
}
