//! In-memory task storage implementation
//!
//! Keeps tasks in a map guarded by an async lock. Nothing survives the
//! process; used by tests and by `DATABASE_URL=memory`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use super::model::{ListQuery, NewTask, Task, TaskId, TaskPage, TaskPatch, TaskStatus};
use super::repository::TaskRepository;
use crate::{Error, Result};

/// In-memory task store
pub struct InMemoryTaskStore {
    /// Last id handed out; ids start at 1 and are never reused
    last_id: AtomicI64,
    tasks: RwLock<BTreeMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            last_id: AtomicI64::new(0),
            tasks: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskStore {
    async fn create(&self, task: NewTask) -> Result<Task> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let task = task.into_task(id, Utc::now());
        let mut tasks = self.tasks.write().await;
        tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        let tasks = self.tasks.read().await;
        tasks.get(&id).cloned().ok_or(Error::TaskNotFound(id))
    }

    async fn list(&self, query: &ListQuery) -> Result<TaskPage> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<&Task> = tasks
            .values()
            .filter(|t| query.status.map_or(true, |status| t.status == status))
            .collect();
        // Newest first, ties broken by id
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(TaskPage { items, total })
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;
        patch.apply(task, Utc::now());
        Ok(task.clone())
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        tasks
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::TaskNotFound(id))
    }

    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&id) {
            Some(task) => {
                task.status = status;
                task.updated_at = Utc::now().max(task.created_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
