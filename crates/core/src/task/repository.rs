//! Task repository trait
//!
//! Defines the interface for task storage operations.

use async_trait::async_trait;

use super::model::{ListQuery, NewTask, Task, TaskId, TaskPage, TaskPatch, TaskStatus};
use crate::Result;

/// Repository interface for task CRUD operations
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a new task; the store assigns id and timestamps
    async fn create(&self, task: NewTask) -> Result<Task>;

    /// Get a task by ID, failing with `TaskNotFound` if missing
    async fn get(&self, id: TaskId) -> Result<Task>;

    /// Get one page of tasks, newest first
    async fn list(&self, query: &ListQuery) -> Result<TaskPage>;

    /// Apply a partial update, refreshing `updated_at`
    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task>;

    /// Delete a task by ID, failing with `TaskNotFound` if missing
    async fn delete(&self, id: TaskId) -> Result<()>;

    /// Set the status of a single task.
    ///
    /// Returns `false` when no such task exists. Writing the status a task
    /// already has still counts as an update.
    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<bool>;

    /// Check that the store can serve requests
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
