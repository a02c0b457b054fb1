//! SQLite task storage implementation
//!
//! Every operation is a single statement against the pool, so per-row
//! updates are atomic and concurrent writers see last-write-wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::model::{
    ListQuery, NewTask, Priority, Task, TaskId, TaskPage, TaskPatch, TaskStatus,
};
use super::repository::TaskRepository;
use crate::{Error, Result};

const TASK_COLUMNS: &str = "id, title, description, status, priority, created_at, updated_at";

/// Task store backed by a SQLite connection pool
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> Result<Task> {
        let status: String = row.try_get("status")?;
        let priority: i64 = row.try_get("priority")?;
        let status = status
            .parse::<TaskStatus>()
            .map_err(|e| Error::Storage(format!("Corrupt task row: {}", e)))?;
        let priority = Priority::new(priority)
            .map_err(|e| Error::Storage(format!("Corrupt task row: {}", e)))?;

        Ok(Task {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            status,
            priority,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskStore {
    async fn create(&self, task: NewTask) -> Result<Task> {
        let now = Utc::now();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO tasks (title, description, status, priority, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(task.title())
        .bind(task.description())
        .bind(TaskStatus::Pending.as_str())
        .bind(task.priority().get() as i64)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(task.into_task(id, now))
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_task(&row),
            None => Err(Error::TaskNotFound(id)),
        }
    }

    async fn list(&self, query: &ListQuery) -> Result<TaskPage> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tasks");
        if let Some(status) = query.status {
            count.push(" WHERE status = ").push_bind(status.as_str());
        }
        let (total,) = count
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM tasks", TASK_COLUMNS));
        if let Some(status) = query.status {
            select.push(" WHERE status = ").push_bind(status.as_str());
        }
        select.push(" ORDER BY created_at DESC, id DESC");
        select.push(" LIMIT ").push_bind(query.limit as i64);
        select
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));

        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<Result<Vec<_>>>()?;

        Ok(TaskPage {
            items,
            total: total as u64,
        })
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET title = COALESCE(?, title),
                description = COALESCE(?, description),
                status = COALESCE(?, status),
                priority = COALESCE(?, priority),
                updated_at = MAX(?, created_at)
            WHERE id = ?
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.priority.map(|p| p.get() as i64))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_task(&row),
            None => Err(Error::TaskNotFound(id)),
        }
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::TaskNotFound(id));
        }
        Ok(())
    }

    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<bool> {
        // Timestamps are RFC 3339 text, which sorts chronologically
        let result = sqlx::query(
            "UPDATE tasks SET status = ?, updated_at = MAX(?, created_at) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
