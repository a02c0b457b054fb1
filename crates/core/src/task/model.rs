//! Task model definitions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Store-assigned task identifier
pub type TaskId = i64;

/// Longest accepted title, in characters
pub const MAX_TITLE_LEN: usize = 200;

/// Largest page a list request may ask for
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the client does not ask for one
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(Error::validation(
                "status",
                format!("unknown status '{}', expected pending, in_progress or completed", other),
            )),
        }
    }
}

/// Task priority, always within 1..=5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(Error::validation(
                "priority",
                format!(
                    "must be between {} and {}, got {}",
                    Self::MIN,
                    Self::MAX,
                    value
                ),
            ))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(3)
    }
}

/// A persisted task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validate and normalize a task title
pub fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::validation("title", "cannot be empty"));
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(Error::validation(
            "title",
            format!("must be at most {} characters, got {}", MAX_TITLE_LEN, len),
        ));
    }
    Ok(title.to_string())
}

/// Fields for a task that has not been stored yet
///
/// New tasks always start out `pending`; the store assigns the id and
/// both timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    title: String,
    description: Option<String>,
    priority: Priority,
}

impl NewTask {
    /// Create a new task with the given title
    pub fn new(title: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            title: validate_title(title.as_ref())?,
            description: None,
            priority: Priority::default(),
        })
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Materialize the task with a store-assigned id
    pub fn into_task(self, id: TaskId, now: DateTime<Utc>) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            status: TaskStatus::Pending,
            priority: self.priority,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

impl TaskPatch {
    /// Build a patch from raw request fields, validating each present one
    pub fn new(
        title: Option<String>,
        description: Option<String>,
        status: Option<TaskStatus>,
        priority: Option<i64>,
    ) -> Result<Self> {
        Ok(Self {
            title: title.as_deref().map(validate_title).transpose()?,
            description,
            status,
            priority: priority.map(Priority::new).transpose()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
    }

    /// Apply the patch in place and refresh `updated_at`
    pub fn apply(self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = Some(description);
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        task.updated_at = now.max(task.created_at);
    }
}

/// Pagination and filtering for task listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub offset: u64,
    pub limit: u32,
    pub status: Option<TaskStatus>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
            status: None,
        }
    }
}

impl ListQuery {
    /// Validate raw pagination parameters; `limit` is capped at [`MAX_PAGE_SIZE`]
    pub fn new(skip: Option<i64>, limit: Option<i64>, status: Option<TaskStatus>) -> Result<Self> {
        let offset = match skip {
            Some(skip) if skip < 0 => {
                return Err(Error::validation("skip", "must not be negative"));
            }
            Some(skip) => skip as u64,
            None => 0,
        };
        let limit = match limit {
            Some(limit) if limit < 0 => {
                return Err(Error::validation("limit", "must not be negative"));
            }
            Some(limit) => limit.min(MAX_PAGE_SIZE as i64) as u32,
            None => DEFAULT_PAGE_SIZE,
        };
        Ok(Self {
            offset,
            limit,
            status,
        })
    }
}

/// One page of tasks plus the total number of matches
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPage {
    pub items: Vec<Task>,
    pub total: u64,
}
