//! Per-unit processing step
//!
//! Each unit of a batch runs its step before the task is marked completed.

use std::time::Duration;

use async_trait::async_trait;

use crate::task::TaskId;
use crate::Result;

/// Latency of the built-in processing step
pub const PROCESSING_DELAY: Duration = Duration::from_secs(2);

/// Work performed for one task before it is marked completed
#[async_trait]
pub trait UnitWork: Send + Sync {
    async fn run(&self, task_id: TaskId) -> Result<()>;
}

/// Stands in for real work with a fixed, non-blocking delay
#[derive(Debug, Clone, Copy)]
pub struct SimulatedWork {
    delay: Duration,
}

impl SimulatedWork {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self::new(PROCESSING_DELAY)
    }
}

#[async_trait]
impl UnitWork for SimulatedWork {
    async fn run(&self, _task_id: TaskId) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
