//! Batch coordinator
//!
//! Fans a set of task ids out to one tokio task each, waits for all of them
//! and folds the outcomes into a [`BatchReport`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};

use super::work::{SimulatedWork, UnitWork};
use crate::task::{TaskId, TaskRepository, TaskStatus};
use crate::{Error, Result};

/// Limits applied to every batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Largest number of distinct ids accepted in one batch
    pub max_batch_size: usize,
    /// Units allowed to run at once, shared by all batches of a coordinator
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_concurrency: 100,
        }
    }
}

/// Why a single unit did not complete its task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum UnitFailure {
    /// No task with that id exists
    NotFound,
    /// The status write failed
    Store(String),
    /// The processing step returned an error
    Work(String),
    /// The unit panicked or could not run
    Crashed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub task_id: TaskId,
    pub reason: UnitFailure,
}

/// Aggregate outcome of one batch, computed after every unit finished
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Ids submitted, duplicates included
    pub requested: usize,
    /// Ids actually dispatched
    pub distinct: usize,
    pub processed_count: usize,
    /// Failed units, ordered by task id
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn failed_ids(&self) -> Vec<TaskId> {
        self.failures.iter().map(|f| f.task_id).collect()
    }
}

type UnitOutcome = std::result::Result<(), UnitFailure>;

/// Runs batches of tasks concurrently against a task store
#[derive(Clone)]
pub struct BatchCoordinator {
    store: Arc<dyn TaskRepository>,
    work: Arc<dyn UnitWork>,
    config: BatchConfig,
    permits: Arc<Semaphore>,
}

impl BatchCoordinator {
    /// Create a coordinator using the simulated processing step
    pub fn new(store: Arc<dyn TaskRepository>, config: BatchConfig) -> Self {
        Self::with_work(store, Arc::new(SimulatedWork::default()), config)
    }

    pub fn with_work(
        store: Arc<dyn TaskRepository>,
        work: Arc<dyn UnitWork>,
        config: BatchConfig,
    ) -> Self {
        let config = BatchConfig {
            max_concurrency: config.max_concurrency.max(1),
            ..config
        };
        Self {
            store,
            work,
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
        }
    }

    pub fn config(&self) -> BatchConfig {
        self.config
    }

    /// Mark every distinct task in `task_ids` completed.
    ///
    /// Each distinct id gets its own unit: run the processing step, then set
    /// the status to `completed`. Units never affect each other; their
    /// failures end up in the report. Errors are returned only when the
    /// batch cannot be dispatched at all.
    ///
    /// Units are detached tokio tasks. Dropping the returned future stops the
    /// wait but not the units already dispatched.
    pub async fn process_batch(&self, task_ids: &[TaskId]) -> Result<BatchReport> {
        if let Some(bad) = task_ids.iter().find(|id| **id <= 0) {
            return Err(Error::validation(
                "task_ids",
                format!("all task ids must be positive integers, got {}", bad),
            ));
        }

        let distinct: BTreeSet<TaskId> = task_ids.iter().copied().collect();
        if distinct.len() > self.config.max_batch_size {
            return Err(Error::validation(
                "task_ids",
                format!(
                    "batch of {} tasks exceeds the limit of {}",
                    distinct.len(),
                    self.config.max_batch_size
                ),
            ));
        }

        let mut report = BatchReport {
            requested: task_ids.len(),
            distinct: distinct.len(),
            ..BatchReport::default()
        };
        if distinct.is_empty() {
            return Ok(report);
        }

        let runtime = Handle::try_current()
            .map_err(|e| Error::System(format!("cannot dispatch batch: {}", e)))?;
        self.store.ping().await.map_err(|e| {
            error!(error = %e, "Task store unavailable, rejecting batch");
            Error::StoreUnavailable(e.to_string())
        })?;

        let started = Instant::now();
        info!(
            requested = report.requested,
            distinct = report.distinct,
            "Dispatching batch"
        );

        let ids: Vec<TaskId> = distinct.into_iter().collect();
        let handles: Vec<_> = ids
            .iter()
            .map(|&task_id| {
                let store = Arc::clone(&self.store);
                let work = Arc::clone(&self.work);
                let permits = Arc::clone(&self.permits);
                runtime.spawn(
                    async move {
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|e| UnitFailure::Crashed(e.to_string()))?;
                        run_unit(store.as_ref(), work.as_ref(), task_id).await
                    }
                    .instrument(info_span!("batch_unit", task_id)),
                )
            })
            .collect();

        let outcomes = join_all(handles).await;

        for (task_id, joined) in ids.into_iter().zip(outcomes) {
            let outcome = joined.unwrap_or_else(|e| {
                error!(task_id, error = %e, "Batch unit crashed");
                Err(UnitFailure::Crashed(e.to_string()))
            });
            match outcome {
                Ok(()) => report.processed_count += 1,
                Err(reason) => report.failures.push(BatchFailure { task_id, reason }),
            }
        }

        info!(
            processed = report.processed_count,
            failed = report.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );
        Ok(report)
    }
}

async fn run_unit(store: &dyn TaskRepository, work: &dyn UnitWork, task_id: TaskId) -> UnitOutcome {
    if let Err(e) = work.run(task_id).await {
        error!(error = %e, "Processing step failed");
        return Err(UnitFailure::Work(e.to_string()));
    }

    match store.update_status(task_id, TaskStatus::Completed).await {
        Ok(true) => {
            info!("Task processed successfully");
            Ok(())
        }
        Ok(false) | Err(Error::TaskNotFound(_)) => {
            warn!("Task not found");
            Err(UnitFailure::NotFound)
        }
        Err(e) => {
            error!(error = %e, "Failed to mark task completed");
            Err(UnitFailure::Store(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PROCESSING_DELAY;
    use crate::db::tests::open_test_database;
    use crate::task::{
        InMemoryTaskStore, ListQuery, NewTask, SqliteTaskStore, Task, TaskPage, TaskPatch,
    };
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::Duration;

    async fn seeded_store(count: usize) -> Arc<InMemoryTaskStore> {
        let store = Arc::new(InMemoryTaskStore::new());
        for i in 0..count {
            store
                .create(NewTask::new(format!("Task {}", i + 1)).unwrap())
                .await
                .unwrap();
        }
        store
    }

    /// Delegates to an in-memory store, failing writes for chosen ids
    struct FlakyStore {
        inner: InMemoryTaskStore,
        failing_ids: HashSet<TaskId>,
        unavailable: bool,
    }

    #[async_trait]
    impl TaskRepository for FlakyStore {
        async fn create(&self, task: NewTask) -> Result<Task> {
            self.inner.create(task).await
        }

        async fn get(&self, id: TaskId) -> Result<Task> {
            self.inner.get(id).await
        }

        async fn list(&self, query: &ListQuery) -> Result<TaskPage> {
            self.inner.list(query).await
        }

        async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
            self.inner.update(id, patch).await
        }

        async fn delete(&self, id: TaskId) -> Result<()> {
            self.inner.delete(id).await
        }

        async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<bool> {
            if self.failing_ids.contains(&id) {
                return Err(Error::Storage("disk I/O error".to_string()));
            }
            self.inner.update_status(id, status).await
        }

        async fn ping(&self) -> Result<()> {
            if self.unavailable {
                return Err(Error::Storage("connection refused".to_string()));
            }
            Ok(())
        }
    }

    struct FailingWork;

    #[async_trait]
    impl UnitWork for FailingWork {
        async fn run(&self, task_id: TaskId) -> Result<()> {
            if task_id == 2 {
                return Err(Error::System("worker exploded".to_string()));
            }
            Ok(())
        }
    }

    struct PanickingWork;

    #[async_trait]
    impl UnitWork for PanickingWork {
        async fn run(&self, task_id: TaskId) -> Result<()> {
            if task_id == 1 {
                panic!("unit {} panicked", task_id);
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn units_run_concurrently() {
        let store = seeded_store(3).await;
        let coordinator = BatchCoordinator::new(store.clone(), BatchConfig::default());

        let started = tokio::time::Instant::now();
        let report = coordinator.process_batch(&[1, 2, 3]).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.processed_count, 3);
        assert!(report.failures.is_empty());
        assert!(elapsed >= PROCESSING_DELAY);
        assert!(elapsed < PROCESSING_DELAY * 2, "took {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_limit_queues_extra_units() {
        let store = seeded_store(3).await;
        let config = BatchConfig {
            max_concurrency: 1,
            ..BatchConfig::default()
        };
        let coordinator = BatchCoordinator::new(store, config);

        let started = tokio::time::Instant::now();
        let report = coordinator.process_batch(&[1, 2, 3]).await.unwrap();

        assert_eq!(report.processed_count, 3);
        assert!(started.elapsed() >= PROCESSING_DELAY * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reprocessing_is_idempotent() {
        let store = seeded_store(1).await;
        let coordinator = BatchCoordinator::new(store.clone(), BatchConfig::default());

        let first = coordinator.process_batch(&[1]).await.unwrap();
        let second = coordinator.process_batch(&[1]).await.unwrap();

        assert_eq!(first.processed_count, 1);
        assert_eq!(second.processed_count, 1);
        assert_eq!(store.get(1).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_task_does_not_affect_siblings() {
        let store = seeded_store(1).await;
        let coordinator = BatchCoordinator::new(store.clone(), BatchConfig::default());

        let report = coordinator.process_batch(&[1, 999]).await.unwrap();

        assert_eq!(report.processed_count, 1);
        assert_eq!(report.failed_ids(), vec![999]);
        assert_eq!(report.failures[0].reason, UnitFailure::NotFound);
        assert_eq!(store.get(1).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_ids_are_processed_once() {
        let store = seeded_store(1).await;
        let coordinator = BatchCoordinator::new(store, BatchConfig::default());

        let report = coordinator.process_batch(&[1, 1, 1]).await.unwrap();

        assert_eq!(report.requested, 3);
        assert_eq!(report.distinct, 1);
        assert_eq!(report.processed_count, 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_returns_immediately() {
        let store = seeded_store(0).await;
        let coordinator = BatchCoordinator::new(store, BatchConfig::default());

        let started = tokio::time::Instant::now();
        let report = coordinator.process_batch(&[]).await.unwrap();

        assert_eq!(report, BatchReport::default());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn non_positive_ids_are_rejected() {
        let store = seeded_store(1).await;
        let coordinator = BatchCoordinator::new(store.clone(), BatchConfig::default());

        let err = coordinator.process_batch(&[1, 0]).await.unwrap_err();
        assert_eq!(err.field(), Some("task_ids"));
        assert_eq!(store.get(1).await.unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_batch_is_rejected() {
        let store = seeded_store(0).await;
        let config = BatchConfig {
            max_batch_size: 2,
            ..BatchConfig::default()
        };
        let coordinator = BatchCoordinator::new(store, config);

        assert!(matches!(
            coordinator.process_batch(&[1, 2, 3]).await,
            Err(Error::Validation { .. })
        ));
        // Duplicates do not count against the limit
        assert!(coordinator.process_batch(&[1, 1, 2, 2]).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn store_errors_are_captured_per_unit() {
        let inner = InMemoryTaskStore::new();
        for i in 0..3 {
            inner
                .create(NewTask::new(format!("Task {}", i + 1)).unwrap())
                .await
                .unwrap();
        }
        let store = Arc::new(FlakyStore {
            inner,
            failing_ids: HashSet::from([2]),
            unavailable: false,
        });
        let coordinator = BatchCoordinator::new(store.clone(), BatchConfig::default());

        let report = coordinator.process_batch(&[1, 2, 3]).await.unwrap();

        assert_eq!(report.processed_count, 2);
        assert_eq!(report.failed_ids(), vec![2]);
        assert!(matches!(report.failures[0].reason, UnitFailure::Store(_)));
        assert_eq!(store.get(3).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn unavailable_store_fails_fast() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryTaskStore::new(),
            failing_ids: HashSet::new(),
            unavailable: true,
        });
        let coordinator = BatchCoordinator::new(store, BatchConfig::default());

        assert!(matches!(
            coordinator.process_batch(&[1, 2]).await,
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn failing_work_is_reported() {
        let store = seeded_store(3).await;
        let coordinator =
            BatchCoordinator::with_work(store.clone(), Arc::new(FailingWork), BatchConfig::default());

        let report = coordinator.process_batch(&[1, 2, 3]).await.unwrap();

        assert_eq!(report.processed_count, 2);
        assert_eq!(report.failed_ids(), vec![2]);
        assert!(matches!(report.failures[0].reason, UnitFailure::Work(_)));
        assert_eq!(store.get(2).await.unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn panicking_unit_is_isolated() {
        let store = seeded_store(2).await;
        let coordinator = BatchCoordinator::with_work(
            store.clone(),
            Arc::new(PanickingWork),
            BatchConfig::default(),
        );

        let report = coordinator.process_batch(&[1, 2]).await.unwrap();

        assert_eq!(report.processed_count, 1);
        assert_eq!(report.failed_ids(), vec![1]);
        assert!(matches!(report.failures[0].reason, UnitFailure::Crashed(_)));
        assert_eq!(store.get(2).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sqlite_batch_takes_one_delay() {
        let (db, _temp) = open_test_database().await;
        let store = Arc::new(SqliteTaskStore::new(db.pool().clone()));
        for i in 0..3 {
            store
                .create(NewTask::new(format!("Task {}", i + 1)).unwrap())
                .await
                .unwrap();
        }
        let coordinator = BatchCoordinator::new(store.clone(), BatchConfig::default());

        let started = Instant::now();
        let report = coordinator.process_batch(&[1, 2, 3, 404]).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.processed_count, 3);
        assert_eq!(report.failed_ids(), vec![404]);
        assert!(elapsed >= PROCESSING_DELAY);
        assert!(elapsed < PROCESSING_DELAY + Duration::from_millis(1500), "took {:?}", elapsed);

        let completed = store
            .list(&ListQuery::new(None, None, Some(TaskStatus::Completed)).unwrap())
            .await
            .unwrap();
        assert_eq!(completed.total, 3);
        for task in &completed.items {
            assert!(task.updated_at > task.created_at, "task {} not refreshed", task.id);
        }
    }

    #[tokio::test]
    async fn completion_refreshes_updated_at() {
        let store = seeded_store(2).await;
        let before = store.get(1).await.unwrap();
        let coordinator = BatchCoordinator::with_work(
            store.clone(),
            Arc::new(SimulatedWork::new(Duration::from_millis(10))),
            BatchConfig::default(),
        );

        let report = coordinator.process_batch(&[1, 1, 77]).await.unwrap();

        assert_eq!(report.processed_count, 1);
        assert_eq!(report.failed_ids(), vec![77]);
        let after = store.get(1).await.unwrap();
        assert_eq!(after.status, TaskStatus::Completed);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
        // Untouched siblings keep their timestamps
        let other = store.get(2).await.unwrap();
        assert_eq!(other.updated_at, other.created_at);
    }
}
