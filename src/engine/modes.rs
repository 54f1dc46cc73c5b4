//! Blocking and background execution modes.
//!
//! Blocking mode returns to the caller only once the workflow reaches
//! `paused_for_human` or a terminal state. Background mode hands back the
//! workflow id immediately and runs each workflow on its own spawned task;
//! callers observe progress by polling `status`. One workflow's failure
//! never takes down another's task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::error;
use uuid::Uuid;

use super::{EngineError, ExecutionEngine};
use crate::review::types::ReviewDecision;
use crate::workflow::types::{CollectedData, Workflow, WorkflowSpec};

/// Synchronous adapter: the caller blocks until the first pause or a
/// terminal state. No polling needed.
pub struct BlockingRunner {
    engine: Arc<ExecutionEngine>,
}

impl BlockingRunner {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self { engine }
    }

    pub async fn run(&self, spec: WorkflowSpec) -> Result<Workflow, EngineError> {
        self.engine.start(spec).await
    }

    pub async fn resume(
        &self,
        review_id: Uuid,
        decision: ReviewDecision,
        modified_data: Option<CollectedData>,
        comments: Option<String>,
        resolver_id: Option<String>,
    ) -> Result<Workflow, EngineError> {
        self.engine
            .resume(review_id, decision, modified_data, comments, resolver_id)
            .await
    }
}

/// Asynchronous adapter: one independently scheduled task per in-flight
/// workflow, keyed by workflow id. No task survives a pause; while a
/// workflow waits on a review, nothing is blocked.
pub struct BackgroundExecutor {
    engine: Arc<ExecutionEngine>,
    tasks: Arc<RwLock<HashMap<Uuid, TaskSlot>>>,
    next_token: AtomicU64,
}

/// Map entry for a spawned task. The token identifies which spawn owns the
/// slot: a workflow id can be reused across a run task and later resume
/// tasks, and a finishing task must only reap its own entry.
struct TaskSlot {
    token: u64,
    handle: JoinHandle<()>,
}

impl BackgroundExecutor {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            next_token: AtomicU64::new(0),
        }
    }

    /// Persist the workflow and return its id immediately; execution
    /// proceeds on a spawned task.
    pub async fn start(&self, spec: WorkflowSpec) -> Result<Uuid, EngineError> {
        let workflow = self.engine.submit(spec).await?;
        let workflow_id = workflow.id;
        self.spawn_run(workflow_id).await;
        Ok(workflow_id)
    }

    /// Resolve a review synchronously — so a losing racer still gets its
    /// conflict signal — then continue execution in the background where the
    /// resolution allows it.
    pub async fn resume(
        &self,
        review_id: Uuid,
        decision: ReviewDecision,
        modified_data: Option<CollectedData>,
        comments: Option<String>,
        resolver_id: Option<String>,
    ) -> Result<Uuid, EngineError> {
        let (workflow, should_advance) = self
            .engine
            .apply_resolution(review_id, decision, modified_data, comments, resolver_id)
            .await?;
        let workflow_id = workflow.id;
        if should_advance {
            self.spawn_advance(workflow).await;
        }
        Ok(workflow_id)
    }

    /// Await the task for a workflow, if one is still running. Used by tests
    /// and graceful shutdown.
    pub async fn join(&self, workflow_id: Uuid) {
        let slot = self.tasks.write().await.remove(&workflow_id);
        if let Some(slot) = slot {
            let _ = slot.handle.await;
        }
    }

    pub async fn active_tasks(&self) -> usize {
        self.tasks.read().await.len()
    }

    async fn spawn_run(&self, workflow_id: Uuid) {
        let engine = self.engine.clone();
        self.spawn_task(workflow_id, async move {
            if let Err(err) = engine.run(workflow_id).await {
                // Step failures are already recorded on the workflow; this
                // catches engine-level errors (store conflicts and the like)
                // so they never escape the task.
                error!(workflow_id = %workflow_id, error = %err, "background workflow task failed");
            }
        })
        .await;
    }

    async fn spawn_advance(&self, mut workflow: Workflow) {
        let workflow_id = workflow.id;
        let engine = self.engine.clone();
        self.spawn_task(workflow_id, async move {
            if let Err(err) = engine.advance(&mut workflow).await {
                error!(workflow_id = %workflow_id, error = %err, "background resume task failed");
            }
        })
        .await;
    }

    /// Register `work` as the workflow's live task. The map's write lock is
    /// held across the spawn, so the task's self-removal cannot run before
    /// the insert; the token check keeps a finishing task from reaping a
    /// newer entry spawned for the same workflow.
    async fn spawn_task<F>(&self, workflow_id: Uuid, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let tasks = self.tasks.clone();
        let mut slots = self.tasks.write().await;
        let handle = tokio::spawn(async move {
            work.await;
            let mut slots = tasks.write().await;
            if slots.get(&workflow_id).map_or(false, |slot| slot.token == token) {
                slots.remove(&workflow_id);
            }
        });
        slots.insert(workflow_id, TaskSlot { token, handle });
    }
}
