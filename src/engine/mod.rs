//! Execution engine: drives a workflow from its current step to the next
//! checkpoint, completion, or a fatal error.
//!
//! The engine holds no per-workflow state of its own. Every transition is a
//! read-modify-write against the durable store, so a background task, a
//! reviewer's resolve call, and the watchdog can all act on the same workflow
//! without stepping on each other.

pub mod modes;
pub mod step;

pub use modes::{BackgroundExecutor, BlockingRunner};
pub use step::{CheckpointRequest, FnStepLogic, StepError, StepLogic, StepOutcome};

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::review::registry::{ReviewError, ReviewRegistry};
use crate::review::types::{Resolution, ResolutionAction, ReviewDecision};
use crate::store::{StateStore, StoreError};
use crate::workflow::state_machine::{TransitionError, WorkflowStateMachine};
use crate::workflow::types::{CollectedData, Workflow, WorkflowSpec, WorkflowStatus};

/// Default review deadline when a checkpoint does not name one: 30 minutes.
pub const DEFAULT_REVIEW_TIMEOUT_SECONDS: i64 = 1800;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ExecutionEngine {
    store: Arc<dyn StateStore>,
    state_machine: WorkflowStateMachine,
    registry: ReviewRegistry,
    step_logic: Arc<dyn StepLogic>,
    default_timeout_seconds: i64,
}

impl ExecutionEngine {
    pub fn new(store: Arc<dyn StateStore>, step_logic: Arc<dyn StepLogic>) -> Self {
        let state_machine = WorkflowStateMachine::new(store.clone());
        let registry = ReviewRegistry::new(store.clone());
        Self {
            store,
            state_machine,
            registry,
            step_logic,
            default_timeout_seconds: DEFAULT_REVIEW_TIMEOUT_SECONDS,
        }
    }

    pub fn with_default_timeout(mut self, seconds: i64) -> Self {
        self.default_timeout_seconds = seconds;
        self
    }

    pub fn registry(&self) -> &ReviewRegistry {
        &self.registry
    }

    /// Persist a new workflow in `pending` without executing anything.
    pub async fn submit(&self, spec: WorkflowSpec) -> Result<Workflow, EngineError> {
        let mut workflow = Workflow::new(spec);
        self.state_machine.persist(&mut workflow).await?;
        info!(
            workflow_id = %workflow.id,
            owner = %workflow.owner_id,
            mode = ?workflow.execution_mode,
            steps = workflow.steps.len(),
            "workflow submitted"
        );
        Ok(workflow)
    }

    /// Transition a pending workflow to `running` and drive it forward.
    pub async fn run(&self, workflow_id: Uuid) -> Result<Workflow, EngineError> {
        let mut workflow = self.load(workflow_id).await?;
        if workflow.status == WorkflowStatus::Pending {
            self.state_machine
                .transition(&mut workflow, WorkflowStatus::Running)
                .await?;
        }
        self.advance(&mut workflow).await?;
        Ok(workflow)
    }

    /// Create and execute a workflow until its first pause or a terminal
    /// state. This is the blocking-mode composition of submit + run.
    pub async fn start(&self, spec: WorkflowSpec) -> Result<Workflow, EngineError> {
        let workflow = self.submit(spec).await?;
        self.run(workflow.id).await
    }

    /// Execute step logic from the current step until a checkpoint pauses the
    /// workflow, the declared steps run out, or a step fails.
    pub async fn advance(&self, workflow: &mut Workflow) -> Result<(), EngineError> {
        if workflow.status.is_terminal() {
            debug!(workflow_id = %workflow.id, status = %workflow.status, "advance on terminal workflow; nothing to do");
            return Ok(());
        }
        if let Some(review_id) = workflow.outstanding_review() {
            return Err(ReviewError::AlreadyOutstanding(review_id).into());
        }
        if workflow.status == WorkflowStatus::PausedForHuman {
            // Post-request_more_info: the resolution closed the review but
            // left the workflow paused; re-running the step raises a fresh
            // checkpoint with a fresh deadline.
            self.state_machine
                .transition_with_note(
                    workflow,
                    WorkflowStatus::Running,
                    Some("re-running checkpoint step for follow-up".to_string()),
                )
                .await?;
        }

        while let Some(step_name) = workflow.current_step.clone() {
            debug!(workflow_id = %workflow.id, step = %step_name, "executing step");
            match self
                .step_logic
                .execute(&step_name, &workflow.collected_data)
                .await
            {
                Ok(StepOutcome::Complete { output }) => {
                    workflow.advance_cursor();
                    self.state_machine
                        .merge_collected_data(workflow, output)
                        .await?;
                }
                Ok(StepOutcome::Checkpoint(checkpoint)) => {
                    let timeout = checkpoint
                        .timeout_seconds
                        .unwrap_or(self.default_timeout_seconds);
                    let snapshot = workflow.collected_data.clone();
                    let reviewer = workflow.reviewer_id.clone();
                    self.registry
                        .create_review(
                            workflow,
                            &checkpoint.step_name,
                            &checkpoint.description,
                            snapshot,
                            checkpoint.suggestion,
                            reviewer,
                            timeout,
                        )
                        .await?;
                    return Ok(());
                }
                Err(step_error) => {
                    self.state_machine
                        .record_error(
                            workflow,
                            format!("step '{step_name}' failed: {step_error}"),
                        )
                        .await?;
                    return Ok(());
                }
            }
        }

        self.state_machine
            .transition(workflow, WorkflowStatus::Completed)
            .await?;
        info!(workflow_id = %workflow.id, "workflow completed");
        Ok(())
    }

    /// Resolve a review and apply the resolution's effect on the workflow.
    ///
    /// Returns the updated workflow and whether the caller should `advance`
    /// it (false for `reject` and `request_more_info`).
    pub async fn apply_resolution(
        &self,
        review_id: Uuid,
        decision: ReviewDecision,
        modified_data: Option<CollectedData>,
        comments: Option<String>,
        resolver_id: Option<String>,
    ) -> Result<(Workflow, bool), EngineError> {
        let resolution = self
            .registry
            .resolve(review_id, decision, modified_data, comments, resolver_id)
            .await?;
        let review = self.registry.get(review_id).await?;
        let mut workflow = self.load(review.workflow_id).await?;
        workflow.review_queue.retain(|id| *id != review_id);

        let should_advance = match resolution.action {
            ResolutionAction::Approve => {
                self.resume_past_checkpoint(&mut workflow, &resolution, None)
                    .await?;
                true
            }
            ResolutionAction::Modify => {
                let patch = resolution.modified_data.clone().unwrap_or_default();
                self.resume_past_checkpoint(&mut workflow, &resolution, Some(patch))
                    .await?;
                true
            }
            ResolutionAction::Reject => {
                let message = match &resolution.comments {
                    Some(comments) => format!("rejected by reviewer: {comments}"),
                    None => "rejected by reviewer".to_string(),
                };
                self.state_machine
                    .record_error(&mut workflow, message)
                    .await?;
                false
            }
            ResolutionAction::RequestMoreInfo => {
                // Deliberately stays paused; a later advance re-runs the
                // step to raise the follow-up checkpoint.
                self.state_machine.persist(&mut workflow).await?;
                false
            }
            // Synthetic actions cannot come from a ReviewDecision.
            ResolutionAction::Timeout | ResolutionAction::Cancelled => unreachable!(),
        };
        Ok((workflow, should_advance))
    }

    /// Resolve a review and, where the action allows, continue execution
    /// from the step after the checkpoint.
    pub async fn resume(
        &self,
        review_id: Uuid,
        decision: ReviewDecision,
        modified_data: Option<CollectedData>,
        comments: Option<String>,
        resolver_id: Option<String>,
    ) -> Result<Workflow, EngineError> {
        let (mut workflow, should_advance) = self
            .apply_resolution(review_id, decision, modified_data, comments, resolver_id)
            .await?;
        if should_advance {
            self.advance(&mut workflow).await?;
        }
        Ok(workflow)
    }

    async fn resume_past_checkpoint(
        &self,
        workflow: &mut Workflow,
        resolution: &Resolution,
        review_patch: Option<CollectedData>,
    ) -> Result<(), EngineError> {
        self.state_machine
            .transition_with_note(
                workflow,
                WorkflowStatus::Running,
                Some(format!("review resolved: {:?}", resolution.action)),
            )
            .await?;
        if let Some(patch) = review_patch {
            self.state_machine
                .apply_review_data(workflow, patch)
                .await?;
        }
        workflow.advance_cursor();
        self.state_machine.persist(workflow).await?;
        Ok(())
    }

    /// Cancel a workflow from any non-terminal state, closing its
    /// outstanding review so the watchdog never fires on it.
    pub async fn cancel(&self, workflow_id: Uuid) -> Result<Workflow, EngineError> {
        let mut workflow = self.load(workflow_id).await?;
        if workflow.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                status: workflow.status,
            }
            .into());
        }
        self.registry.cancel_outstanding(&mut workflow).await?;
        self.state_machine
            .transition_with_note(
                &mut workflow,
                WorkflowStatus::Cancelled,
                Some("cancelled by caller".to_string()),
            )
            .await?;
        info!(workflow_id = %workflow.id, "workflow cancelled");
        Ok(workflow)
    }

    /// Watchdog path: force a workflow to `failed` after its review expired.
    ///
    /// The review is already resolved, so no later scan will revisit it;
    /// a stale-version write therefore retries with a fresh snapshot instead
    /// of giving up.
    pub async fn fail_for_timeout(
        &self,
        workflow_id: Uuid,
        review_id: Uuid,
    ) -> Result<(), EngineError> {
        loop {
            let mut workflow = self.load(workflow_id).await?;
            workflow.review_queue.retain(|id| *id != review_id);
            match self
                .state_machine
                .record_error(&mut workflow, "human review timeout")
                .await
            {
                Ok(()) => return Ok(()),
                Err(TransitionError::AlreadyTerminal { status }) => {
                    // Lost a race against completion or cancellation.
                    warn!(workflow_id = %workflow_id, status = %status, "timeout fail skipped; workflow already terminal");
                    return Ok(());
                }
                Err(TransitionError::Store(StoreError::VersionConflict { .. })) => {
                    debug!(workflow_id = %workflow_id, "timeout fail lost a version race; reloading");
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Read-only status poll.
    pub async fn status(&self, workflow_id: Uuid) -> Result<Workflow, EngineError> {
        self.load(workflow_id).await
    }

    pub async fn workflows_for_owner(&self, owner_id: &str) -> Result<Vec<Workflow>, EngineError> {
        Ok(self.store.workflows_by_owner(owner_id).await?)
    }

    async fn load(&self, workflow_id: Uuid) -> Result<Workflow, EngineError> {
        self.store
            .get_workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))
    }
}
