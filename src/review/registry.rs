//! Review request lifecycle: create, resolve, expire.
//!
//! Resolution is write-once. A reviewer's `resolve` and the watchdog's
//! `expire` may race on the same review; the store's conditional update
//! guarantees exactly one winner and the loser gets `ReviewAlreadyResolved`.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::review::types::{Resolution, ResolutionAction, ReviewDecision, ReviewRequest};
use crate::store::{StateStore, StoreError};
use crate::workflow::state_machine::{TransitionError, WorkflowStateMachine};
use crate::workflow::types::{CollectedData, Workflow, WorkflowStatus};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review {0} is still outstanding for this workflow")]
    AlreadyOutstanding(Uuid),

    #[error("review {0} not found")]
    NotFound(Uuid),

    #[error("review {0} is already resolved")]
    AlreadyResolved(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ReviewNotFound(id) => ReviewError::NotFound(id),
            StoreError::AlreadyResolved(id) => ReviewError::AlreadyResolved(id),
            other => ReviewError::Store(other),
        }
    }
}

/// Manages the lifecycle of human-review requests against the shared store.
#[derive(Clone)]
pub struct ReviewRegistry {
    store: Arc<dyn StateStore>,
    state_machine: WorkflowStateMachine,
}

impl ReviewRegistry {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        let state_machine = WorkflowStateMachine::new(store.clone());
        Self {
            store,
            state_machine,
        }
    }

    /// Open a review for the workflow's current checkpoint, arm its deadline,
    /// and pause the workflow.
    ///
    /// Fails with `AlreadyOutstanding` if the workflow already has an
    /// unresolved review; one checkpoint at a time.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_review(
        &self,
        workflow: &mut Workflow,
        step_name: &str,
        description: &str,
        snapshot: CollectedData,
        suggestion: Option<String>,
        reviewer_id: Option<String>,
        timeout_seconds: i64,
    ) -> Result<Uuid, ReviewError> {
        if let Some(outstanding) = workflow.outstanding_review() {
            return Err(ReviewError::AlreadyOutstanding(outstanding));
        }

        let review = ReviewRequest::new(
            workflow.id,
            step_name.to_string(),
            description.to_string(),
            snapshot,
            suggestion,
            reviewer_id,
            timeout_seconds,
        );
        let review_id = review.id;
        self.store.insert_review(&review).await?;

        workflow.review_queue.push(review_id);
        self.state_machine
            .transition_with_note(
                workflow,
                WorkflowStatus::PausedForHuman,
                Some(format!("awaiting review of step '{step_name}'")),
            )
            .await?;

        info!(
            workflow_id = %workflow.id,
            review_id = %review_id,
            step = %step_name,
            deadline = %review.deadline,
            "review request created"
        );
        Ok(review_id)
    }

    /// Record a reviewer's decision. Write-once: a second submission, or one
    /// racing the watchdog, fails with `AlreadyResolved`.
    pub async fn resolve(
        &self,
        review_id: Uuid,
        decision: ReviewDecision,
        modified_data: Option<CollectedData>,
        comments: Option<String>,
        resolver_id: Option<String>,
    ) -> Result<Resolution, ReviewError> {
        // Distinguish not-found from resolved up front for a clean error.
        let existing = self
            .store
            .get_review(review_id)
            .await?
            .ok_or(ReviewError::NotFound(review_id))?;
        if existing.is_resolved() {
            return Err(ReviewError::AlreadyResolved(review_id));
        }

        let resolution = Resolution {
            action: decision.into(),
            modified_data,
            comments,
            resolver_id,
            resolved_at: Utc::now(),
        };
        let resolved = self.store.resolve_review(review_id, resolution).await?;

        info!(
            review_id = %review_id,
            workflow_id = %resolved.workflow_id,
            action = ?decision,
            "review resolved"
        );
        Ok(resolved.resolution.expect("resolution was just written"))
    }

    /// Watchdog-only: close an overdue review with a synthetic timeout.
    /// Race-safe against `resolve` via the same write-once guard.
    pub async fn expire(&self, review_id: Uuid) -> Result<Resolution, ReviewError> {
        let resolved = self
            .store
            .resolve_review(review_id, Resolution::synthetic(ResolutionAction::Timeout))
            .await?;

        info!(
            review_id = %review_id,
            workflow_id = %resolved.workflow_id,
            "review expired by timeout"
        );
        Ok(resolved.resolution.expect("resolution was just written"))
    }

    /// Close the workflow's outstanding review, if any, with the `cancelled`
    /// pseudo-action so the watchdog never fires on a cancelled workflow.
    /// Losing a race against another resolver is benign here.
    pub async fn cancel_outstanding(&self, workflow: &mut Workflow) -> Result<(), ReviewError> {
        let Some(review_id) = workflow.outstanding_review() else {
            return Ok(());
        };

        match self
            .store
            .resolve_review(review_id, Resolution::synthetic(ResolutionAction::Cancelled))
            .await
        {
            Ok(_) => {
                debug!(review_id = %review_id, "outstanding review cancelled");
            }
            Err(StoreError::AlreadyResolved(_)) => {
                debug!(review_id = %review_id, "review resolved before cancellation; ignoring");
            }
            Err(other) => return Err(other.into()),
        }
        workflow.review_queue.retain(|id| *id != review_id);
        Ok(())
    }

    /// Unresolved reviews, re-queried on every call; no cached cursor.
    pub async fn list_pending(
        &self,
        reviewer_id: Option<&str>,
    ) -> Result<Vec<ReviewRequest>, ReviewError> {
        Ok(self.store.pending_reviews(reviewer_id).await?)
    }

    pub async fn get(&self, review_id: Uuid) -> Result<ReviewRequest, ReviewError> {
        self.store
            .get_review(review_id)
            .await?
            .ok_or(ReviewError::NotFound(review_id))
    }
}
