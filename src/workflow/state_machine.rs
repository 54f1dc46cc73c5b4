//! Guarded workflow status transitions.
//!
//! Every mutation here is a read-modify-write persisted through the store's
//! version-conditional `put_workflow`, so concurrent writers (a background
//! task, a reviewer's resolve call, the watchdog) are totally ordered per
//! workflow.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{StateStore, StoreError};
use crate::workflow::types::{CollectedData, TransitionRecord, Workflow, WorkflowStatus};

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("workflow is already terminal in state {status}")]
    AlreadyTerminal { status: WorkflowStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns workflow status transitions and the collected-data accumulator.
#[derive(Clone)]
pub struct WorkflowStateMachine {
    store: Arc<dyn StateStore>,
}

impl WorkflowStateMachine {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Move `workflow` to `next`, append an audit record, and persist.
    ///
    /// Fails with `InvalidTransition` when `next` is not reachable from the
    /// current status.
    pub async fn transition(
        &self,
        workflow: &mut Workflow,
        next: WorkflowStatus,
    ) -> Result<(), TransitionError> {
        self.transition_with_note(workflow, next, None).await
    }

    pub async fn transition_with_note(
        &self,
        workflow: &mut Workflow,
        next: WorkflowStatus,
        note: Option<String>,
    ) -> Result<(), TransitionError> {
        if !workflow.status.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition {
                from: workflow.status,
                to: next,
            });
        }

        let now = Utc::now();
        workflow.history.push(TransitionRecord {
            from: workflow.status,
            to: next,
            at: now,
            note,
        });
        debug!(
            workflow_id = %workflow.id,
            from = %workflow.status,
            to = %next,
            "workflow status transition"
        );
        workflow.status = next;
        workflow.updated_at = now;
        if next == WorkflowStatus::Completed {
            workflow.completed_at = Some(now);
        }

        self.persist(workflow).await?;
        Ok(())
    }

    /// Force the workflow to `failed` with an error message.
    ///
    /// Legal from any non-terminal state, bypassing the normal graph check.
    pub async fn record_error(
        &self,
        workflow: &mut Workflow,
        message: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if workflow.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                status: workflow.status,
            });
        }

        let message = message.into();
        info!(workflow_id = %workflow.id, error = %message, "workflow failed");

        let now = Utc::now();
        workflow.history.push(TransitionRecord {
            from: workflow.status,
            to: WorkflowStatus::Failed,
            at: now,
            note: Some(message.clone()),
        });
        workflow.status = WorkflowStatus::Failed;
        workflow.error_message = Some(message);
        workflow.updated_at = now;

        self.persist(workflow).await?;
        Ok(())
    }

    /// Merge step output into collected data. Later writes win on key
    /// conflict, except keys previously set by a `modify` resolution, which
    /// step output may not silently overwrite.
    pub async fn merge_collected_data(
        &self,
        workflow: &mut Workflow,
        patch: CollectedData,
    ) -> Result<(), TransitionError> {
        for (key, value) in patch {
            if workflow.reviewed_keys.contains(&key) {
                debug!(
                    workflow_id = %workflow.id,
                    key = %key,
                    "skipping step write to reviewer-set key"
                );
                continue;
            }
            workflow.collected_data.insert(key, value);
        }
        workflow.updated_at = Utc::now();
        self.persist(workflow).await?;
        Ok(())
    }

    /// Review-privileged merge: reviewer data always wins and the keys it
    /// touches become protected from later step writes.
    pub async fn apply_review_data(
        &self,
        workflow: &mut Workflow,
        patch: CollectedData,
    ) -> Result<(), TransitionError> {
        for (key, value) in patch {
            workflow.reviewed_keys.insert(key.clone());
            workflow.collected_data.insert(key, value);
        }
        workflow.updated_at = Utc::now();
        self.persist(workflow).await?;
        Ok(())
    }

    /// Version-conditional write; bumps the in-memory version on success.
    pub async fn persist(&self, workflow: &mut Workflow) -> Result<(), StoreError> {
        let version = self.store.put_workflow(workflow).await?;
        workflow.version = version;
        Ok(())
    }
}
