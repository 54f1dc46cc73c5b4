//! Shared fixtures for the integration suite: an in-memory store, a
//! scripted step function, and spec builders.

use std::sync::Arc;

use greenlight::{
    CheckpointRequest, CollectedData, ExecutionEngine, ExecutionMode, FnStepLogic, InMemoryStore,
    StepError, StepOutcome, Workflow, WorkflowSpec, WorkflowStatus,
};

pub type ScriptFn = dyn Fn(&str, &CollectedData) -> Result<StepOutcome, StepError> + Send + Sync;

pub fn build_engine(
    script: Box<ScriptFn>,
) -> (Arc<InMemoryStore>, Arc<ExecutionEngine>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(ExecutionEngine::new(
        store.clone(),
        Arc::new(FnStepLogic::new(move |step: &str, data: &CollectedData| {
            script(step, data)
        })),
    ));
    (store, engine)
}

pub fn spec(steps: &[&str], mode: ExecutionMode) -> WorkflowSpec {
    WorkflowSpec {
        owner_id: "owner-1".to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        reviewer_id: Some("reviewer-1".to_string()),
        initial_data: CollectedData::new(),
        execution_mode: mode,
    }
}

/// Step outcome that emits `{key: value}`.
pub fn emit(key: &str, value: serde_json::Value) -> Result<StepOutcome, StepError> {
    let mut output = CollectedData::new();
    output.insert(key.to_string(), value);
    Ok(StepOutcome::Complete { output })
}

/// Step outcome that requests a checkpoint on `step` with an optional
/// deadline override.
pub fn checkpoint(step: &str, timeout_seconds: Option<i64>) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::Checkpoint(CheckpointRequest {
        step_name: step.to_string(),
        description: format!("review required for {step}"),
        suggestion: None,
        timeout_seconds,
    }))
}

/// The paused-iff-one-unresolved-review invariant, checked against the
/// workflow record itself.
pub fn assert_pause_invariant(workflow: &Workflow) {
    if workflow.status == WorkflowStatus::PausedForHuman {
        assert_eq!(
            workflow.review_queue.len(),
            1,
            "paused workflow must have exactly one unresolved review"
        );
    } else {
        assert!(
            workflow.review_queue.is_empty(),
            "non-paused workflow must have no unresolved reviews"
        );
    }
}
