//! Pluggable step-logic boundary.
//!
//! The engine does not know what a step computes. Step logic is an external
//! collaborator: given the current step name and collected data it either
//! produces output to merge, asks for a human checkpoint, or fails fatally.

use async_trait::async_trait;
use thiserror::Error;

use crate::workflow::types::CollectedData;

/// Fatal step failure. Captured by the engine and recorded into the
/// workflow's error message; never retried, never propagated as a panic.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct StepError {
    pub reason: String,
}

impl StepError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A step's request to pause the workflow for human review.
#[derive(Debug, Clone)]
pub struct CheckpointRequest {
    /// Checkpoint name, recorded on the review request.
    pub step_name: String,
    /// Human-readable description of what is being reviewed.
    pub description: String,
    /// Optional AI-produced suggestion for the reviewer.
    pub suggestion: Option<String>,
    /// Review deadline override; falls back to the engine default.
    pub timeout_seconds: Option<i64>,
}

/// What a step invocation produced.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Step finished; merge `output` into collected data and move on.
    Complete { output: CollectedData },
    /// Step wants a human decision before the workflow proceeds.
    Checkpoint(CheckpointRequest),
}

#[async_trait]
pub trait StepLogic: Send + Sync {
    async fn execute(
        &self,
        step_name: &str,
        data: &CollectedData,
    ) -> Result<StepOutcome, StepError>;
}

/// Closure adapter, used by the demo binary and throughout the test suite.
pub struct FnStepLogic<F> {
    f: F,
}

impl<F> FnStepLogic<F>
where
    F: Fn(&str, &CollectedData) -> Result<StepOutcome, StepError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> StepLogic for FnStepLogic<F>
where
    F: Fn(&str, &CollectedData) -> Result<StepOutcome, StepError> + Send + Sync,
{
    async fn execute(
        &self,
        step_name: &str,
        data: &CollectedData,
    ) -> Result<StepOutcome, StepError> {
        (self.f)(step_name, data)
    }
}
