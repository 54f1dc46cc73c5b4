//! Greenlight - Human-in-the-Loop Workflow Orchestration
//!
//! Drives multi-step workflows that pause at designated checkpoints for a
//! human decision. The engine suspends a workflow while a review is
//! outstanding, a watchdog enforces review deadlines, and callers choose
//! between blocking execution (return at first pause) and background
//! execution (spawned task per workflow, polled status).

pub mod config;
pub mod engine;
pub mod review;
pub mod store;
pub mod telemetry;
pub mod watchdog;
pub mod workflow;

// Re-export key types for easy access
pub use config::{config, init_config, GreenlightConfig};
pub use engine::{
    BackgroundExecutor, BlockingRunner, CheckpointRequest, EngineError, ExecutionEngine,
    FnStepLogic, StepError, StepLogic, StepOutcome,
};
pub use review::{
    Resolution, ResolutionAction, ReviewDecision, ReviewError, ReviewRegistry, ReviewRequest,
};
pub use store::{memory::InMemoryStore, StateStore, StoreError};
#[cfg(feature = "database")]
pub use store::sqlite::SqliteStore;
pub use telemetry::{generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use watchdog::{TimeoutWatchdog, WatchdogHandle};
pub use workflow::{
    CollectedData, ExecutionMode, TransitionError, TransitionRecord, Workflow, WorkflowSpec,
    WorkflowStateMachine, WorkflowStatus,
};
