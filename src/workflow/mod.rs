//! Workflow records and the guarded status state machine.
//!
//! A workflow moves `pending → running → {paused_for_human ⇄ running} →
//! {completed | failed | cancelled}`. The state machine enforces that graph
//! and owns the collected-data accumulator; everything it writes goes through
//! the durable store.

pub mod state_machine;
pub mod types;

pub use state_machine::{TransitionError, WorkflowStateMachine};
pub use types::{
    CollectedData, ExecutionMode, TransitionRecord, Workflow, WorkflowSpec, WorkflowStatus,
};
