use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Accumulated key/value record carried across workflow steps.
pub type CollectedData = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a workflow.
///
/// `PausedForHuman` and `Running` may alternate once per checkpoint; every
/// other edge is one-way. The three terminal states accept no outgoing
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    PausedForHuman,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    /// Whether `next` is reachable from this status via the transition graph.
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        match self {
            Pending => matches!(next, Running | Failed | Cancelled),
            Running => matches!(next, PausedForHuman | Completed | Failed | Cancelled),
            PausedForHuman => matches!(next, Running | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::PausedForHuman => "paused_for_human",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Blocking callers hold the line until the first pause or a terminal state;
/// background callers get the workflow id back immediately and poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Blocking,
    Background,
}

/// Caller-supplied description of a workflow to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Entity the workflow runs on behalf of.
    pub owner_id: String,
    /// Ordered step names the engine will drive through.
    pub steps: Vec<String>,
    /// Reviewer checkpoints should be assigned to, if any.
    pub reviewer_id: Option<String>,
    /// Seed data available to the first step.
    #[serde(default)]
    pub initial_data: CollectedData,
    pub execution_mode: ExecutionMode,
}

/// Audit record appended on every status change. Appending to the history is
/// the one mutation still allowed on a terminal workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Durable record of a single workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub owner_id: String,
    pub steps: Vec<String>,
    pub status: WorkflowStatus,
    /// Index into `steps` of the step the engine will execute next.
    pub cursor: usize,
    /// Name of the step at `cursor`, `None` once all steps are consumed.
    pub current_step: Option<String>,
    pub collected_data: CollectedData,
    /// Keys last written by a `modify` resolution. Step output merges never
    /// silently overwrite these with the original unreviewed value.
    pub reviewed_keys: BTreeSet<String>,
    pub execution_mode: ExecutionMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Ids of unresolved reviews. The state machine invariant keeps this at
    /// length one while paused and empty otherwise.
    pub review_queue: Vec<Uuid>,
    pub history: Vec<TransitionRecord>,
    /// Optimistic-concurrency token for conditional store writes.
    pub version: u64,
    /// Reviewer hint carried into every checkpoint this workflow raises.
    pub reviewer_id: Option<String>,
}

impl Workflow {
    pub fn new(spec: WorkflowSpec) -> Self {
        let now = Utc::now();
        let current_step = spec.steps.first().cloned();
        Self {
            id: Uuid::new_v4(),
            owner_id: spec.owner_id,
            steps: spec.steps,
            status: WorkflowStatus::Pending,
            cursor: 0,
            current_step,
            collected_data: spec.initial_data,
            reviewed_keys: BTreeSet::new(),
            execution_mode: spec.execution_mode,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            review_queue: Vec::new(),
            history: Vec::new(),
            version: 0,
            reviewer_id: spec.reviewer_id,
        }
    }

    /// The single unresolved review, if one is outstanding.
    pub fn outstanding_review(&self) -> Option<Uuid> {
        self.review_queue.last().copied()
    }

    /// Move the cursor past the current step.
    pub fn advance_cursor(&mut self) {
        self.cursor += 1;
        self.current_step = self.steps.get(self.cursor).cloned();
    }
}
