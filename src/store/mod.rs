//! Durable state store boundary.
//!
//! The engine, registry, and watchdog all share one `StateStore`. Workflow
//! writes are conditional on a version token and resolution writes are
//! conditional on the resolution still being unset, which is what makes the
//! write-once guarantees of the review lifecycle hold under concurrency.

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::review::types::{Resolution, ReviewRequest};
use crate::workflow::types::Workflow;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("review {0} not found")]
    ReviewNotFound(Uuid),

    #[error("stale write for workflow {id}: expected version {expected}, found {found}")]
    VersionConflict { id: Uuid, expected: u64, found: u64 },

    #[error("review {0} already has a resolution")]
    AlreadyResolved(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence contract for workflow and review records.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert or update a workflow. The write only succeeds if the stored
    /// version matches `workflow.version` (0 means "new record"); returns the
    /// new version on success and `VersionConflict` on a stale write.
    async fn put_workflow(&self, workflow: &Workflow) -> Result<u64, StoreError>;

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, StoreError>;

    async fn insert_review(&self, review: &ReviewRequest) -> Result<(), StoreError>;

    async fn get_review(&self, id: Uuid) -> Result<Option<ReviewRequest>, StoreError>;

    /// Atomically set the resolution of a review, conditional on the
    /// resolution still being unset. Exactly one of two racing callers wins;
    /// the loser sees `AlreadyResolved`. Returns the resolved review.
    async fn resolve_review(
        &self,
        id: Uuid,
        resolution: Resolution,
    ) -> Result<ReviewRequest, StoreError>;

    /// Unresolved reviews whose deadline is at or before `deadline`.
    async fn reviews_pending_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, StoreError>;

    /// All unresolved reviews, optionally narrowed to an assigned reviewer.
    async fn pending_reviews(
        &self,
        reviewer_id: Option<&str>,
    ) -> Result<Vec<ReviewRequest>, StoreError>;

    async fn workflows_by_owner(&self, owner_id: &str) -> Result<Vec<Workflow>, StoreError>;
}
