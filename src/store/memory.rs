//! In-process store used by the demo binary and the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StateStore, StoreError};
use crate::review::types::{Resolution, ReviewRequest};
use crate::workflow::types::Workflow;

/// Map-backed store. All conditional semantics are enforced under a single
/// write lock, which stands in for the conditional-update primitive a real
/// document store would provide.
#[derive(Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    reviews: RwLock<HashMap<Uuid, ReviewRequest>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn put_workflow(&self, workflow: &Workflow) -> Result<u64, StoreError> {
        let mut workflows = self.workflows.write().await;
        match workflows.get(&workflow.id) {
            Some(stored) if stored.version != workflow.version => {
                return Err(StoreError::VersionConflict {
                    id: workflow.id,
                    expected: workflow.version,
                    found: stored.version,
                });
            }
            _ => {}
        }
        let mut next = workflow.clone();
        next.version = workflow.version + 1;
        let version = next.version;
        workflows.insert(workflow.id, next);
        Ok(version)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, StoreError> {
        Ok(self.workflows.read().await.get(&id).cloned())
    }

    async fn insert_review(&self, review: &ReviewRequest) -> Result<(), StoreError> {
        self.reviews.write().await.insert(review.id, review.clone());
        Ok(())
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<ReviewRequest>, StoreError> {
        Ok(self.reviews.read().await.get(&id).cloned())
    }

    async fn resolve_review(
        &self,
        id: Uuid,
        resolution: Resolution,
    ) -> Result<ReviewRequest, StoreError> {
        let mut reviews = self.reviews.write().await;
        let review = reviews.get_mut(&id).ok_or(StoreError::ReviewNotFound(id))?;
        if review.resolution.is_some() {
            return Err(StoreError::AlreadyResolved(id));
        }
        review.resolution = Some(resolution);
        Ok(review.clone())
    }

    async fn reviews_pending_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, StoreError> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .values()
            .filter(|r| r.resolution.is_none() && r.deadline <= deadline)
            .cloned()
            .collect())
    }

    async fn pending_reviews(
        &self,
        reviewer_id: Option<&str>,
    ) -> Result<Vec<ReviewRequest>, StoreError> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .values()
            .filter(|r| r.resolution.is_none())
            .filter(|r| match reviewer_id {
                Some(reviewer) => r.reviewer_id.as_deref() == Some(reviewer),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn workflows_by_owner(&self, owner_id: &str) -> Result<Vec<Workflow>, StoreError> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .values()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
