//! SQLite store semantics: the conditional writes must match the in-memory
//! store exactly, since the engine relies on them for its concurrency
//! guarantees. Run with `--features database`.

#![cfg(feature = "database")]

use chrono::{Duration, Utc};
use greenlight::{
    CollectedData, ExecutionMode, Resolution, ResolutionAction, ReviewRequest, SqliteStore,
    StateStore, StoreError, Workflow, WorkflowSpec,
};
use tempfile::TempDir;
use uuid::Uuid;

async fn open_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}/greenlight.db", dir.path().display());
    let store = SqliteStore::new(&url, true).await.unwrap();
    (dir, store)
}

fn workflow() -> Workflow {
    Workflow::new(WorkflowSpec {
        owner_id: "owner-1".to_string(),
        steps: vec!["collect".to_string()],
        reviewer_id: None,
        initial_data: CollectedData::new(),
        execution_mode: ExecutionMode::Blocking,
    })
}

fn review(workflow_id: Uuid, deadline_offset: Duration) -> ReviewRequest {
    ReviewRequest::new(
        workflow_id,
        "collect".to_string(),
        "check the numbers".to_string(),
        CollectedData::new(),
        None,
        Some("reviewer-1".to_string()),
        deadline_offset.num_seconds(),
    )
}

#[tokio::test]
async fn workflow_round_trips_and_rejects_stale_writes() {
    let (_dir, store) = open_store().await;
    let mut first = workflow();

    first.version = store.put_workflow(&first).await.unwrap();
    assert_eq!(first.version, 1);

    let stored = store.get_workflow(first.id).await.unwrap().unwrap();
    assert_eq!(stored.id, first.id);
    assert_eq!(stored.version, 1);

    let mut stale = first.clone();
    stale.version = 0;
    let err = store.put_workflow(&stale).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { found: 1, .. }));

    first.version = store.put_workflow(&first).await.unwrap();
    assert_eq!(first.version, 2);
}

#[tokio::test]
async fn resolution_write_is_once_only() {
    let (_dir, store) = open_store().await;
    let review = review(Uuid::new_v4(), Duration::seconds(60));
    store.insert_review(&review).await.unwrap();

    let resolved = store
        .resolve_review(review.id, Resolution::synthetic(ResolutionAction::Timeout))
        .await
        .unwrap();
    assert_eq!(
        resolved.resolution.as_ref().unwrap().action,
        ResolutionAction::Timeout
    );

    let err = store
        .resolve_review(review.id, Resolution::synthetic(ResolutionAction::Cancelled))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyResolved(_)));

    let stored = store.get_review(review.id).await.unwrap().unwrap();
    assert_eq!(stored.resolution.unwrap().action, ResolutionAction::Timeout);
}

#[tokio::test]
async fn pending_queries_survive_a_reopen() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}/greenlight.db", dir.path().display());

    let overdue = review(Uuid::new_v4(), Duration::seconds(-5));
    let fresh = review(Uuid::new_v4(), Duration::seconds(300));
    {
        let store = SqliteStore::new(&url, true).await.unwrap();
        store.insert_review(&overdue).await.unwrap();
        store.insert_review(&fresh).await.unwrap();
        store.shutdown().await;
    }

    let store = SqliteStore::new(&url, true).await.unwrap();
    let past_due = store.reviews_pending_before(Utc::now()).await.unwrap();
    assert_eq!(past_due.len(), 1);
    assert_eq!(past_due[0].id, overdue.id);

    let mine = store.pending_reviews(Some("reviewer-1")).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(store
        .pending_reviews(Some("reviewer-2"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn owner_listing_spans_workflows() {
    let (_dir, store) = open_store().await;
    let a = workflow();
    let b = workflow();
    store.put_workflow(&a).await.unwrap();
    store.put_workflow(&b).await.unwrap();

    let owned = store.workflows_by_owner("owner-1").await.unwrap();
    assert_eq!(owned.len(), 2);
    assert!(store.workflows_by_owner("nobody").await.unwrap().is_empty());
}
