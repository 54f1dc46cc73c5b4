//! Blocking-mode scenarios: the caller gets the workflow back only once it
//! pauses for a human or reaches a terminal state.

mod common;

use common::{assert_pause_invariant, build_engine, checkpoint, emit, spec};
use greenlight::{
    BlockingRunner, CollectedData, ExecutionMode, ReviewDecision, StepError, WorkflowStatus,
};
use serde_json::json;

#[tokio::test]
async fn workflow_without_checkpoints_completes_synchronously() {
    let (_store, engine) = build_engine(Box::new(|step, _data| match step {
        "collect" => emit("name", json!("Jordan")),
        "summarize" => emit("summary", json!("done")),
        other => Err(StepError::new(format!("unexpected step {other}"))),
    }));
    let runner = BlockingRunner::new(engine.clone());

    let workflow = runner
        .run(spec(&["collect", "summarize"], ExecutionMode::Blocking))
        .await
        .unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert!(workflow.review_queue.is_empty());
    assert!(workflow.completed_at.is_some());
    assert_eq!(workflow.collected_data["name"], json!("Jordan"));
    assert_eq!(workflow.collected_data["summary"], json!("done"));
    assert!(engine.registry().list_pending(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn checkpoint_pauses_and_approve_resumes_to_completion() {
    let (_store, engine) = build_engine(Box::new(|step, _data| match step {
        "collect" => emit("loan_amount", json!(500_000)),
        "financial_verification" => checkpoint("financial_verification", None),
        "finalize" => emit("approved", json!(true)),
        other => Err(StepError::new(format!("unexpected step {other}"))),
    }));
    let runner = BlockingRunner::new(engine.clone());

    let paused = runner
        .run(spec(
            &["collect", "financial_verification", "finalize"],
            ExecutionMode::Blocking,
        ))
        .await
        .unwrap();
    assert_eq!(paused.status, WorkflowStatus::PausedForHuman);
    assert_pause_invariant(&paused);
    assert_eq!(paused.current_step.as_deref(), Some("financial_verification"));

    let review_id = paused.outstanding_review().unwrap();
    let review = engine.registry().get(review_id).await.unwrap();
    assert_eq!(review.step_name, "financial_verification");
    // Snapshot reflects the data at checkpoint time.
    assert_eq!(review.data_snapshot["loan_amount"], json!(500_000));

    let finished = runner
        .resume(
            review_id,
            ReviewDecision::Approve,
            None,
            None,
            Some("reviewer-1".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(finished.status, WorkflowStatus::Completed);
    assert_pause_invariant(&finished);
    assert_eq!(finished.collected_data["approved"], json!(true));
    // Approve resumes with pre-checkpoint data unchanged.
    assert_eq!(finished.collected_data["loan_amount"], json!(500_000));
}

#[tokio::test]
async fn modify_resolution_injects_reviewer_data_before_resume() {
    let (_store, engine) = build_engine(Box::new(|step, _data| match step {
        "financial_verification" => checkpoint("financial_verification", None),
        "finalize" => emit("done", json!(true)),
        other => Err(StepError::new(format!("unexpected step {other}"))),
    }));
    let runner = BlockingRunner::new(engine);

    let paused = runner
        .run(spec(
            &["financial_verification", "finalize"],
            ExecutionMode::Blocking,
        ))
        .await
        .unwrap();
    assert!(!paused.collected_data.contains_key("annual_income"));

    let mut modified = CollectedData::new();
    modified.insert("annual_income".to_string(), json!(75_000));
    let finished = runner
        .resume(
            paused.outstanding_review().unwrap(),
            ReviewDecision::Modify,
            Some(modified),
            Some("verified against payslips".to_string()),
            Some("reviewer-1".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(finished.status, WorkflowStatus::Completed);
    assert_eq!(finished.collected_data["annual_income"], json!(75_000));
    assert!(finished.reviewed_keys.contains("annual_income"));
}

#[tokio::test]
async fn reject_resolution_fails_the_workflow() {
    let (_store, engine) = build_engine(Box::new(|step, _data| match step {
        "financial_verification" => checkpoint("financial_verification", None),
        other => Err(StepError::new(format!("unexpected step {other}"))),
    }));
    let runner = BlockingRunner::new(engine);

    let paused = runner
        .run(spec(&["financial_verification"], ExecutionMode::Blocking))
        .await
        .unwrap();

    let failed = runner
        .resume(
            paused.outstanding_review().unwrap(),
            ReviewDecision::Reject,
            None,
            Some("income could not be verified".to_string()),
            Some("reviewer-1".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(failed.status, WorkflowStatus::Failed);
    let message = failed.error_message.clone().unwrap();
    assert!(message.contains("rejected by reviewer"), "got: {message}");
    assert_pause_invariant(&failed);
}

#[tokio::test]
async fn step_failure_is_captured_not_propagated() {
    let (_store, engine) = build_engine(Box::new(|step, _data| match step {
        "collect" => emit("ok", json!(1)),
        "explode" => Err(StepError::new("upstream service unavailable")),
        other => Err(StepError::new(format!("unexpected step {other}"))),
    }));
    let runner = BlockingRunner::new(engine);

    let workflow = runner
        .run(spec(&["collect", "explode"], ExecutionMode::Blocking))
        .await
        .unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Failed);
    let message = workflow.error_message.unwrap();
    assert!(message.contains("explode"), "got: {message}");
    assert!(message.contains("upstream service unavailable"), "got: {message}");
}

#[tokio::test]
async fn request_more_info_keeps_workflow_paused_then_rearms_on_advance() {
    let (_store, engine) = build_engine(Box::new(|step, _data| match step {
        "financial_verification" => checkpoint("financial_verification", Some(600)),
        "finalize" => emit("done", json!(true)),
        other => Err(StepError::new(format!("unexpected step {other}"))),
    }));
    let runner = BlockingRunner::new(engine.clone());

    let paused = runner
        .run(spec(
            &["financial_verification", "finalize"],
            ExecutionMode::Blocking,
        ))
        .await
        .unwrap();
    let first_review = paused.outstanding_review().unwrap();
    let first_deadline = engine.registry().get(first_review).await.unwrap().deadline;

    let still_paused = runner
        .resume(
            first_review,
            ReviewDecision::RequestMoreInfo,
            None,
            Some("please attach bank statements".to_string()),
            Some("reviewer-1".to_string()),
        )
        .await
        .unwrap();
    // Deliberately no resume: the workflow waits for a follow-up checkpoint.
    assert_eq!(still_paused.status, WorkflowStatus::PausedForHuman);
    assert!(still_paused.review_queue.is_empty());

    // The next advance re-runs the checkpoint step and arms a fresh review.
    let mut workflow = engine.status(still_paused.id).await.unwrap();
    engine.advance(&mut workflow).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::PausedForHuman);
    assert_pause_invariant(&workflow);

    let second_review = workflow.outstanding_review().unwrap();
    assert_ne!(second_review, first_review);
    let second_deadline = engine.registry().get(second_review).await.unwrap().deadline;
    assert!(second_deadline >= first_deadline);
}

#[tokio::test]
async fn cancel_resolves_outstanding_review_and_terminates() {
    let (_store, engine) = build_engine(Box::new(|step, _data| match step {
        "financial_verification" => checkpoint("financial_verification", None),
        other => Err(StepError::new(format!("unexpected step {other}"))),
    }));
    let runner = BlockingRunner::new(engine.clone());

    let paused = runner
        .run(spec(&["financial_verification"], ExecutionMode::Blocking))
        .await
        .unwrap();
    let review_id = paused.outstanding_review().unwrap();

    let cancelled = engine.cancel(paused.id).await.unwrap();
    assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
    assert_pause_invariant(&cancelled);

    let review = engine.registry().get(review_id).await.unwrap();
    assert_eq!(
        review.resolution.unwrap().action,
        greenlight::ResolutionAction::Cancelled
    );
    // Nothing left for a reviewer to act on.
    assert!(engine.registry().list_pending(None).await.unwrap().is_empty());

    // A second cancel is a caller error on a terminal workflow.
    let err = engine.cancel(cancelled.id).await.unwrap_err();
    assert!(matches!(
        err,
        greenlight::EngineError::Transition(greenlight::TransitionError::AlreadyTerminal { .. })
    ));
}
