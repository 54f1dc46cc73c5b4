use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::types::CollectedData;

/// Decision submitted by a human reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
    Modify,
    RequestMoreInfo,
}

/// Terminal action recorded in a resolution. Superset of `ReviewDecision`:
/// `Timeout` is produced only by the watchdog and `Cancelled` only by
/// workflow cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Approve,
    Reject,
    Modify,
    RequestMoreInfo,
    Timeout,
    Cancelled,
}

impl From<ReviewDecision> for ResolutionAction {
    fn from(decision: ReviewDecision) -> Self {
        match decision {
            ReviewDecision::Approve => ResolutionAction::Approve,
            ReviewDecision::Reject => ResolutionAction::Reject,
            ReviewDecision::Modify => ResolutionAction::Modify,
            ReviewDecision::RequestMoreInfo => ResolutionAction::RequestMoreInfo,
        }
    }
}

/// Write-once outcome closing a review request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub action: ResolutionAction,
    pub modified_data: Option<CollectedData>,
    pub comments: Option<String>,
    pub resolver_id: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

impl Resolution {
    /// Resolution produced by the system rather than a reviewer.
    pub fn synthetic(action: ResolutionAction) -> Self {
        Self {
            action,
            modified_data: None,
            comments: None,
            resolver_id: None,
            resolved_at: Utc::now(),
        }
    }
}

/// A pending request for human review of one workflow checkpoint.
///
/// Mutated exactly once, by either a reviewer or the timeout watchdog;
/// immutable thereafter. The workflow owns the relation (it holds this id in
/// its review queue); `workflow_id` here is a back-reference for lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_name: String,
    pub description: String,
    /// Collected data as it stood when the checkpoint was raised.
    pub data_snapshot: CollectedData,
    pub suggestion: Option<String>,
    /// `None` means any reviewer may pick it up.
    pub reviewer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub resolution: Option<Resolution>,
}

impl ReviewRequest {
    pub fn new(
        workflow_id: Uuid,
        step_name: String,
        description: String,
        data_snapshot: CollectedData,
        suggestion: Option<String>,
        reviewer_id: Option<String>,
        timeout_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            step_name,
            description,
            data_snapshot,
            suggestion,
            reviewer_id,
            created_at: now,
            deadline: saturating_deadline(now, timeout_seconds),
            resolution: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.resolution.is_none() && self.deadline <= now
    }
}

/// `now + timeout_seconds`, saturating at the representable range instead of
/// panicking on absurd caller-supplied timeouts.
fn saturating_deadline(now: DateTime<Utc>, timeout_seconds: i64) -> DateTime<Utc> {
    match Duration::try_seconds(timeout_seconds).and_then(|d| now.checked_add_signed(d)) {
        Some(deadline) => deadline,
        None if timeout_seconds < 0 => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::CollectedData;

    fn request(timeout_seconds: i64) -> ReviewRequest {
        ReviewRequest::new(
            Uuid::new_v4(),
            "financial_verification".to_string(),
            "verify declared income".to_string(),
            CollectedData::new(),
            None,
            None,
            timeout_seconds,
        )
    }

    #[test]
    fn deadline_is_armed_relative_to_creation() {
        let review = request(1800);
        assert_eq!((review.deadline - review.created_at).num_seconds(), 1800);
        assert!(!review.is_overdue(review.created_at));
        assert!(review.is_overdue(review.deadline));
    }

    #[test]
    fn extreme_timeouts_saturate_instead_of_panicking() {
        let far_future = request(i64::MAX);
        assert_eq!(far_future.deadline, DateTime::<Utc>::MAX_UTC);
        assert!(!far_future.is_overdue(Utc::now()));

        let far_past = request(i64::MIN);
        assert_eq!(far_past.deadline, DateTime::<Utc>::MIN_UTC);
        assert!(far_past.is_overdue(Utc::now()));
    }

    #[test]
    fn resolved_review_is_never_overdue() {
        let mut review = request(-5);
        assert!(review.is_overdue(Utc::now()));
        review.resolution = Some(Resolution::synthetic(ResolutionAction::Timeout));
        assert!(!review.is_overdue(Utc::now()));
    }
}
