//! Timeout watchdog: force-fails workflows whose review blew its deadline.
//!
//! Runs as a single periodic task scanning the store for unresolved reviews
//! past deadline. Safe to run concurrently with reviewer-submitted resolves
//! on the same review: the write-once resolution guard means exactly one of
//! the two wins, and the watchdog treats losing as a no-op.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::ExecutionEngine;
use crate::review::registry::ReviewError;
use crate::store::StateStore;

pub struct TimeoutWatchdog {
    store: Arc<dyn StateStore>,
    engine: Arc<ExecutionEngine>,
    interval: Duration,
}

/// Handle to a spawned watchdog; dropping it does not stop the task, call
/// [`WatchdogHandle::shutdown`].
pub struct WatchdogHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl WatchdogHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

impl TimeoutWatchdog {
    pub fn new(store: Arc<dyn StateStore>, engine: Arc<ExecutionEngine>) -> Self {
        Self {
            store,
            engine,
            interval: Duration::from_secs(5),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the scan loop on its own task.
    pub fn spawn(self) -> WatchdogHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "timeout watchdog started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.scan_once().await;
                    }
                    _ = shutdown_rx.changed() => {
                        info!("timeout watchdog stopping");
                        break;
                    }
                }
            }
        });
        WatchdogHandle {
            shutdown_tx,
            handle,
        }
    }

    /// One pass over the overdue reviews. Returns how many workflows were
    /// force-failed. A failure on one review never aborts the rest of the
    /// scan.
    pub async fn scan_once(&self) -> usize {
        let overdue = match self.store.reviews_pending_before(Utc::now()).await {
            Ok(reviews) => reviews,
            Err(err) => {
                error!(error = %err, "watchdog scan query failed");
                return 0;
            }
        };

        let mut expired = 0;
        for review in overdue {
            match self.engine.registry().expire(review.id).await {
                Ok(_) => {
                    warn!(
                        review_id = %review.id,
                        workflow_id = %review.workflow_id,
                        deadline = %review.deadline,
                        "review deadline exceeded; failing workflow"
                    );
                    match self
                        .engine
                        .fail_for_timeout(review.workflow_id, review.id)
                        .await
                    {
                        Ok(()) => expired += 1,
                        Err(err) => {
                            error!(
                                review_id = %review.id,
                                workflow_id = %review.workflow_id,
                                error = %err,
                                "failed to mark workflow as timed out"
                            );
                        }
                    }
                }
                Err(ReviewError::AlreadyResolved(_)) => {
                    // A reviewer beat us to it between the query and the
                    // conditional write.
                    debug!(review_id = %review.id, "review resolved before expiry; skipping");
                }
                Err(err) => {
                    error!(review_id = %review.id, error = %err, "failed to expire review");
                }
            }
        }
        expired
    }
}
