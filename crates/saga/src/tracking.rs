//! Shipment tracking loop: polls carrier status until a terminal tracking
//! state or the attempt budget is reached.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationGate;
use crate::collaborators::{ShippingService, TrackingStatus};
use crate::executor::{StepKind, StepOutcome, execute_step};
use crate::retry::RetryPolicy;

/// Outcome of a completed tracking loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingOutcome {
    /// The carrier confirmed delivery.
    Delivered,

    /// The carrier reported a problem it will not recover from.
    Exception { reason: String },

    /// The attempt budget ran out before a terminal carrier status.
    StillInTransit { last_status: TrackingStatus },

    /// Cancellation was observed between polls; no further polls issued.
    Cancelled { last_status: TrackingStatus },
}

/// Last observed tracking state, queryable at any point during polling.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackingSnapshot {
    /// Last known carrier status.
    pub status: TrackingStatus,

    /// Last known location, if any.
    pub location: Option<String>,

    /// When the status was observed.
    pub observed_at: Option<DateTime<Utc>>,

    /// Poll attempts made so far.
    pub attempts: u32,
}

/// Polls carrier tracking for one shipment.
///
/// Usable standalone or embedded in the order saga; live status is
/// published through [`ShipmentTracker::snapshot`] while the loop runs.
#[derive(Debug, Clone, Default)]
pub struct ShipmentTracker {
    snapshot: Arc<RwLock<TrackingSnapshot>>,
}

impl ShipmentTracker {
    /// Creates a new tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last observed tracking state.
    pub fn snapshot(&self) -> TrackingSnapshot {
        self.snapshot.read().unwrap().clone()
    }

    /// Polls the carrier until delivery, an exception, or `max_attempts`
    /// polls have been made, sleeping `poll_interval` before each one.
    ///
    /// The gate is observed before every poll: a cancellation signaled
    /// while the loop sleeps stops polling without issuing another
    /// carrier call. A poll whose collaborator call fails even after
    /// retries is logged and skipped; polling continues with the next
    /// attempt.
    #[tracing::instrument(skip(self, shipping, gate))]
    pub async fn track<S: ShippingService>(
        &self,
        shipping: &S,
        tracking_number: &str,
        max_attempts: u32,
        poll_interval: Duration,
        gate: &CancellationGate,
    ) -> TrackingOutcome {
        let mut last_status = TrackingStatus::Processing;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(poll_interval).await;

            if gate.is_cancelled() {
                tracing::info!(tracking_number, attempt, "cancellation observed, halting polling");
                return TrackingOutcome::Cancelled { last_status };
            }

            let outcome = execute_step(StepKind::TrackShipment, &RetryPolicy::shipping(), || {
                shipping.track_shipment(tracking_number)
            })
            .await;

            let update = match outcome {
                StepOutcome::Success(update) => update,
                StepOutcome::RetryableFailure(reason) | StepOutcome::TerminalFailure(reason) => {
                    tracing::warn!(tracking_number, attempt, reason, "tracking poll failed");
                    self.bump_attempts();
                    continue;
                }
            };

            tracing::info!(
                tracking_number,
                attempt,
                status = %update.status,
                location = update.location.as_deref().unwrap_or("unknown"),
                "tracking update"
            );
            last_status = update.status;

            {
                let mut snapshot = self.snapshot.write().unwrap();
                snapshot.status = update.status;
                snapshot.location = update.location.clone();
                snapshot.observed_at = Some(update.timestamp);
                snapshot.attempts = attempt;
            }

            match update.status {
                TrackingStatus::Delivered => return TrackingOutcome::Delivered,
                TrackingStatus::Exception => {
                    let reason = match update.location {
                        Some(location) => {
                            format!("carrier reported an exception at {}", location)
                        }
                        None => "carrier reported an exception".to_string(),
                    };
                    return TrackingOutcome::Exception { reason };
                }
                _ => {}
            }
        }

        TrackingOutcome::StillInTransit { last_status }
    }

    fn bump_attempts(&self) {
        self.snapshot.write().unwrap().attempts += 1;
    }
}
