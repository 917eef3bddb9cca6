//! Step executor: one unit of work with a bounded-retry policy.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::retry::{RetryPolicy, StepError};

/// Every forward and compensating step the saga can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    PersistOrder,
    FetchOrder,
    FetchCustomer,
    CheckInventory,
    ReserveInventory,
    ProcessPayment,
    GenerateReceipt,
    SendConfirmation,
    CreateShipment,
    SendShippingConfirmation,
    TrackShipment,
    UpdateStatus,
    ReleaseInventory,
    RefundPayment,
}

impl StepKind {
    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::PersistOrder => "persist_order",
            StepKind::FetchOrder => "fetch_order",
            StepKind::FetchCustomer => "fetch_customer",
            StepKind::CheckInventory => "check_inventory",
            StepKind::ReserveInventory => "reserve_inventory",
            StepKind::ProcessPayment => "process_payment",
            StepKind::GenerateReceipt => "generate_receipt",
            StepKind::SendConfirmation => "send_confirmation",
            StepKind::CreateShipment => "create_shipment",
            StepKind::SendShippingConfirmation => "send_shipping_confirmation",
            StepKind::TrackShipment => "track_shipment",
            StepKind::UpdateStatus => "update_status",
            StepKind::ReleaseInventory => "release_inventory",
            StepKind::RefundPayment => "refund_payment",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The outcome of executing one step.
///
/// `RetryableFailure` is the per-attempt classification; [`execute_step`]
/// consumes it internally and only ever returns `Success` or
/// `TerminalFailure` (carrying the last attempt's reason once the policy
/// is exhausted).
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    /// The step succeeded with a payload.
    Success(T),

    /// The attempt failed transiently and may be re-attempted.
    RetryableFailure(String),

    /// The step cannot succeed: a business-rule failure, or the retry
    /// budget was exhausted.
    TerminalFailure(String),
}

impl<T> StepOutcome<T> {
    /// Returns true if the step succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }

    /// Returns the success payload, if any.
    pub fn success(self) -> Option<T> {
        match self {
            StepOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the failure reason, if the step failed.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            StepOutcome::Success(_) => None,
            StepOutcome::RetryableFailure(reason) | StepOutcome::TerminalFailure(reason) => {
                Some(reason)
            }
        }
    }

    /// Maps the success payload, preserving failures.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StepOutcome<U> {
        match self {
            StepOutcome::Success(value) => StepOutcome::Success(f(value)),
            StepOutcome::RetryableFailure(reason) => StepOutcome::RetryableFailure(reason),
            StepOutcome::TerminalFailure(reason) => StepOutcome::TerminalFailure(reason),
        }
    }

    /// Classifies a single collaborator result without applying a policy.
    pub fn from_attempt(result: Result<T, StepError>) -> Self {
        match result {
            Ok(value) => StepOutcome::Success(value),
            Err(err) if err.is_terminal() => StepOutcome::TerminalFailure(err.message),
            Err(err) => StepOutcome::RetryableFailure(err.message),
        }
    }
}

/// Executes one step against a collaborator under the given retry policy.
///
/// `call` issues exactly one collaborator call per invocation. Terminal
/// failures short-circuit; retryable failures are re-attempted after an
/// exponential backoff delay until the policy's attempt budget is spent,
/// at which point the last reason is surfaced as a `TerminalFailure`.
/// The executor decides nothing beyond the outcome of this one step.
pub async fn execute_step<T, F, Fut>(
    step: StepKind,
    policy: &RetryPolicy,
    mut call: F,
) -> StepOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StepError>>,
{
    let mut attempt: u32 = 1;
    loop {
        metrics::counter!("step_attempts_total").increment(1);
        match call().await {
            Ok(value) => return StepOutcome::Success(value),
            Err(err) if err.is_terminal() => {
                tracing::warn!(step = %step, attempt, reason = %err.message, "step failed terminally");
                return StepOutcome::TerminalFailure(err.message);
            }
            Err(err) => {
                tracing::warn!(step = %step, attempt, reason = %err.message, "step attempt failed");
                if attempt >= policy.max_attempts {
                    metrics::counter!("step_retries_exhausted_total").increment(1);
                    return StepOutcome::TerminalFailure(err.message);
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}
