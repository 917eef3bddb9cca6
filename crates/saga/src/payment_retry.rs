//! Standalone payment retry loop with exponential backoff.
//!
//! Used when payment must be re-attempted out-of-band of the main saga,
//! e.g. for an order left in `PaymentFailed`. Independent of
//! [`crate::OrderSaga`]; guards against racing with a saga that already
//! completed or cancelled the same order by re-reading the order before
//! every attempt.

use std::time::Duration;

use domain::{OrderId, OrderStatus};

use crate::collaborators::{NotificationService, OrderRepository, PaymentService};
use crate::executor::{StepKind, StepOutcome, execute_step};
use crate::retry::RetryPolicy;

/// Outcome of a payment retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRetryOutcome {
    /// A retry attempt completed the charge.
    Succeeded { transaction_id: String },

    /// The order was already paid when the loop looked; no attempt made.
    AlreadyCompleted { transaction_id: Option<String> },

    /// The order was cancelled; no further attempts.
    OrderCancelled,

    /// No order exists with the given ID.
    OrderNotFound,

    /// Every allowed attempt failed; the order is now `PaymentFailed`.
    Exhausted { attempts: u32 },

    /// The repository could not be reached even after retries.
    Aborted { reason: String },
}

impl PaymentRetryOutcome {
    /// Returns true if the order ends up paid.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PaymentRetryOutcome::Succeeded { .. } | PaymentRetryOutcome::AlreadyCompleted { .. }
        )
    }
}

/// Re-attempts payment for an order up to `max_retries` times.
///
/// The delay between attempts doubles each retry, starting at
/// `initial_delay`; there is no delay before the first attempt. The
/// current order status is re-read before every attempt so the loop
/// short-circuits if a concurrent saga already paid or cancelled the
/// order. When the budget is exhausted this loop owns the transition to
/// `PaymentFailed`.
#[tracing::instrument(skip(repository, payment, notifier))]
pub async fn retry_payment<R, P, N>(
    repository: &R,
    payment: &P,
    notifier: &N,
    order_id: OrderId,
    max_retries: u32,
    initial_delay: Duration,
) -> PaymentRetryOutcome
where
    R: OrderRepository,
    P: PaymentService,
    N: NotificationService,
{
    metrics::counter!("payment_retry_runs_total").increment(1);
    let mut delay = initial_delay;

    for attempt in 1..=max_retries {
        let fetched = execute_step(StepKind::FetchOrder, &RetryPolicy::database(), || {
            repository.fetch_order(order_id)
        })
        .await;

        let order = match fetched {
            StepOutcome::Success(Some(order)) => order,
            StepOutcome::Success(None) => return PaymentRetryOutcome::OrderNotFound,
            StepOutcome::RetryableFailure(reason) | StepOutcome::TerminalFailure(reason) => {
                tracing::error!(%order_id, reason, "payment retry aborted, repository unreachable");
                return PaymentRetryOutcome::Aborted { reason };
            }
        };

        match order.status() {
            OrderStatus::PaymentCompleted => {
                tracing::info!(%order_id, "payment already completed, skipping retries");
                return PaymentRetryOutcome::AlreadyCompleted {
                    transaction_id: order.payment_info().transaction_id.clone(),
                };
            }
            OrderStatus::Cancelled => {
                tracing::info!(%order_id, "order cancelled, skipping retries");
                return PaymentRetryOutcome::OrderCancelled;
            }
            _ => {}
        }

        if attempt > 1 {
            tracing::info!(%order_id, attempt, delay_ms = delay.as_millis() as u64, "waiting before payment retry");
            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        metrics::counter!("payment_retry_attempts_total").increment(1);
        match payment.process_payment(&order).await {
            Ok(receipt) => {
                tracing::info!(%order_id, attempt, transaction_id = %receipt.transaction_id, "payment retry succeeded");

                let updated = execute_step(StepKind::UpdateStatus, &RetryPolicy::database(), || {
                    repository.update_order_status(order_id, OrderStatus::PaymentCompleted)
                })
                .await;
                if let Some(reason) = updated.failure_reason() {
                    tracing::warn!(%order_id, reason, "failed to record payment completion");
                }

                notify_payment_completed(repository, notifier, &order).await;

                return PaymentRetryOutcome::Succeeded {
                    transaction_id: receipt.transaction_id,
                };
            }
            Err(err) => {
                tracing::warn!(%order_id, attempt, reason = %err.message, "payment retry attempt failed");
            }
        }
    }

    tracing::warn!(%order_id, max_retries, "all payment retries failed");
    metrics::counter!("payment_retry_exhausted_total").increment(1);

    let updated = execute_step(StepKind::UpdateStatus, &RetryPolicy::database(), || {
        repository.update_order_status(order_id, OrderStatus::PaymentFailed)
    })
    .await;
    if let Some(reason) = updated.failure_reason() {
        tracing::warn!(%order_id, reason, "failed to record payment failure");
    }

    PaymentRetryOutcome::Exhausted {
        attempts: max_retries,
    }
}

/// Best-effort confirmation email after a successful retry.
async fn notify_payment_completed<R, N>(repository: &R, notifier: &N, order: &domain::Order)
where
    R: OrderRepository,
    N: NotificationService,
{
    let fetched = execute_step(StepKind::FetchCustomer, &RetryPolicy::database(), || {
        repository.fetch_customer(order.customer_id())
    })
    .await;

    if let StepOutcome::Success(Some(customer)) = fetched {
        let sent = execute_step(
            StepKind::SendConfirmation,
            &RetryPolicy::notification(),
            || notifier.send_order_confirmation(order, &customer.email),
        )
        .await;
        if let Some(reason) = sent.failure_reason() {
            tracing::warn!(order_id = %order.id(), reason, "confirmation email not sent");
        }
    }
}
