//! Compensation log: records completed steps that must be undone and
//! unwinds them in reverse order.

use domain::{Money, OrderId, OrderItem};
use serde::{Deserialize, Serialize};

use crate::collaborators::{InventoryService, PaymentService};
use crate::executor::{StepKind, StepOutcome, execute_step};
use crate::retry::RetryPolicy;

/// A completed forward step and the data needed to undo it.
///
/// An entry is appended only after the corresponding forward step
/// succeeded, so the log compensates exactly what was done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompensationEntry {
    /// Inventory was reserved for these items.
    InventoryReservation { items: Vec<OrderItem> },

    /// A charge was completed.
    Payment {
        transaction_id: String,
        amount: Money,
    },
}

impl CompensationEntry {
    /// Returns the compensating step this entry maps to.
    pub fn step(&self) -> StepKind {
        match self {
            CompensationEntry::InventoryReservation { .. } => StepKind::ReleaseInventory,
            CompensationEntry::Payment { .. } => StepKind::RefundPayment,
        }
    }
}

/// The result of one compensating action.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationOutcome {
    /// Which compensating step ran.
    pub step: StepKind,

    /// How it went. Failures do not stop the rest of the unwind.
    pub outcome: StepOutcome<()>,
}

impl CompensationOutcome {
    /// Returns true if the compensating action succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Append-only log of compensation entries, consumed LIFO during rollback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompensationLog {
    entries: Vec<CompensationEntry>,
}

impl CompensationLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed forward step.
    pub fn record(&mut self, entry: CompensationEntry) {
        self.entries.push(entry);
    }

    /// Returns the recorded entries, oldest first.
    pub fn entries(&self) -> &[CompensationEntry] {
        &self.entries
    }

    /// Returns true if nothing needs compensating.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Unwinds every recorded entry, newest first, draining the log.
    ///
    /// A failing compensating action is reported and the unwind continues:
    /// leaving later reservations undone because an earlier refund failed
    /// would be worse than a partially incomplete rollback. Outcomes are
    /// returned in execution (LIFO) order.
    pub async fn compensate_all<I, P>(
        &mut self,
        inventory: &I,
        payment: &P,
        order_id: OrderId,
    ) -> Vec<CompensationOutcome>
    where
        I: InventoryService,
        P: PaymentService,
    {
        let entries = std::mem::take(&mut self.entries);
        let mut outcomes = Vec::with_capacity(entries.len());

        for entry in entries.iter().rev() {
            let step = entry.step();
            metrics::counter!("compensation_actions_total").increment(1);

            let outcome = match entry {
                CompensationEntry::InventoryReservation { items } => {
                    execute_step(step, &RetryPolicy::inventory(), || {
                        inventory.release_inventory(items)
                    })
                    .await
                }
                CompensationEntry::Payment {
                    transaction_id,
                    amount,
                } => execute_step(step, &RetryPolicy::payment(), || {
                    payment.refund_payment(order_id, transaction_id, *amount)
                })
                .await
                .map(|_| ()),
            };

            if let Some(reason) = outcome.failure_reason() {
                metrics::counter!("compensation_failures_total").increment(1);
                tracing::warn!(%order_id, step = %step, reason, "compensation step failed, continuing unwind");
            }

            outcomes.push(CompensationOutcome { step, outcome });
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryInventoryService, InMemoryPaymentService};

    fn sample_items() -> Vec<OrderItem> {
        vec![OrderItem::new("prod-001", "Widget", 2, Money::from_cents(1000))]
    }

    #[test]
    fn test_record_preserves_order() {
        let mut log = CompensationLog::new();
        assert!(log.is_empty());

        log.record(CompensationEntry::InventoryReservation {
            items: sample_items(),
        });
        log.record(CompensationEntry::Payment {
            transaction_id: "TXN-0001".to_string(),
            amount: Money::from_cents(2000),
        });

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].step(), StepKind::ReleaseInventory);
        assert_eq!(log.entries()[1].step(), StepKind::RefundPayment);
    }

    #[tokio::test]
    async fn test_compensate_all_runs_lifo() {
        let inventory = InMemoryInventoryService::new();
        let payment = InMemoryPaymentService::new();
        let order_id = OrderId::new();

        let mut log = CompensationLog::new();
        log.record(CompensationEntry::InventoryReservation {
            items: sample_items(),
        });
        log.record(CompensationEntry::Payment {
            transaction_id: "TXN-0001".to_string(),
            amount: Money::from_cents(2000),
        });

        let outcomes = log.compensate_all(&inventory, &payment, order_id).await;

        // Payment was recorded last, so it is refunded first.
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].step, StepKind::RefundPayment);
        assert_eq!(outcomes[1].step, StepKind::ReleaseInventory);
        assert!(outcomes.iter().all(|o| o.is_success()));

        assert_eq!(payment.refund_call_count(), 1);
        assert_eq!(inventory.release_call_count(), 1);
        assert!(log.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_compensation_does_not_stop_unwind() {
        let inventory = InMemoryInventoryService::new();
        inventory.reserve_inventory(&sample_items()).await.unwrap();
        let payment = InMemoryPaymentService::new();
        payment.set_fail_on_refund(true);
        let order_id = OrderId::new();

        let mut log = CompensationLog::new();
        log.record(CompensationEntry::InventoryReservation {
            items: sample_items(),
        });
        log.record(CompensationEntry::Payment {
            transaction_id: "TXN-0001".to_string(),
            amount: Money::from_cents(2000),
        });

        let outcomes = log.compensate_all(&inventory, &payment, order_id).await;

        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());
        // Inventory was still released despite the refund failure.
        assert_eq!(inventory.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_log_compensates_nothing() {
        let inventory = InMemoryInventoryService::new();
        let payment = InMemoryPaymentService::new();

        let mut log = CompensationLog::new();
        let outcomes = log
            .compensate_all(&inventory, &payment, OrderId::new())
            .await;

        assert!(outcomes.is_empty());
        assert_eq!(inventory.release_call_count(), 0);
        assert_eq!(payment.refund_call_count(), 0);
    }
}
