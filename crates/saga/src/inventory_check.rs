//! Standalone inventory check: sweeps a product list and alerts an
//! administrator about items that are out of stock.
//!
//! Runs outside any order saga, typically on a schedule. The alert is
//! delivered as a synthetic zero-value order listing the unavailable
//! products, so it reuses the regular notification channel.

use domain::{Address, CustomerId, Money, Order, OrderItem, PaymentMethod, ProductId};

use crate::collaborators::{InventoryService, NotificationService};
use crate::executor::{StepKind, StepOutcome, execute_step};
use crate::retry::RetryPolicy;

/// Outcome of one inventory sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCheckOutcome {
    /// Every checked product is in stock.
    AllInStock { checked: usize },

    /// Some products are out of stock; `alert_sent` reports whether the
    /// admin notification went out.
    LowStock {
        products: Vec<ProductId>,
        alert_sent: bool,
    },

    /// The inventory service could not be reached even after retries.
    CheckFailed { reason: String },
}

/// Checks availability for the given products and alerts `admin_email`
/// about any that are out of stock.
///
/// A failed alert does not fail the sweep; it is logged and reported
/// through `alert_sent`.
#[tracing::instrument(skip(inventory, notifier), fields(products = product_ids.len()))]
pub async fn run_inventory_check<I, N>(
    inventory: &I,
    notifier: &N,
    product_ids: &[ProductId],
    admin_email: &str,
) -> InventoryCheckOutcome
where
    I: InventoryService,
    N: NotificationService,
{
    metrics::counter!("inventory_check_runs_total").increment(1);

    let checked = execute_step(StepKind::CheckInventory, &RetryPolicy::inventory(), || {
        inventory.check_inventory(product_ids)
    })
    .await;

    let report = match checked {
        StepOutcome::Success(report) => report,
        StepOutcome::RetryableFailure(reason) | StepOutcome::TerminalFailure(reason) => {
            tracing::error!(reason, "inventory check failed");
            return InventoryCheckOutcome::CheckFailed { reason };
        }
    };

    if report.all_in_stock() {
        tracing::info!(checked = product_ids.len(), "all products in stock");
        return InventoryCheckOutcome::AllInStock {
            checked: product_ids.len(),
        };
    }

    let products = report.unavailable();
    tracing::warn!(?products, "products out of stock, alerting admin");
    metrics::counter!("inventory_check_alerts_total").increment(1);

    let alert_sent = match alert_order(&products) {
        Ok(alert) => {
            let sent = execute_step(
                StepKind::SendConfirmation,
                &RetryPolicy::notification(),
                || notifier.send_order_confirmation(&alert, admin_email),
            )
            .await;
            if let Some(reason) = sent.failure_reason() {
                tracing::warn!(reason, "low stock alert not sent");
            }
            sent.is_success()
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not build low stock alert");
            false
        }
    };

    InventoryCheckOutcome::LowStock {
        products,
        alert_sent,
    }
}

/// Builds the synthetic order carrying the unavailable products.
fn alert_order(products: &[ProductId]) -> Result<Order, domain::DomainError> {
    let items = products
        .iter()
        .map(|id| OrderItem::new(id.clone(), id.as_str(), 1, Money::zero()))
        .collect();
    Order::new(
        CustomerId::new(),
        items,
        Address::default(),
        Address::default(),
        PaymentMethod::CreditCard,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryInventoryService, InMemoryNotificationService};

    fn products(ids: &[&str]) -> Vec<ProductId> {
        ids.iter().map(|id| ProductId::new(*id)).collect()
    }

    #[tokio::test]
    async fn test_all_in_stock_sends_nothing() {
        let inventory = InMemoryInventoryService::new();
        let notifier = InMemoryNotificationService::new();

        let outcome = run_inventory_check(
            &inventory,
            &notifier,
            &products(&["prod-001", "prod-002"]),
            "admin@example.com",
        )
        .await;

        assert_eq!(outcome, InventoryCheckOutcome::AllInStock { checked: 2 });
        assert_eq!(notifier.order_confirmation_count(), 0);
    }

    #[tokio::test]
    async fn test_low_stock_alerts_admin() {
        let inventory = InMemoryInventoryService::new();
        inventory.mark_unavailable("prod-002");
        inventory.mark_unavailable("prod-003");
        let notifier = InMemoryNotificationService::new();

        let outcome = run_inventory_check(
            &inventory,
            &notifier,
            &products(&["prod-001", "prod-002", "prod-003"]),
            "admin@example.com",
        )
        .await;

        assert_eq!(
            outcome,
            InventoryCheckOutcome::LowStock {
                products: products(&["prod-002", "prod-003"]),
                alert_sent: true,
            }
        );
        assert_eq!(notifier.order_confirmation_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_alert_is_reported_not_fatal() {
        let inventory = InMemoryInventoryService::new();
        inventory.mark_unavailable("prod-002");
        let notifier = InMemoryNotificationService::new();
        notifier.set_fail_on_send(true);

        let outcome = run_inventory_check(
            &inventory,
            &notifier,
            &products(&["prod-001", "prod-002"]),
            "admin@example.com",
        )
        .await;

        assert_eq!(
            outcome,
            InventoryCheckOutcome::LowStock {
                products: products(&["prod-002"]),
                alert_sent: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_check_failures_are_retried() {
        let inventory = InMemoryInventoryService::new();
        inventory.fail_check_transiently(2);
        let notifier = InMemoryNotificationService::new();

        let outcome = run_inventory_check(
            &inventory,
            &notifier,
            &products(&["prod-001"]),
            "admin@example.com",
        )
        .await;

        assert_eq!(outcome, InventoryCheckOutcome::AllInStock { checked: 1 });
        assert_eq!(inventory.check_call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_inventory_fails_the_sweep() {
        let inventory = InMemoryInventoryService::new();
        inventory.fail_check_transiently(u32::MAX);
        let notifier = InMemoryNotificationService::new();

        let outcome = run_inventory_check(
            &inventory,
            &notifier,
            &products(&["prod-001"]),
            "admin@example.com",
        )
        .await;

        assert!(matches!(outcome, InventoryCheckOutcome::CheckFailed { .. }));
        assert_eq!(notifier.order_confirmation_count(), 0);
    }
}
