//! Integration tests for the order fulfillment saga.
//!
//! All tests run on a paused clock; retry backoff and tracking poll
//! delays elapse in virtual time.

use std::time::Duration;

use domain::{Address, Customer, Money, Order, OrderItem, OrderStatus, PaymentMethod, PaymentState};
use saga::{
    InMemoryInventoryService, InMemoryNotificationService, InMemoryOrderRepository,
    InMemoryPaymentService, InMemoryReceiptService, InMemoryShippingService, OrderSaga,
    SagaConfig, SagaPhase, StepKind, TrackingStatus,
};

type TestSaga = OrderSaga<
    InMemoryOrderRepository,
    InMemoryInventoryService,
    InMemoryPaymentService,
    InMemoryShippingService,
    InMemoryReceiptService,
    InMemoryNotificationService,
>;

struct TestHarness {
    repository: InMemoryOrderRepository,
    inventory: InMemoryInventoryService,
    payment: InMemoryPaymentService,
    shipping: InMemoryShippingService,
    receipts: InMemoryReceiptService,
    notifier: InMemoryNotificationService,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            repository: InMemoryOrderRepository::new(),
            inventory: InMemoryInventoryService::new(),
            payment: InMemoryPaymentService::new(),
            shipping: InMemoryShippingService::new(),
            receipts: InMemoryReceiptService::new(),
            notifier: InMemoryNotificationService::new(),
        }
    }

    /// Registers a customer and builds a two-item order for them.
    fn make_order(&self) -> Order {
        let customer = Customer::new(
            "Ada",
            "Lovelace",
            "ada@example.com",
            "555-0100",
            Address::new("1 Analytical Way", "London", "LDN", "EC1A", "UK"),
        );
        let customer_id = customer.id;
        self.repository.add_customer(customer);

        Order::new(
            customer_id,
            vec![
                OrderItem::new("prod-001", "Widget", 2, Money::from_cents(1000)),
                OrderItem::new("prod-002", "Gadget", 1, Money::from_cents(2500)),
            ],
            Address::default(),
            Address::default(),
            PaymentMethod::CreditCard,
        )
        .unwrap()
    }

    fn saga(&self, order: Order) -> TestSaga {
        OrderSaga::new(
            self.repository.clone(),
            self.inventory.clone(),
            self.payment.clone(),
            self.shipping.clone(),
            self.receipts.clone(),
            self.notifier.clone(),
            order,
        )
    }

    fn saga_with_config(&self, order: Order, config: SagaConfig) -> TestSaga {
        OrderSaga::with_config(
            self.repository.clone(),
            self.inventory.clone(),
            self.payment.clone(),
            self.shipping.clone(),
            self.receipts.clone(),
            self.notifier.clone(),
            order,
            config,
        )
    }
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_order_delivered() {
    let h = TestHarness::new();
    let order = h.make_order();
    let order_id = order.id();

    let saga = h.saga(order);
    let handle = saga.handle();
    let result = saga.run().await;

    assert!(result.success);
    assert_eq!(result.order_id, order_id);
    assert_eq!(result.final_status, OrderStatus::Delivered);
    assert!(result.tracking_number.is_some());
    assert_eq!(
        result.receipt_url.as_deref(),
        Some(format!("receipts/{}.pdf", order_id).as_str())
    );

    // External state after the run
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::Delivered));
    assert_eq!(h.inventory.reservation_count(), 1);
    assert_eq!(h.inventory.release_call_count(), 0);
    assert_eq!(h.payment.charge_count(), 1);
    assert_eq!(h.payment.refund_call_count(), 0);
    assert_eq!(h.shipping.shipment_count(), 1);
    assert_eq!(h.receipts.receipt_count(), 1);
    assert_eq!(h.notifier.order_confirmation_count(), 1);
    assert_eq!(h.notifier.shipping_confirmation_count(), 1);

    // The handle keeps reporting the final snapshot
    assert_eq!(handle.phase(), SagaPhase::Delivered);
    assert_eq!(handle.status(), OrderStatus::Delivered);
    let steps = handle.completed_steps();
    for step in [
        StepKind::PersistOrder,
        StepKind::FetchCustomer,
        StepKind::CheckInventory,
        StepKind::ReserveInventory,
        StepKind::ProcessPayment,
        StepKind::GenerateReceipt,
        StepKind::SendConfirmation,
        StepKind::CreateShipment,
        StepKind::SendShippingConfirmation,
        StepKind::TrackShipment,
    ] {
        assert!(steps.contains(&step), "missing step {step}");
    }
    assert!(handle.details().tracking_number().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_items_fail_before_any_side_effects() {
    let h = TestHarness::new();
    h.inventory.mark_unavailable("prod-005");
    let base = h.make_order();
    let order = Order::new(
        base.customer_id(),
        vec![
            OrderItem::new("prod-001", "Widget", 2, Money::from_cents(1000)),
            OrderItem::new("prod-005", "Gizmo", 1, Money::from_cents(750)),
        ],
        Address::default(),
        Address::default(),
        PaymentMethod::CreditCard,
    )
    .unwrap();
    let order_id = order.id();

    let result = h.saga(order).run().await;

    assert!(!result.success);
    assert_eq!(result.final_status, OrderStatus::InventoryFailed);
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::InventoryFailed));

    // Nothing was reserved or charged, so there is nothing to undo.
    assert_eq!(h.inventory.reservation_count(), 0);
    assert_eq!(h.inventory.release_call_count(), 0);
    assert_eq!(h.payment.charge_attempt_count(), 0);
    assert_eq!(h.shipping.shipment_count(), 0);
    // The customer is told about the unavailable items.
    assert_eq!(h.notifier.order_confirmation_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reservation_refusal_fails_without_compensation() {
    let h = TestHarness::new();
    h.inventory.set_fail_on_reserve(true);
    let order = h.make_order();
    let order_id = order.id();

    let result = h.saga(order).run().await;

    assert!(!result.success);
    assert_eq!(result.final_status, OrderStatus::InventoryFailed);
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::InventoryFailed));
    assert_eq!(h.inventory.reservation_count(), 0);
    assert_eq!(h.inventory.release_call_count(), 0);
    assert_eq!(h.payment.charge_attempt_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_declined_payment_releases_inventory() {
    let h = TestHarness::new();
    h.payment.set_fail_on_charge(true);
    let order = h.make_order();
    let order_id = order.id();

    let result = h.saga(order).run().await;

    assert!(!result.success);
    assert_eq!(result.final_status, OrderStatus::PaymentFailed);
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::PaymentFailed));

    // The reservation was undone, and there was no charge to refund.
    assert_eq!(h.inventory.release_call_count(), 1);
    assert_eq!(h.inventory.reservation_count(), 0);
    assert_eq!(h.payment.refund_call_count(), 0);
    assert_eq!(h.shipping.shipment_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shipping_failure_keeps_payment_and_reservation() {
    let h = TestHarness::new();
    h.shipping.set_fail_on_create(true);
    let order = h.make_order();
    let order_id = order.id();

    let result = h.saga(order).run().await;

    assert!(!result.success);
    assert_eq!(result.final_status, OrderStatus::ShippingFailed);
    assert_eq!(result.tracking_number, None);
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::ShippingFailed));

    // The customer has paid; this path routes to manual review instead
    // of silently refunding a paid order.
    assert_eq!(h.payment.charge_count(), 1);
    assert_eq!(h.payment.refund_call_count(), 0);
    assert_eq!(h.inventory.reservation_count(), 1);
    assert_eq!(h.inventory.release_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_to_success() {
    let h = TestHarness::new();
    h.repository.fail_persist_transiently(2);
    h.payment.fail_charge_transiently(1);
    h.shipping.fail_create_transiently(1);
    let order = h.make_order();

    let result = h.saga(order).run().await;

    assert!(result.success);
    assert_eq!(result.final_status, OrderStatus::Delivered);
    assert_eq!(h.repository.persist_call_count(), 3);
    assert_eq!(h.payment.charge_attempt_count(), 2);
    assert_eq!(h.payment.charge_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_customer_aborts_with_nothing_to_undo() {
    let h = TestHarness::new();
    // Build the order against a repository without registering the
    // customer in the harness repository.
    let order = Order::new(
        domain::CustomerId::new(),
        vec![OrderItem::new("prod-001", "Widget", 1, Money::from_cents(1000))],
        Address::default(),
        Address::default(),
        PaymentMethod::CreditCard,
    )
    .unwrap();
    let order_id = order.id();

    let result = h.saga(order).run().await;

    assert!(!result.success);
    assert_eq!(result.final_status, OrderStatus::Cancelled);
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::Cancelled));
    assert_eq!(h.inventory.reservation_count(), 0);
    assert_eq!(h.inventory.release_call_count(), 0);
    assert_eq!(h.payment.charge_attempt_count(), 0);
    assert_eq!(h.payment.refund_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_before_start_does_nothing_external() {
    let h = TestHarness::new();
    let order = h.make_order();
    let order_id = order.id();

    let saga = h.saga(order);
    let handle = saga.handle();
    handle.signal_cancel();
    let result = saga.run().await;

    assert!(!result.success);
    assert_eq!(result.final_status, OrderStatus::Cancelled);
    assert_eq!(handle.phase(), SagaPhase::Cancelled);

    // Observed at the first safe point: the order was persisted, but no
    // inventory or money moved.
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::Cancelled));
    assert_eq!(h.inventory.check_call_count(), 0);
    assert_eq!(h.inventory.reservation_count(), 0);
    assert_eq!(h.payment.charge_attempt_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_after_reservation_releases_only() {
    let h = TestHarness::new();
    // Park the saga on a reserve retry so the cancel lands before the
    // post-reservation safe point.
    h.inventory.fail_reserve_transiently(1);
    let order = h.make_order();

    let saga = h.saga(order);
    let handle = saga.handle();
    let canceller = {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            handle.signal_cancel();
        })
    };

    let result = saga.run().await;
    canceller.await.unwrap();

    assert!(!result.success);
    assert_eq!(result.final_status, OrderStatus::Cancelled);
    assert_eq!(h.inventory.release_call_count(), 1);
    assert_eq!(h.inventory.reservation_count(), 0);
    assert_eq!(h.payment.charge_attempt_count(), 0);
    assert_eq!(h.payment.refund_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_after_payment_refunds_then_releases() {
    let h = TestHarness::new();
    // Park the saga on a payment retry so the cancel lands before the
    // post-payment safe point.
    h.payment.fail_charge_transiently(1);
    let order = h.make_order();
    let order_id = order.id();

    let saga = h.saga(order);
    let handle = saga.handle();
    let canceller = {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.signal_cancel();
        })
    };

    let result = saga.run().await;
    canceller.await.unwrap();

    assert!(!result.success);
    assert_eq!(result.final_status, OrderStatus::Cancelled);
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::Cancelled));

    // The completed charge was refunded and the reservation released.
    assert_eq!(h.payment.charge_count(), 1);
    assert_eq!(h.payment.refund_call_count(), 1);
    assert_eq!(h.inventory.release_call_count(), 1);
    assert_eq!(h.inventory.reservation_count(), 0);
    // No shipment was ever created.
    assert_eq!(h.shipping.shipment_count(), 0);
    // The refund is reflected on the final order projection.
    assert_eq!(handle.details().payment_info().state, PaymentState::Refunded);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_tracking_stops_polling_without_unwinding() {
    let h = TestHarness::new();
    h.shipping.set_tracking_script(vec![
        TrackingStatus::Processing,
        TrackingStatus::PickedUp,
        TrackingStatus::Delivered,
    ]);
    let order = h.make_order();
    let order_id = order.id();

    let saga = h.saga(order);
    let handle = saga.handle();
    let canceller = {
        let handle = handle.clone();
        tokio::spawn(async move {
            // Lands between the first and second tracking poll.
            tokio::time::sleep(Duration::from_millis(7_500)).await;
            handle.signal_cancel();
        })
    };

    let result = saga.run().await;
    canceller.await.unwrap();

    // The shipment exists and the customer has paid; the cancel only
    // stops the polling.
    assert!(result.success);
    assert_eq!(result.final_status, OrderStatus::Shipped);
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::Shipped));
    assert_eq!(h.shipping.track_call_count(), 1);
    assert_eq!(h.payment.refund_call_count(), 0);
    assert_eq!(h.inventory.release_call_count(), 0);
    assert_eq!(h.inventory.reservation_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tracking_budget_exhausted_leaves_order_shipped() {
    let h = TestHarness::new();
    h.shipping.set_tracking_script(vec![
        TrackingStatus::Processing,
        TrackingStatus::PickedUp,
        TrackingStatus::InTransit,
    ]);
    let order = h.make_order();
    let order_id = order.id();

    let result = h.saga(order).run().await;

    // Not delivered within the budget is still a fulfilled order.
    assert!(result.success);
    assert_eq!(result.final_status, OrderStatus::Shipped);
    assert_eq!(h.repository.stored_status(order_id), Some(OrderStatus::Shipped));
    assert_eq!(h.shipping.track_call_count(), 3);
    assert_eq!(h.payment.refund_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_carrier_exception_leaves_order_shipped() {
    let h = TestHarness::new();
    h.shipping
        .set_tracking_script(vec![TrackingStatus::InTransit, TrackingStatus::Exception]);
    let order = h.make_order();

    let result = h.saga(order).run().await;

    assert!(result.success);
    assert_eq!(result.final_status, OrderStatus::Shipped);
    assert_eq!(h.shipping.track_call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_receipt_failure_is_not_fatal() {
    let h = TestHarness::new();
    h.receipts.set_fail_on_generate(true);
    let order = h.make_order();

    let result = h.saga(order).run().await;

    assert!(result.success);
    assert_eq!(result.final_status, OrderStatus::Delivered);
    assert_eq!(result.receipt_url, None);
    assert_eq!(h.receipts.receipt_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_notification_failure_is_not_fatal() {
    let h = TestHarness::new();
    h.notifier.set_fail_on_send(true);
    let order = h.make_order();

    let result = h.saga(order).run().await;

    assert!(result.success);
    assert_eq!(result.final_status, OrderStatus::Delivered);
    assert_eq!(h.notifier.order_confirmation_count(), 0);
    assert_eq!(h.notifier.shipping_confirmation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_handle_reports_progress_while_running() {
    let h = TestHarness::new();
    // Park the saga on a payment retry so there is a stable moment to
    // observe mid-run state.
    h.payment.fail_charge_transiently(1);
    let order = h.make_order();

    let saga = h.saga(order);
    let handle = saga.handle();
    let task = tokio::spawn(saga.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handle.phase(), SagaPhase::PaymentProcessing);
    assert_eq!(handle.status(), OrderStatus::PaymentPending);
    let steps = handle.completed_steps();
    assert!(steps.contains(&StepKind::ReserveInventory));
    assert!(!steps.contains(&StepKind::ProcessPayment));

    let result = task.await.unwrap();
    assert!(result.success);
    assert_eq!(handle.phase(), SagaPhase::Delivered);
}

#[tokio::test(start_paused = true)]
async fn test_custom_tracking_budget() {
    let h = TestHarness::new();
    h.shipping.set_tracking_script(vec![
        TrackingStatus::Processing,
        TrackingStatus::Processing,
        TrackingStatus::Processing,
        TrackingStatus::Processing,
        TrackingStatus::OutForDelivery,
        TrackingStatus::Delivered,
    ]);
    let order = h.make_order();

    let config = SagaConfig {
        tracking_attempts: 6,
        tracking_poll_interval: Duration::from_secs(1),
        ..SagaConfig::default()
    };
    let result = h.saga_with_config(order, config).run().await;

    assert!(result.success);
    assert_eq!(result.final_status, OrderStatus::Delivered);
    assert_eq!(h.shipping.track_call_count(), 6);
}
