//! The order fulfillment saga: forward steps, compensation, cancellation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use domain::{Customer, Order, OrderId, OrderStatus};

use crate::cancel::CancellationGate;
use crate::collaborators::{
    InventoryService, NotificationService, OrderRepository, PaymentService, ReceiptService,
    Shipment, ShippingService,
};
use crate::compensation::{CompensationEntry, CompensationLog};
use crate::error::SagaError;
use crate::executor::{StepKind, StepOutcome, execute_step};
use crate::retry::RetryPolicy;
use crate::snapshot::{SagaHandle, SagaPhase, SagaSnapshot};
use crate::tracking::{ShipmentTracker, TrackingOutcome};

/// Retry policies and tracking budget for one saga run.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Policy for repository calls.
    pub database_policy: RetryPolicy,
    /// Policy for inventory calls.
    pub inventory_policy: RetryPolicy,
    /// Policy for payment calls.
    pub payment_policy: RetryPolicy,
    /// Policy for shipping calls.
    pub shipping_policy: RetryPolicy,
    /// Policy for notification calls.
    pub notification_policy: RetryPolicy,
    /// Policy for receipt generation and storage.
    pub file_storage_policy: RetryPolicy,
    /// How many tracking polls to make before settling for `Shipped`.
    pub tracking_attempts: u32,
    /// How long to wait before each tracking poll.
    pub tracking_poll_interval: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            database_policy: RetryPolicy::database(),
            inventory_policy: RetryPolicy::inventory(),
            payment_policy: RetryPolicy::payment(),
            shipping_policy: RetryPolicy::shipping(),
            notification_policy: RetryPolicy::notification(),
            file_storage_policy: RetryPolicy::file_storage(),
            tracking_attempts: 3,
            tracking_poll_interval: Duration::from_secs(5),
        }
    }
}

/// What a completed saga run reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaResult {
    /// True if the order ended in a fulfilled state (Delivered or Shipped).
    pub success: bool,
    /// The order the saga processed.
    pub order_id: OrderId,
    /// The order's status when the saga finished.
    pub final_status: OrderStatus,
    /// Carrier tracking number, if a shipment was created.
    pub tracking_number: Option<String>,
    /// Stored receipt location, if one was generated.
    pub receipt_url: Option<String>,
}

/// Converts a step outcome into a saga abort for steps with no
/// rule-specific failure handling.
fn require<T>(step: StepKind, outcome: StepOutcome<T>) -> Result<T, SagaError> {
    match outcome {
        StepOutcome::Success(value) => Ok(value),
        StepOutcome::RetryableFailure(reason) | StepOutcome::TerminalFailure(reason) => {
            Err(SagaError::StepFailed { step, reason })
        }
    }
}

/// Drives one order through fulfillment.
///
/// Forward steps run in a fixed sequence; each step that leaves external
/// state behind records a [`CompensationEntry`], and any failure or
/// cancellation that aborts the saga unwinds those entries newest first.
/// One saga drives one order; concurrent sagas are fully independent.
///
/// [`OrderSaga::handle`] returns a [`SagaHandle`] for cancelling the saga
/// and observing its progress while [`OrderSaga::run`] is in flight.
pub struct OrderSaga<R, I, P, Sh, F, N> {
    repository: R,
    inventory: I,
    payment: P,
    shipping: Sh,
    receipts: F,
    notifier: N,
    config: SagaConfig,
    order: Order,
    gate: CancellationGate,
    snapshot: Arc<RwLock<SagaSnapshot>>,
    log: CompensationLog,
    completed: Vec<StepKind>,
    receipt_url: Option<String>,
}

impl<R, I, P, Sh, F, N> OrderSaga<R, I, P, Sh, F, N>
where
    R: OrderRepository,
    I: InventoryService,
    P: PaymentService,
    Sh: ShippingService,
    F: ReceiptService,
    N: NotificationService,
{
    /// Creates a saga for the given order with default policies.
    pub fn new(
        repository: R,
        inventory: I,
        payment: P,
        shipping: Sh,
        receipts: F,
        notifier: N,
        order: Order,
    ) -> Self {
        Self::with_config(
            repository,
            inventory,
            payment,
            shipping,
            receipts,
            notifier,
            order,
            SagaConfig::default(),
        )
    }

    /// Creates a saga with explicit policies and tracking budget.
    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        repository: R,
        inventory: I,
        payment: P,
        shipping: Sh,
        receipts: F,
        notifier: N,
        order: Order,
        config: SagaConfig,
    ) -> Self {
        let snapshot = Arc::new(RwLock::new(SagaSnapshot::initial(order.clone())));
        Self {
            repository,
            inventory,
            payment,
            shipping,
            receipts,
            notifier,
            config,
            order,
            gate: CancellationGate::new(),
            snapshot,
            log: CompensationLog::new(),
            completed: Vec::new(),
            receipt_url: None,
        }
    }

    /// Returns a handle for cancelling and querying this saga.
    ///
    /// The handle stays valid after [`OrderSaga::run`] returns, reporting
    /// the final published snapshot.
    pub fn handle(&self) -> SagaHandle {
        SagaHandle::new(self.gate.clone(), self.snapshot.clone())
    }

    /// Runs the saga to completion.
    ///
    /// Never fails across this boundary: rule-specific failures settle the
    /// order in the matching failure status, and anything unexpected
    /// (infrastructure failures that exhausted their retries with no
    /// dedicated handling) unwinds everything recorded and cancels the
    /// order.
    #[tracing::instrument(skip(self), fields(order_id = %self.order.id()))]
    pub async fn run(mut self) -> SagaResult {
        let order_id = self.order.id();
        let started = tokio::time::Instant::now();
        metrics::counter!("saga_runs_total").increment(1);
        tracing::info!(%order_id, total = %self.order.total_amount(), "starting order saga");

        let result = match self.run_inner().await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(%order_id, error = %err, "saga aborted, unwinding");
                self.unwind().await;
                self.finish(SagaPhase::Cancelled, OrderStatus::Cancelled, false)
                    .await
            }
        };

        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        if result.success {
            metrics::counter!("saga_completed_total").increment(1);
        } else {
            metrics::counter!("saga_failed_total").increment(1);
        }
        tracing::info!(%order_id, success = result.success, status = %result.final_status, "saga finished");
        result
    }

    async fn run_inner(&mut self) -> Result<SagaResult, SagaError> {
        let order_id = self.order.id();

        // 1. Persist the order. Everything after this point can find the
        // order by ID, including an out-of-band payment retry.
        let persisted = execute_step(StepKind::PersistOrder, &self.config.database_policy, || {
            self.repository.persist_order(&self.order)
        })
        .await;
        require(StepKind::PersistOrder, persisted)?;
        self.mark_done(StepKind::PersistOrder, SagaPhase::Created);

        // 2. Fetch the customer. An absent customer aborts before anything
        // was reserved, so the unwind has nothing to do.
        let customer_id = self.order.customer_id();
        let fetched = execute_step(StepKind::FetchCustomer, &self.config.database_policy, || {
            self.repository.fetch_customer(customer_id)
        })
        .await;
        let customer: Customer = require(StepKind::FetchCustomer, fetched)?
            .ok_or(SagaError::CustomerNotFound(customer_id))?;
        self.mark_done(StepKind::FetchCustomer, SagaPhase::Created);

        // 3.
        if self.gate.is_cancelled() {
            return Ok(self.cancel().await);
        }

        // 4. Check availability for every product in the order.
        self.publish(SagaPhase::InventoryChecking);
        let product_ids = self.order.product_ids();
        let checked = execute_step(
            StepKind::CheckInventory,
            &self.config.inventory_policy,
            || self.inventory.check_inventory(&product_ids),
        )
        .await;
        let report = require(StepKind::CheckInventory, checked)?;
        self.mark_done(StepKind::CheckInventory, SagaPhase::InventoryChecking);

        if !report.all_in_stock() {
            let unavailable = report.unavailable();
            tracing::warn!(%order_id, ?unavailable, "items not in stock");
            self.set_status_best_effort(OrderStatus::InventoryFailed)
                .await;
            self.notify_order_confirmation(&customer).await;
            return Ok(self
                .finish(SagaPhase::InventoryFailed, OrderStatus::InventoryFailed, false)
                .await);
        }
        self.set_status(OrderStatus::InventoryChecked).await?;

        // 5.
        if self.gate.is_cancelled() {
            return Ok(self.cancel().await);
        }

        // 6. Reserve stock. From here on a failure must release it.
        self.publish(SagaPhase::InventoryReserving);
        let items = self.order.items().to_vec();
        let reserved = execute_step(
            StepKind::ReserveInventory,
            &self.config.inventory_policy,
            || self.inventory.reserve_inventory(&items),
        )
        .await;
        if let Some(reason) = reserved.failure_reason() {
            tracing::warn!(%order_id, reason, "inventory reservation failed");
            self.set_status_best_effort(OrderStatus::InventoryFailed)
                .await;
            return Ok(self
                .finish(SagaPhase::InventoryFailed, OrderStatus::InventoryFailed, false)
                .await);
        }
        self.log
            .record(CompensationEntry::InventoryReservation { items });
        self.mark_done(StepKind::ReserveInventory, SagaPhase::InventoryReserving);

        // 7.
        if self.gate.is_cancelled() {
            return Ok(self.cancel().await);
        }

        // 8. Charge the customer.
        self.set_status(OrderStatus::PaymentPending).await?;
        self.publish(SagaPhase::PaymentProcessing);
        let charged = execute_step(StepKind::ProcessPayment, &self.config.payment_policy, || {
            self.payment.process_payment(&self.order)
        })
        .await;
        let receipt = match charged {
            StepOutcome::Success(receipt) => receipt,
            StepOutcome::RetryableFailure(reason) | StepOutcome::TerminalFailure(reason) => {
                tracing::warn!(%order_id, reason, "payment failed, releasing inventory");
                self.unwind().await;
                self.order.record_payment_failure();
                self.set_status_best_effort(OrderStatus::PaymentFailed)
                    .await;
                return Ok(self
                    .finish(SagaPhase::PaymentFailed, OrderStatus::PaymentFailed, false)
                    .await);
            }
        };
        self.order.record_payment(receipt.transaction_id.clone());
        self.log.record(CompensationEntry::Payment {
            transaction_id: receipt.transaction_id,
            amount: self.order.total_amount(),
        });
        self.set_status(OrderStatus::PaymentCompleted).await?;
        self.mark_done(StepKind::ProcessPayment, SagaPhase::PaymentProcessing);

        // 9.
        if self.gate.is_cancelled() {
            return Ok(self.cancel().await);
        }

        // 10. Receipt generation never fails the order.
        self.publish(SagaPhase::ReceiptGenerating);
        let generated = execute_step(
            StepKind::GenerateReceipt,
            &self.config.file_storage_policy,
            || self.receipts.generate_and_store_receipt(&self.order),
        )
        .await;
        match generated {
            StepOutcome::Success(receipt) => {
                self.receipt_url = Some(receipt.file_url);
                self.mark_done(StepKind::GenerateReceipt, SagaPhase::ReceiptGenerating);
            }
            StepOutcome::RetryableFailure(reason) | StepOutcome::TerminalFailure(reason) => {
                tracing::warn!(%order_id, reason, "receipt generation failed, continuing");
            }
        }

        // 11. Confirmation email is best-effort too.
        self.publish(SagaPhase::Notifying);
        if self.notify_order_confirmation(&customer).await {
            self.mark_done(StepKind::SendConfirmation, SagaPhase::Notifying);
        }

        // 12. Create the shipment. The customer has paid, so a shipping
        // failure leaves the payment and the reservation in place for
        // manual follow-up instead of silently undoing a paid order.
        self.set_status(OrderStatus::ShippingPending).await?;
        self.publish(SagaPhase::ShipmentCreating);
        let created = execute_step(StepKind::CreateShipment, &self.config.shipping_policy, || {
            self.shipping.create_shipment(&self.order)
        })
        .await;
        let shipment = match created {
            StepOutcome::Success(shipment) => shipment,
            StepOutcome::RetryableFailure(reason) | StepOutcome::TerminalFailure(reason) => {
                tracing::error!(%order_id, reason, "shipment creation failed, keeping payment for manual review");
                self.set_status_best_effort(OrderStatus::ShippingFailed)
                    .await;
                return Ok(self
                    .finish(SagaPhase::ShippingFailed, OrderStatus::ShippingFailed, false)
                    .await);
            }
        };
        self.order
            .set_tracking_number(shipment.tracking_number.clone());
        self.set_status(OrderStatus::Shipped).await?;
        self.mark_done(StepKind::CreateShipment, SagaPhase::ShipmentCreating);

        // 13.
        if self.notify_shipping_confirmation(&customer, &shipment).await {
            self.mark_done(StepKind::SendShippingConfirmation, SagaPhase::ShipmentCreating);
        }

        // 14.
        if self.gate.is_cancelled() {
            return Ok(self.cancel().await);
        }

        // 15. Follow the shipment until delivery or the poll budget runs
        // out. Not reaching a terminal carrier status is not a failure:
        // the order stays Shipped.
        self.publish(SagaPhase::Tracking);
        let tracker = ShipmentTracker::new();
        let outcome = tracker
            .track(
                &self.shipping,
                &shipment.tracking_number,
                self.config.tracking_attempts,
                self.config.tracking_poll_interval,
                &self.gate,
            )
            .await;
        self.mark_done(StepKind::TrackShipment, SagaPhase::Tracking);

        match outcome {
            TrackingOutcome::Delivered => Ok(self
                .finish(SagaPhase::Delivered, OrderStatus::Delivered, true)
                .await),
            TrackingOutcome::Exception { reason } => {
                tracing::warn!(%order_id, reason, "carrier exception, order remains shipped");
                Ok(self.finish(SagaPhase::Shipped, OrderStatus::Shipped, true).await)
            }
            TrackingOutcome::StillInTransit { last_status } => {
                tracing::info!(%order_id, last_status = %last_status, "tracking budget exhausted, order remains shipped");
                Ok(self.finish(SagaPhase::Shipped, OrderStatus::Shipped, true).await)
            }
            TrackingOutcome::Cancelled { last_status } => {
                // The shipment already exists; cancelling here only stops
                // the polling. Nothing is unwound.
                tracing::info!(%order_id, last_status = %last_status, "cancelled during tracking, order remains shipped");
                Ok(self.finish(SagaPhase::Shipped, OrderStatus::Shipped, true).await)
            }
        }
    }

    /// Applies a status transition on the forward path: the domain rejects
    /// invalid transitions and the repository mirror must succeed.
    async fn set_status(&mut self, status: OrderStatus) -> Result<(), SagaError> {
        self.order.set_status(status)?;
        let order_id = self.order.id();
        let mirrored = execute_step(StepKind::UpdateStatus, &self.config.database_policy, || {
            self.repository.update_order_status(order_id, status)
        })
        .await;
        require(StepKind::UpdateStatus, mirrored)?;
        self.publish_current();
        Ok(())
    }

    /// Applies a status transition on a failure path: mirror failures are
    /// logged, never escalated, so the saga can still settle.
    async fn set_status_best_effort(&mut self, status: OrderStatus) {
        let order_id = self.order.id();
        if let Err(err) = self.order.set_status(status) {
            tracing::warn!(%order_id, error = %err, "status transition rejected");
        }
        let mirrored = execute_step(StepKind::UpdateStatus, &self.config.database_policy, || {
            self.repository.update_order_status(order_id, status)
        })
        .await;
        if let Some(reason) = mirrored.failure_reason() {
            tracing::warn!(%order_id, status = %status, reason, "failed to mirror order status");
        }
        self.publish_current();
    }

    async fn notify_order_confirmation(&self, customer: &Customer) -> bool {
        let sent = execute_step(
            StepKind::SendConfirmation,
            &self.config.notification_policy,
            || {
                self.notifier
                    .send_order_confirmation(&self.order, &customer.email)
            },
        )
        .await;
        if let Some(reason) = sent.failure_reason() {
            tracing::warn!(order_id = %self.order.id(), reason, "order confirmation not sent");
        }
        sent.is_success()
    }

    async fn notify_shipping_confirmation(&self, customer: &Customer, shipment: &Shipment) -> bool {
        let sent = execute_step(
            StepKind::SendShippingConfirmation,
            &self.config.notification_policy,
            || {
                self.notifier.send_shipping_confirmation(
                    &self.order,
                    &customer.email,
                    &shipment.tracking_number,
                    &shipment.carrier,
                    shipment.estimated_delivery,
                )
            },
        )
        .await;
        if let Some(reason) = sent.failure_reason() {
            tracing::warn!(order_id = %self.order.id(), reason, "shipping confirmation not sent");
        }
        sent.is_success()
    }

    /// Unwinds every recorded compensation entry, newest first.
    async fn unwind(&mut self) {
        if self.log.is_empty() {
            return;
        }
        let order_id = self.order.id();
        let outcomes = self
            .log
            .compensate_all(&self.inventory, &self.payment, order_id)
            .await;
        if outcomes
            .iter()
            .any(|o| o.step == StepKind::RefundPayment && o.is_success())
        {
            self.order.record_refund();
        }
    }

    /// Handles an observed cancellation request: unwind, settle Cancelled.
    async fn cancel(&mut self) -> SagaResult {
        let order_id = self.order.id();
        tracing::info!(%order_id, "cancellation requested, unwinding");
        metrics::counter!("saga_cancellations_total").increment(1);
        self.unwind().await;
        self.finish(SagaPhase::Cancelled, OrderStatus::Cancelled, false)
            .await
    }

    /// Settles the saga in its final state and builds the result.
    async fn finish(&mut self, phase: SagaPhase, status: OrderStatus, success: bool) -> SagaResult {
        if self.order.status() != status {
            self.set_status_best_effort(status).await;
        }
        self.publish(phase);
        SagaResult {
            success,
            order_id: self.order.id(),
            final_status: self.order.status(),
            tracking_number: self.order.tracking_number().map(str::to_owned),
            receipt_url: self.receipt_url.clone(),
        }
    }

    fn mark_done(&mut self, step: StepKind, phase: SagaPhase) {
        self.completed.push(step);
        self.publish(phase);
    }

    fn publish(&self, phase: SagaPhase) {
        let mut guard = self.snapshot.write().unwrap();
        guard.phase = phase;
        guard.status = self.order.status();
        guard.order = self.order.clone();
        guard.completed_steps = self.completed.clone();
    }

    fn publish_current(&self) {
        let phase = self.snapshot.read().unwrap().phase;
        self.publish(phase);
    }
}
