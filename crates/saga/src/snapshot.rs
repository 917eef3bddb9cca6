//! Point-in-time saga state, queryable while the saga is in flight.

use std::sync::{Arc, RwLock};

use domain::{Order, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationGate;
use crate::executor::StepKind;

/// Where the saga currently is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaPhase {
    /// Saga constructed, order not yet persisted.
    #[default]
    Created,

    /// Checking item availability.
    InventoryChecking,

    /// Reserving stock.
    InventoryReserving,

    /// Charging the customer.
    PaymentProcessing,

    /// Generating the receipt document.
    ReceiptGenerating,

    /// Sending the confirmation email.
    Notifying,

    /// Creating the shipment.
    ShipmentCreating,

    /// Polling carrier tracking.
    Tracking,

    /// Carrier confirmed delivery (terminal).
    Delivered,

    /// Shipment created but not delivered within the poll budget (terminal).
    Shipped,

    /// Saga cancelled and unwound (terminal).
    Cancelled,

    /// Items unavailable or reservation refused (terminal).
    InventoryFailed,

    /// Payment declined or exhausted (terminal).
    PaymentFailed,

    /// Shipment creation failed (terminal).
    ShippingFailed,
}

impl SagaPhase {
    /// Returns true if the saga has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaPhase::Delivered
                | SagaPhase::Shipped
                | SagaPhase::Cancelled
                | SagaPhase::InventoryFailed
                | SagaPhase::PaymentFailed
                | SagaPhase::ShippingFailed
        )
    }

    /// Returns the phase name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaPhase::Created => "Created",
            SagaPhase::InventoryChecking => "InventoryChecking",
            SagaPhase::InventoryReserving => "InventoryReserving",
            SagaPhase::PaymentProcessing => "PaymentProcessing",
            SagaPhase::ReceiptGenerating => "ReceiptGenerating",
            SagaPhase::Notifying => "Notifying",
            SagaPhase::ShipmentCreating => "ShipmentCreating",
            SagaPhase::Tracking => "Tracking",
            SagaPhase::Delivered => "Delivered",
            SagaPhase::Shipped => "Shipped",
            SagaPhase::Cancelled => "Cancelled",
            SagaPhase::InventoryFailed => "InventoryFailed",
            SagaPhase::PaymentFailed => "PaymentFailed",
            SagaPhase::ShippingFailed => "ShippingFailed",
        }
    }
}

impl std::fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The externally queryable projection of a running saga.
///
/// Replaced atomically after every step; queries only ever see the last
/// published value, never a half-applied one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaSnapshot {
    /// Current position in the state machine.
    pub phase: SagaPhase,

    /// Current order status.
    pub status: OrderStatus,

    /// The in-flight order projection.
    pub order: Order,

    /// Forward steps completed so far.
    pub completed_steps: Vec<StepKind>,
}

impl SagaSnapshot {
    /// Creates the initial snapshot for an order about to be processed.
    pub fn initial(order: Order) -> Self {
        Self {
            phase: SagaPhase::Created,
            status: order.status(),
            order,
            completed_steps: Vec::new(),
        }
    }
}

/// Handle to a running saga: cancellation entry point plus status queries.
///
/// Cheap to clone; remains valid after the saga terminates, reporting the
/// final published snapshot.
#[derive(Debug, Clone)]
pub struct SagaHandle {
    gate: CancellationGate,
    snapshot: Arc<RwLock<SagaSnapshot>>,
}

impl SagaHandle {
    pub(crate) fn new(gate: CancellationGate, snapshot: Arc<RwLock<SagaSnapshot>>) -> Self {
        Self { gate, snapshot }
    }

    /// Requests cancellation of the saga. Fire-and-forget; takes effect at
    /// the next safe point.
    pub fn signal_cancel(&self) {
        self.gate.signal_cancel();
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.gate.is_cancelled()
    }

    /// Returns the current order status.
    pub fn status(&self) -> OrderStatus {
        self.snapshot.read().unwrap().status
    }

    /// Returns the current saga phase.
    pub fn phase(&self) -> SagaPhase {
        self.snapshot.read().unwrap().phase
    }

    /// Returns the current order projection.
    pub fn details(&self) -> Order {
        self.snapshot.read().unwrap().order.clone()
    }

    /// Returns the forward steps completed so far.
    pub fn completed_steps(&self) -> Vec<StepKind> {
        self.snapshot.read().unwrap().completed_steps.clone()
    }

    /// Returns the full last-published snapshot.
    pub fn snapshot(&self) -> SagaSnapshot {
        self.snapshot.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Address, CustomerId, Money, OrderItem, PaymentMethod};

    fn make_order() -> Order {
        Order::new(
            CustomerId::new(),
            vec![OrderItem::new("prod-001", "Widget", 1, Money::from_cents(500))],
            Address::default(),
            Address::default(),
            PaymentMethod::CreditCard,
        )
        .unwrap()
    }

    #[test]
    fn test_terminal_phases() {
        assert!(SagaPhase::Delivered.is_terminal());
        assert!(SagaPhase::Shipped.is_terminal());
        assert!(SagaPhase::Cancelled.is_terminal());
        assert!(SagaPhase::InventoryFailed.is_terminal());

        assert!(!SagaPhase::Created.is_terminal());
        assert!(!SagaPhase::Tracking.is_terminal());
    }

    #[test]
    fn test_handle_reads_last_published_snapshot() {
        let order = make_order();
        let snapshot = Arc::new(RwLock::new(SagaSnapshot::initial(order.clone())));
        let handle = SagaHandle::new(CancellationGate::new(), snapshot.clone());

        assert_eq!(handle.phase(), SagaPhase::Created);
        assert_eq!(handle.status(), OrderStatus::Created);
        assert!(handle.completed_steps().is_empty());

        {
            let mut guard = snapshot.write().unwrap();
            guard.phase = SagaPhase::PaymentProcessing;
            guard.completed_steps.push(StepKind::ReserveInventory);
        }

        assert_eq!(handle.phase(), SagaPhase::PaymentProcessing);
        assert_eq!(handle.completed_steps(), vec![StepKind::ReserveInventory]);
        assert_eq!(handle.details().id(), order.id());
    }

    #[test]
    fn test_handle_cancellation_passthrough() {
        let snapshot = Arc::new(RwLock::new(SagaSnapshot::initial(make_order())));
        let gate = CancellationGate::new();
        let handle = SagaHandle::new(gate.clone(), snapshot);

        assert!(!handle.is_cancel_requested());
        handle.signal_cancel();
        assert!(gate.is_cancelled());
        assert!(handle.is_cancel_requested());
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = SagaSnapshot::initial(make_order());
        let json = serde_json::to_string(&snapshot).unwrap();
        let deserialized: SagaSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.phase, SagaPhase::Created);
        assert_eq!(deserialized.status, OrderStatus::Created);
    }
}
