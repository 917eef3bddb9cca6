//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order as it moves through fulfillment.
///
/// Forward path:
/// ```text
/// Created ──► InventoryChecked ──► PaymentPending ──► PaymentCompleted
///     ──► ShippingPending ──► Shipped ──► Delivered
/// ```
///
/// `InventoryFailed`, `PaymentFailed` and `ShippingFailed` are the terminal
/// failure statuses for their step. `Cancelled` and `Refunded` are absorbing
/// and reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order has been placed but no fulfillment step has run.
    #[default]
    Created,

    /// Payment is about to be attempted.
    PaymentPending,

    /// Payment succeeded.
    PaymentCompleted,

    /// Payment was declined or retries were exhausted (terminal).
    PaymentFailed,

    /// All items were confirmed in stock.
    InventoryChecked,

    /// One or more items were unavailable (terminal).
    InventoryFailed,

    /// Shipment creation is about to be attempted.
    ShippingPending,

    /// Shipment created, not yet delivered.
    Shipped,

    /// Shipment creation failed (terminal, no automatic rollback).
    ShippingFailed,

    /// Carrier confirmed delivery (terminal).
    Delivered,

    /// Order was cancelled (absorbing).
    Cancelled,

    /// Payment was refunded after cancellation (absorbing).
    Refunded,
}

impl OrderStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::PaymentFailed
                | OrderStatus::InventoryFailed
                | OrderStatus::ShippingFailed
                | OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::Refunded
        )
    }

    /// Returns true if no transition may ever leave this status.
    ///
    /// Failure statuses are terminal for a saga run but not absorbing:
    /// an out-of-band payment retry may move `PaymentFailed` forward again.
    pub fn is_absorbing(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Returns true if this status represents a failed outcome.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OrderStatus::PaymentFailed
                | OrderStatus::InventoryFailed
                | OrderStatus::ShippingFailed
                | OrderStatus::Cancelled
        )
    }

    /// Returns true if the order can still be cancelled.
    ///
    /// Cancellation is an absorbing transition available from any
    /// non-absorbing status short of delivery.
    pub fn can_cancel(&self) -> bool {
        !self.is_absorbing() && *self != OrderStatus::Delivered
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::PaymentPending => "PaymentPending",
            OrderStatus::PaymentCompleted => "PaymentCompleted",
            OrderStatus::PaymentFailed => "PaymentFailed",
            OrderStatus::InventoryChecked => "InventoryChecked",
            OrderStatus::InventoryFailed => "InventoryFailed",
            OrderStatus::ShippingPending => "ShippingPending",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::ShippingFailed => "ShippingFailed",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
