//! Order aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::status::OrderStatus;
use crate::value_objects::{
    Address, CustomerId, Money, OrderId, OrderItem, PaymentInfo, PaymentMethod, PaymentState,
    ProductId,
};

/// Order aggregate root.
///
/// The saga holds the authoritative in-flight value of one order for the
/// duration of a run; persisted copies are handed to the order repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    id: OrderId,

    /// Customer who placed the order.
    customer_id: CustomerId,

    /// Ordered line items.
    items: Vec<OrderItem>,

    /// Total amount, computed from the items.
    total_amount: Money,

    /// Current fulfillment status.
    status: OrderStatus,

    /// Where the order ships to.
    shipping_address: Address,

    /// Where the order is billed to.
    billing_address: Address,

    /// Payment details.
    payment_info: PaymentInfo,

    /// Tracking number, set once a shipment exists.
    tracking_number: Option<String>,

    /// Free-form notes.
    notes: Option<String>,

    /// When the order was created.
    created_at: DateTime<Utc>,

    /// When the order was last modified.
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order in `Created` status.
    ///
    /// Fails if the item list is empty or any item has zero quantity.
    pub fn new(
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        shipping_address: Address,
        billing_address: Address,
        payment_method: PaymentMethod,
    ) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::EmptyOrder);
        }
        if let Some(item) = items.iter().find(|item| item.quantity == 0) {
            return Err(DomainError::ZeroQuantity {
                product_id: item.product_id.to_string(),
            });
        }

        let total_amount = items
            .iter()
            .fold(Money::zero(), |sum, item| sum + item.total_price());
        let now = Utc::now();

        Ok(Self {
            id: OrderId::new(),
            customer_id,
            items,
            total_amount,
            status: OrderStatus::Created,
            shipping_address,
            billing_address,
            payment_info: PaymentInfo::new(payment_method),
            tracking_number: None,
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves the order to a new status.
    ///
    /// Rejects transitions out of an absorbing status; `Cancelled` and
    /// `Refunded` are reachable from any non-absorbing status.
    pub fn set_status(&mut self, status: OrderStatus) -> Result<(), DomainError> {
        if self.status.is_absorbing() && status != self.status {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.touch();
        Ok(())
    }

    /// Records a successful charge on the order.
    pub fn record_payment(&mut self, transaction_id: impl Into<String>) {
        self.payment_info.transaction_id = Some(transaction_id.into());
        self.payment_info.state = PaymentState::Completed;
        self.touch();
    }

    /// Records a declined or exhausted charge.
    pub fn record_payment_failure(&mut self) {
        self.payment_info.state = PaymentState::Failed;
        self.touch();
    }

    /// Records that a completed charge was refunded.
    pub fn record_refund(&mut self) {
        self.payment_info.state = PaymentState::Refunded;
        self.touch();
    }

    /// Attaches the carrier tracking number.
    pub fn set_tracking_number(&mut self, tracking_number: impl Into<String>) {
        self.tracking_number = Some(tracking_number.into());
        self.touch();
    }

    /// Attaches a free-form note.
    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = Some(notes.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// Query methods
impl Order {
    /// Returns the order ID.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the customer ID.
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns all items in the order.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the product IDs of all items.
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.items.iter().map(|item| item.product_id.clone()).collect()
    }

    /// Returns true if the order has items.
    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    /// Returns the total amount.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Returns the shipping address.
    pub fn shipping_address(&self) -> &Address {
        &self.shipping_address
    }

    /// Returns the billing address.
    pub fn billing_address(&self) -> &Address {
        &self.billing_address
    }

    /// Returns the payment info.
    pub fn payment_info(&self) -> &PaymentInfo {
        &self.payment_info
    }

    /// Returns the tracking number, if a shipment exists.
    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    /// Returns the notes, if any.
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Returns when the order was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the order was last modified.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
