//! Domain error types.

use thiserror::Error;

use crate::status::OrderStatus;

/// Errors raised by the order domain model.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An order must contain at least one item.
    #[error("Order has no items")]
    EmptyOrder,

    /// Order items must have a positive quantity.
    #[error("Item {product_id} has zero quantity")]
    ZeroQuantity { product_id: String },

    /// The requested status transition is not allowed.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
