//! Domain model for order fulfillment.
//!
//! This crate provides the order aggregate and its supporting value objects:
//! - Order with its status state machine
//! - Money, addresses, order items, payment info
//! - Customer record
//!
//! The domain layer is pure: no I/O, no async, no clocks beyond timestamping.

pub mod customer;
pub mod error;
pub mod order;
pub mod status;
pub mod value_objects;

pub use customer::Customer;
pub use error::DomainError;
pub use order::Order;
pub use status::OrderStatus;
pub use value_objects::{
    Address, CustomerId, Money, OrderId, OrderItem, PaymentInfo, PaymentMethod, PaymentState,
    ProductId,
};
