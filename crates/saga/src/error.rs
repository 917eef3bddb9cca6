//! Saga error types.

use domain::{CustomerId, DomainError, OrderId};
use thiserror::Error;

use crate::executor::StepKind;

/// Errors that can occur while a saga is running.
///
/// These are internal to the orchestration: [`crate::OrderSaga::run`]
/// converts every failure into a structured result, and no error crosses
/// the saga's public boundary.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step failed terminally with no rule-specific handling.
    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: StepKind, reason: String },

    /// The order does not exist in the repository.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The customer placing the order does not exist.
    #[error("Customer not found: {0}")]
    CustomerNotFound(CustomerId),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
