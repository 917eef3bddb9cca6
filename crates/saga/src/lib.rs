//! Saga orchestration for order fulfillment.
//!
//! This crate drives a multi-step order fulfillment transaction across
//! independently failing collaborators (repository, inventory, payment,
//! shipping, receipts, notifications) with compensating actions on failure.
//!
//! The forward path is:
//! 1. Persist the order (resumability anchor)
//! 2. Fetch the customer
//! 3. Check inventory
//! 4. Reserve inventory
//! 5. Process payment
//! 6. Generate receipt (non-fatal)
//! 7. Send confirmation (non-fatal)
//! 8. Create shipment
//! 9. Track the shipment until delivered or the poll budget runs out
//!
//! Completed steps that must be undone on failure or cancellation are
//! recorded in a [`CompensationLog`] and unwound in reverse order.
//! Cancellation is cooperative: a [`CancellationGate`] is observed at the
//! boundaries between steps, never mid-call. Live progress is published
//! through a [`SagaHandle`] snapshot after every step.

pub mod cancel;
pub mod collaborators;
pub mod compensation;
pub mod error;
pub mod executor;
pub mod inventory_check;
pub mod payment_retry;
pub mod retry;
pub mod saga;
pub mod snapshot;
pub mod tracking;

pub use cancel::CancellationGate;
pub use collaborators::{
    Delivery, InMemoryInventoryService, InMemoryNotificationService, InMemoryOrderRepository,
    InMemoryPaymentService, InMemoryReceiptService, InMemoryShippingService, InventoryReport,
    InventoryService, NotificationService, OrderRepository, PaymentReceipt, PaymentService,
    Receipt, ReceiptService, Refund, Shipment, ShippingService, TrackingStatus, TrackingUpdate,
};
pub use compensation::{CompensationEntry, CompensationLog, CompensationOutcome};
pub use error::SagaError;
pub use executor::{StepKind, StepOutcome, execute_step};
pub use inventory_check::{InventoryCheckOutcome, run_inventory_check};
pub use payment_retry::{PaymentRetryOutcome, retry_payment};
pub use retry::{FailureKind, RetryPolicy, StepError};
pub use saga::{OrderSaga, SagaConfig, SagaResult};
pub use snapshot::{SagaHandle, SagaPhase, SagaSnapshot};
pub use tracking::{ShipmentTracker, TrackingOutcome, TrackingSnapshot};
