//! Collaborator contracts consumed by the saga, with deterministic
//! in-memory implementations for tests.
//!
//! Every trait method maps to one remote call; failures are classified
//! through [`crate::StepError`] (retryable vs. terminal) and nothing more.

pub mod inventory;
pub mod notification;
pub mod payment;
pub mod receipt;
pub mod shipping;
pub mod store;

pub use inventory::{InMemoryInventoryService, InventoryReport, InventoryService};
pub use notification::{Delivery, InMemoryNotificationService, NotificationService};
pub use payment::{InMemoryPaymentService, PaymentReceipt, PaymentService, Refund};
pub use receipt::{InMemoryReceiptService, Receipt, ReceiptService};
pub use shipping::{
    InMemoryShippingService, Shipment, ShippingService, TrackingStatus, TrackingUpdate,
};
pub use store::{InMemoryOrderRepository, OrderRepository};
