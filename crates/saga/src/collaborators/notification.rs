//! Notification service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Order, OrderId};

use crate::retry::StepError;

/// Result of a successfully sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Message ID assigned by the mail provider.
    pub message_id: String,
}

/// Trait for customer notifications.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Sends the order confirmation email.
    async fn send_order_confirmation(
        &self,
        order: &Order,
        email: &str,
    ) -> Result<Delivery, StepError>;

    /// Sends the shipping confirmation email with tracking details.
    async fn send_shipping_confirmation(
        &self,
        order: &Order,
        email: &str,
        tracking_number: &str,
        carrier: &str,
        estimated_delivery: DateTime<Utc>,
    ) -> Result<(), StepError>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    order_confirmations: Vec<(OrderId, String)>,
    shipping_confirmations: Vec<(OrderId, String)>,
    next_id: u32,
    fail_on_send: bool,
}

/// In-memory notification service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    /// Creates a new in-memory notification service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every send to fail with a retryable error.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the number of order confirmations sent.
    pub fn order_confirmation_count(&self) -> usize {
        self.state.read().unwrap().order_confirmations.len()
    }

    /// Returns the number of shipping confirmations sent.
    pub fn shipping_confirmation_count(&self) -> usize {
        self.state.read().unwrap().shipping_confirmations.len()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send_order_confirmation(
        &self,
        order: &Order,
        email: &str,
    ) -> Result<Delivery, StepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(StepError::retryable("mail provider unavailable"));
        }

        state
            .order_confirmations
            .push((order.id(), email.to_string()));
        state.next_id += 1;
        Ok(Delivery {
            message_id: format!("MSG-{:04}", state.next_id),
        })
    }

    async fn send_shipping_confirmation(
        &self,
        order: &Order,
        email: &str,
        _tracking_number: &str,
        _carrier: &str,
        _estimated_delivery: DateTime<Utc>,
    ) -> Result<(), StepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(StepError::retryable("mail provider unavailable"));
        }

        state
            .shipping_confirmations
            .push((order.id(), email.to_string()));
        Ok(())
    }
}
