//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Money, Order, OrderId};

use crate::retry::StepError;

/// Result of a successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// Transaction ID assigned by the payment provider.
    pub transaction_id: String,
}

/// Result of a successful refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    /// Transaction ID of the refund itself.
    pub refund_transaction_id: String,
}

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges the customer for the order's total amount. A decline is a
    /// terminal failure.
    async fn process_payment(&self, order: &Order) -> Result<PaymentReceipt, StepError>;

    /// Refunds a previously completed charge.
    async fn refund_payment(
        &self,
        order_id: OrderId,
        transaction_id: &str,
        amount: Money,
    ) -> Result<Refund, StepError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: HashMap<String, (OrderId, Money)>,
    next_txn: u32,
    next_refund: u32,
    fail_on_charge: bool,
    transient_charge_failures: u32,
    charge_attempts: u32,
    refund_calls: u32,
    fail_on_refund: bool,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures charges to be declined.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().fail_on_charge = fail;
    }

    /// Makes the next `n` charge calls fail with a retryable error.
    pub fn fail_charge_transiently(&self, n: u32) {
        self.state.write().unwrap().transient_charge_failures = n;
    }

    /// Configures refunds to fail with a retryable error.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Returns the number of charges that have not been refunded.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }

    /// Returns how many charge attempts were made.
    pub fn charge_attempt_count(&self) -> u32 {
        self.state.read().unwrap().charge_attempts
    }

    /// Returns how many times `refund_payment` was invoked.
    pub fn refund_call_count(&self) -> u32 {
        self.state.read().unwrap().refund_calls
    }

    /// Returns true if a charge exists with the given transaction ID.
    pub fn has_charge(&self, transaction_id: &str) -> bool {
        self.state.read().unwrap().charges.contains_key(transaction_id)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn process_payment(&self, order: &Order) -> Result<PaymentReceipt, StepError> {
        let mut state = self.state.write().unwrap();
        state.charge_attempts += 1;

        if state.transient_charge_failures > 0 {
            state.transient_charge_failures -= 1;
            return Err(StepError::retryable("payment gateway timeout"));
        }

        if state.fail_on_charge {
            return Err(StepError::terminal("payment declined"));
        }

        state.next_txn += 1;
        let transaction_id = format!("TXN-{:04}", state.next_txn);
        state
            .charges
            .insert(transaction_id.clone(), (order.id(), order.total_amount()));

        Ok(PaymentReceipt { transaction_id })
    }

    async fn refund_payment(
        &self,
        _order_id: OrderId,
        transaction_id: &str,
        _amount: Money,
    ) -> Result<Refund, StepError> {
        let mut state = self.state.write().unwrap();
        state.refund_calls += 1;

        if state.fail_on_refund {
            return Err(StepError::retryable("payment gateway timeout"));
        }

        // Refunding an unknown or already-refunded transaction is a no-op;
        // compensation must be safe to re-issue.
        state.charges.remove(transaction_id);

        state.next_refund += 1;
        Ok(Refund {
            refund_transaction_id: format!("REF-{:04}", state.next_refund),
        })
    }
}
