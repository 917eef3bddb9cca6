//! Receipt generation/storage trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Order, OrderId};

use crate::retry::StepError;

/// Result of a successfully generated and stored receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Location of the stored receipt document.
    pub file_url: String,
}

/// Trait for receipt generation and storage.
#[async_trait]
pub trait ReceiptService: Send + Sync {
    /// Renders a receipt for the order and stores it, returning its URL.
    async fn generate_and_store_receipt(&self, order: &Order) -> Result<Receipt, StepError>;
}

#[derive(Debug, Default)]
struct InMemoryReceiptState {
    receipts: HashMap<OrderId, String>,
    fail_on_generate: bool,
}

/// In-memory receipt service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReceiptService {
    state: Arc<RwLock<InMemoryReceiptState>>,
}

impl InMemoryReceiptService {
    /// Creates a new in-memory receipt service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures receipt generation to fail.
    pub fn set_fail_on_generate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_generate = fail;
    }

    /// Returns the number of stored receipts.
    pub fn receipt_count(&self) -> usize {
        self.state.read().unwrap().receipts.len()
    }
}

#[async_trait]
impl ReceiptService for InMemoryReceiptService {
    async fn generate_and_store_receipt(&self, order: &Order) -> Result<Receipt, StepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_generate {
            return Err(StepError::retryable("storage unavailable"));
        }

        let file_url = format!("receipts/{}.pdf", order.id());
        state.receipts.insert(order.id(), file_url.clone());

        Ok(Receipt { file_url })
    }
}
