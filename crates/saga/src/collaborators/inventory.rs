//! Inventory service trait and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{OrderItem, ProductId};

use crate::retry::StepError;

/// Per-product availability as reported by the inventory collaborator.
#[derive(Debug, Clone)]
pub struct InventoryReport {
    availability: HashMap<ProductId, bool>,
}

impl InventoryReport {
    /// Creates a report from a product availability mapping.
    pub fn new(availability: HashMap<ProductId, bool>) -> Self {
        Self { availability }
    }

    /// Returns true if every checked product is in stock.
    pub fn all_in_stock(&self) -> bool {
        self.availability.values().all(|in_stock| *in_stock)
    }

    /// Returns the products that are not in stock.
    pub fn unavailable(&self) -> Vec<ProductId> {
        let mut products: Vec<ProductId> = self
            .availability
            .iter()
            .filter(|(_, in_stock)| !**in_stock)
            .map(|(id, _)| id.clone())
            .collect();
        products.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        products
    }

    /// Returns the raw availability mapping.
    pub fn availability(&self) -> &HashMap<ProductId, bool> {
        &self.availability
    }
}

/// Trait for inventory management operations.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Reports which of the given products are in stock.
    async fn check_inventory(
        &self,
        product_ids: &[ProductId],
    ) -> Result<InventoryReport, StepError>;

    /// Reserves stock for the given items. A refusal (insufficient stock)
    /// is a terminal failure.
    async fn reserve_inventory(&self, items: &[OrderItem]) -> Result<(), StepError>;

    /// Releases a previous reservation. Safe to invoke for exactly the
    /// items that were recorded as reserved; unknown items are a no-op.
    async fn release_inventory(&self, items: &[OrderItem]) -> Result<(), StepError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    unavailable: HashSet<ProductId>,
    reservations: Vec<Vec<OrderItem>>,
    fail_on_reserve: bool,
    transient_check_failures: u32,
    transient_reserve_failures: u32,
    check_calls: u32,
    release_calls: u32,
}

/// In-memory inventory service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryService {
    /// Creates a new in-memory inventory service with everything in stock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a product as out of stock for subsequent checks.
    pub fn mark_unavailable(&self, product_id: impl Into<ProductId>) {
        self.state.write().unwrap().unavailable.insert(product_id.into());
    }

    /// Configures reservation calls to be refused (insufficient stock).
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().unwrap().fail_on_reserve = fail;
    }

    /// Makes the next `n` check calls fail with a retryable error.
    pub fn fail_check_transiently(&self, n: u32) {
        self.state.write().unwrap().transient_check_failures = n;
    }

    /// Makes the next `n` reserve calls fail with a retryable error.
    pub fn fail_reserve_transiently(&self, n: u32) {
        self.state.write().unwrap().transient_reserve_failures = n;
    }

    /// Returns the number of active reservations.
    pub fn reservation_count(&self) -> usize {
        self.state.read().unwrap().reservations.len()
    }

    /// Returns how many times `check_inventory` was invoked.
    pub fn check_call_count(&self) -> u32 {
        self.state.read().unwrap().check_calls
    }

    /// Returns how many times `release_inventory` was invoked.
    pub fn release_call_count(&self) -> u32 {
        self.state.read().unwrap().release_calls
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn check_inventory(
        &self,
        product_ids: &[ProductId],
    ) -> Result<InventoryReport, StepError> {
        let mut state = self.state.write().unwrap();
        state.check_calls += 1;

        if state.transient_check_failures > 0 {
            state.transient_check_failures -= 1;
            return Err(StepError::retryable("inventory service unavailable"));
        }

        let availability = product_ids
            .iter()
            .map(|id| (id.clone(), !state.unavailable.contains(id)))
            .collect();
        Ok(InventoryReport::new(availability))
    }

    async fn reserve_inventory(&self, items: &[OrderItem]) -> Result<(), StepError> {
        let mut state = self.state.write().unwrap();

        if state.transient_reserve_failures > 0 {
            state.transient_reserve_failures -= 1;
            return Err(StepError::retryable("inventory service unavailable"));
        }

        if state.fail_on_reserve {
            return Err(StepError::terminal("insufficient stock"));
        }

        state.reservations.push(items.to_vec());
        Ok(())
    }

    async fn release_inventory(&self, items: &[OrderItem]) -> Result<(), StepError> {
        let mut state = self.state.write().unwrap();
        state.release_calls += 1;

        if let Some(pos) = state.reservations.iter().position(|lot| lot == items) {
            state.reservations.remove(pos);
        }
        Ok(())
    }
}
