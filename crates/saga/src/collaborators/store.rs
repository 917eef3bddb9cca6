//! Order repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Customer, CustomerId, Order, OrderId, OrderStatus};

use crate::retry::StepError;

/// Trait for the order/customer persistence collaborator.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists an order. Idempotent upsert: persisting the same order
    /// twice yields the same stored state.
    async fn persist_order(&self, order: &Order) -> Result<(), StepError>;

    /// Fetches an order by ID. `Ok(None)` means the order does not exist.
    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, StepError>;

    /// Updates the status of a stored order.
    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), StepError>;

    /// Fetches a customer by ID. `Ok(None)` means the customer does not exist.
    async fn fetch_customer(&self, customer_id: CustomerId)
    -> Result<Option<Customer>, StepError>;
}

#[derive(Debug, Default)]
struct InMemoryRepositoryState {
    orders: HashMap<OrderId, Order>,
    customers: HashMap<CustomerId, Customer>,
    persist_calls: u32,
    status_updates: Vec<(OrderId, OrderStatus)>,
    transient_persist_failures: u32,
    fail_on_update_status: bool,
}

/// In-memory order repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<InMemoryRepositoryState>>,
}

impl InMemoryOrderRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a customer.
    pub fn add_customer(&self, customer: Customer) {
        let mut state = self.state.write().unwrap();
        state.customers.insert(customer.id, customer);
    }

    /// Makes the next `n` persist calls fail with a retryable error.
    pub fn fail_persist_transiently(&self, n: u32) {
        self.state.write().unwrap().transient_persist_failures = n;
    }

    /// Makes every status update fail with a retryable error.
    pub fn set_fail_on_update_status(&self, fail: bool) {
        self.state.write().unwrap().fail_on_update_status = fail;
    }

    /// Returns the number of stored orders.
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }

    /// Returns how many times `persist_order` was invoked.
    pub fn persist_call_count(&self) -> u32 {
        self.state.read().unwrap().persist_calls
    }

    /// Returns the stored status of an order, if it exists.
    pub fn stored_status(&self, order_id: OrderId) -> Option<OrderStatus> {
        self.state
            .read()
            .unwrap()
            .orders
            .get(&order_id)
            .map(|order| order.status())
    }

    /// Returns the recorded status-update history.
    pub fn status_updates(&self) -> Vec<(OrderId, OrderStatus)> {
        self.state.read().unwrap().status_updates.clone()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn persist_order(&self, order: &Order) -> Result<(), StepError> {
        let mut state = self.state.write().unwrap();
        state.persist_calls += 1;

        if state.transient_persist_failures > 0 {
            state.transient_persist_failures -= 1;
            return Err(StepError::retryable("database connection lost"));
        }

        state.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, StepError> {
        let state = self.state.read().unwrap();
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), StepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_update_status {
            return Err(StepError::retryable("database connection lost"));
        }

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StepError::terminal(format!("order {} not found", order_id)))?;
        order
            .set_status(status)
            .map_err(|err| StepError::terminal(err.to_string()))?;
        state.status_updates.push((order_id, status));
        Ok(())
    }

    async fn fetch_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<Customer>, StepError> {
        let state = self.state.read().unwrap();
        Ok(state.customers.get(&customer_id).cloned())
    }
}
