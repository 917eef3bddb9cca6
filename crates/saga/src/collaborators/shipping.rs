//! Shipping service trait and in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::{Order, OrderId};
use serde::{Deserialize, Serialize};

use crate::retry::StepError;

/// Carrier status of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TrackingStatus {
    /// Shipment registered, not yet picked up.
    #[default]
    Processing,

    /// Carrier has collected the parcel.
    PickedUp,

    /// Parcel is moving through the carrier network.
    InTransit,

    /// Parcel is on the delivery vehicle.
    OutForDelivery,

    /// Parcel was delivered (terminal).
    Delivered,

    /// Carrier reported a problem (terminal).
    Exception,
}

impl TrackingStatus {
    /// Returns true if the carrier will report nothing further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackingStatus::Delivered | TrackingStatus::Exception)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Processing => "Processing",
            TrackingStatus::PickedUp => "PickedUp",
            TrackingStatus::InTransit => "InTransit",
            TrackingStatus::OutForDelivery => "OutForDelivery",
            TrackingStatus::Delivered => "Delivered",
            TrackingStatus::Exception => "Exception",
        }
    }
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a successful shipment creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shipment {
    /// Tracking number assigned by the carrier.
    pub tracking_number: String,

    /// Carrier name.
    pub carrier: String,

    /// Estimated delivery date.
    pub estimated_delivery: DateTime<Utc>,
}

/// One tracking observation from the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    /// Current carrier status.
    pub status: TrackingStatus,

    /// Last known location, if the carrier reports one.
    pub location: Option<String>,

    /// When the observation was made.
    pub timestamp: DateTime<Utc>,
}

/// Trait for shipping operations.
#[async_trait]
pub trait ShippingService: Send + Sync {
    /// Creates a shipment for an order.
    async fn create_shipment(&self, order: &Order) -> Result<Shipment, StepError>;

    /// Returns the current tracking status for a shipment.
    async fn track_shipment(&self, tracking_number: &str) -> Result<TrackingUpdate, StepError>;
}

#[derive(Debug, Default)]
struct InMemoryShippingState {
    shipments: HashMap<String, OrderId>,
    next_id: u32,
    fail_on_create: bool,
    transient_create_failures: u32,
    tracking_script: VecDeque<TrackingStatus>,
    track_calls: u32,
}

/// In-memory shipping service for testing.
///
/// Tracking follows a configurable script of statuses, one per call;
/// once the script is exhausted every further call reports `Delivered`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingService {
    state: Arc<RwLock<InMemoryShippingState>>,
}

impl InMemoryShippingService {
    /// Creates a new in-memory shipping service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures shipment creation to fail terminally.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Makes the next `n` create calls fail with a retryable error.
    pub fn fail_create_transiently(&self, n: u32) {
        self.state.write().unwrap().transient_create_failures = n;
    }

    /// Sets the sequence of statuses tracking calls will report.
    pub fn set_tracking_script(&self, script: Vec<TrackingStatus>) {
        self.state.write().unwrap().tracking_script = script.into();
    }

    /// Returns the number of created shipments.
    pub fn shipment_count(&self) -> usize {
        self.state.read().unwrap().shipments.len()
    }

    /// Returns true if a shipment exists with the given tracking number.
    pub fn has_shipment(&self, tracking_number: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .shipments
            .contains_key(tracking_number)
    }

    /// Returns how many times `track_shipment` was invoked.
    pub fn track_call_count(&self) -> u32 {
        self.state.read().unwrap().track_calls
    }
}

#[async_trait]
impl ShippingService for InMemoryShippingService {
    async fn create_shipment(&self, order: &Order) -> Result<Shipment, StepError> {
        let mut state = self.state.write().unwrap();

        if state.transient_create_failures > 0 {
            state.transient_create_failures -= 1;
            return Err(StepError::retryable("carrier API unavailable"));
        }

        if state.fail_on_create {
            return Err(StepError::terminal("no carrier available for destination"));
        }

        state.next_id += 1;
        let tracking_number = format!("TRK-{:04}", state.next_id);
        state.shipments.insert(tracking_number.clone(), order.id());

        Ok(Shipment {
            tracking_number,
            carrier: "ACME Logistics".to_string(),
            estimated_delivery: Utc::now() + Duration::days(3),
        })
    }

    async fn track_shipment(&self, tracking_number: &str) -> Result<TrackingUpdate, StepError> {
        let mut state = self.state.write().unwrap();
        state.track_calls += 1;

        if !state.shipments.contains_key(tracking_number) {
            return Err(StepError::terminal(format!(
                "unknown tracking number {}",
                tracking_number
            )));
        }

        let status = state
            .tracking_script
            .pop_front()
            .unwrap_or(TrackingStatus::Delivered);
        let location = match status {
            TrackingStatus::Delivered => Some("destination".to_string()),
            TrackingStatus::Processing => None,
            _ => Some("distribution center".to_string()),
        };

        Ok(TrackingUpdate {
            status,
            location,
            timestamp: Utc::now(),
        })
    }
}
