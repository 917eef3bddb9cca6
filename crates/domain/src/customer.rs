//! Customer record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{Address, CustomerId};

/// A customer as known to the order repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Unique customer identifier.
    pub id: CustomerId,

    /// Given name.
    pub first_name: String,

    /// Family name.
    pub last_name: String,

    /// Email address notifications are sent to.
    pub email: String,

    /// Phone number.
    pub phone: String,

    /// Default shipping address.
    pub default_shipping_address: Address,

    /// Default billing address.
    pub default_billing_address: Address,

    /// When the customer record was created.
    pub created_at: DateTime<Utc>,

    /// When the customer record was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Creates a new customer record.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        address: Address,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CustomerId::new(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            phone: phone.into(),
            default_shipping_address: address.clone(),
            default_billing_address: address,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the customer's full name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        let customer = Customer::new(
            "Ada",
            "Lovelace",
            "ada@example.com",
            "555-0100",
            Address::default(),
        );
        assert_eq!(customer.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let customer = Customer::new(
            "Ada",
            "Lovelace",
            "ada@example.com",
            "555-0100",
            Address::default(),
        );
        let json = serde_json::to_string(&customer).unwrap();
        let deserialized: Customer = serde_json::from_str(&json).unwrap();
        assert_eq!(customer, deserialized);
    }
}
