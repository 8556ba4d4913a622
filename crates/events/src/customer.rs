//! Events published on the `Customers` topic.

use serde::{Deserialize, Serialize};

use storefront_core::CustomerId;

use crate::event::{CUSTOMERS_TOPIC, EventKey, EventType, EventVariant, Topic};

/// A customer registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCreated {
    pub customer_id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// A customer's shipping address was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerShippingAddressUpdated {
    pub customer_id: CustomerId,
    pub country: String,
    pub city: String,
    pub zip_code: String,
    pub street: String,
}

/// A customer was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDeleted {
    pub customer_id: CustomerId,
}

impl EventVariant for CustomerCreated {
    const TOPIC: Topic = CUSTOMERS_TOPIC;
    const EVENT_TYPE: EventType = EventType::from_static("Customer.Created");

    fn key(&self) -> EventKey {
        EventKey::new(self.customer_id.as_str())
    }
}

impl EventVariant for CustomerShippingAddressUpdated {
    const TOPIC: Topic = CUSTOMERS_TOPIC;
    const EVENT_TYPE: EventType = EventType::from_static("Customer.ShippingAddressUpdated");

    fn key(&self) -> EventKey {
        EventKey::new(self.customer_id.as_str())
    }
}

impl EventVariant for CustomerDeleted {
    const TOPIC: Topic = CUSTOMERS_TOPIC;
    const EVENT_TYPE: EventType = EventType::from_static("Customer.Deleted");

    fn key(&self) -> EventKey {
        EventKey::new(self.customer_id.as_str())
    }
}
