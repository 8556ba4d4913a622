//! Events published on the `Products` topic.

use serde::{Deserialize, Serialize};

use storefront_core::ProductId;

use crate::event::{EventKey, EventType, EventVariant, PRODUCTS_TOPIC, Topic};

/// A product was added to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub amount: i64,
}

/// A product's catalog data or stock changed. Carries the full new state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub amount: i64,
}

/// A product was removed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
}

impl EventVariant for ProductCreated {
    const TOPIC: Topic = PRODUCTS_TOPIC;
    const EVENT_TYPE: EventType = EventType::from_static("Product.Created");

    fn key(&self) -> EventKey {
        EventKey::new(self.product_id.as_str())
    }
}

impl EventVariant for ProductUpdated {
    const TOPIC: Topic = PRODUCTS_TOPIC;
    const EVENT_TYPE: EventType = EventType::from_static("Product.Updated");

    fn key(&self) -> EventKey {
        EventKey::new(self.product_id.as_str())
    }
}

impl EventVariant for ProductDeleted {
    const TOPIC: Topic = PRODUCTS_TOPIC;
    const EVENT_TYPE: EventType = EventType::from_static("Product.Deleted");

    fn key(&self) -> EventKey {
        EventKey::new(self.product_id.as_str())
    }
}
