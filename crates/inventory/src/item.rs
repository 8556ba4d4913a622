use serde::{Deserialize, Serialize};

use storefront_core::{Entity, ProductId};
use storefront_events::{ProductCreated, ProductUpdated};

/// Stock record for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub amount: i64,
}

impl InventoryItem {
    pub fn in_stock(&self) -> bool {
        self.amount > 0
    }
}

impl Entity for InventoryItem {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }
}

impl From<&ProductCreated> for InventoryItem {
    fn from(e: &ProductCreated) -> Self {
        Self {
            product_id: e.product_id.clone(),
            name: e.name.clone(),
            description: e.description.clone(),
            price: e.price,
            amount: e.amount,
        }
    }
}

impl From<&ProductUpdated> for InventoryItem {
    fn from(e: &ProductUpdated) -> Self {
        Self {
            product_id: e.product_id.clone(),
            name: e.name.clone(),
            description: e.description.clone(),
            price: e.price,
            amount: e.amount,
        }
    }
}
