use serde::{Deserialize, Serialize};

use storefront_core::{Entity, ProductId};
use storefront_events::{ProductCreated, ProductDeleted, ProductUpdated};

/// A catalog product, as held in a service's read model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    product_id: ProductId,
    name: String,
    description: String,
    price: f64,
    amount: i64,
}

impl Product {
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        description: impl Into<String>,
        price: f64,
        amount: i64,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            description: description.into(),
            price,
            amount,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn in_stock(&self) -> bool {
        self.amount > 0
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn set_price(&mut self, price: f64) {
        self.price = price;
    }

    /// Apply a stock delta. Stock never goes below zero.
    pub fn adjust_stock(&mut self, delta: i64) {
        self.amount = self.amount.saturating_add(delta).max(0);
    }

    pub fn to_created(&self) -> ProductCreated {
        ProductCreated {
            product_id: self.product_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price,
            amount: self.amount,
        }
    }

    pub fn to_updated(&self) -> ProductUpdated {
        ProductUpdated {
            product_id: self.product_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price,
            amount: self.amount,
        }
    }

    pub fn to_deleted(&self) -> ProductDeleted {
        ProductDeleted {
            product_id: self.product_id.clone(),
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }
}

impl From<ProductCreated> for Product {
    fn from(e: ProductCreated) -> Self {
        Self::new(e.product_id, e.name, e.description, e.price, e.amount)
    }
}

impl From<ProductUpdated> for Product {
    fn from(e: ProductUpdated) -> Self {
        Self::new(e.product_id, e.name, e.description, e.price, e.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(amount: i64) -> Product {
        Product::new("p1".into(), "Widget", "A very useful widget", 9.99, amount)
    }

    #[test]
    fn stock_is_floored_at_zero() {
        let mut product = widget(5);
        product.adjust_stock(-8);
        assert_eq!(product.amount(), 0);
        assert!(!product.in_stock());

        product.adjust_stock(3);
        assert_eq!(product.amount(), 3);
    }

    #[test]
    fn created_event_round_trips_into_the_same_product() {
        let product = widget(5);
        assert_eq!(Product::from(product.to_created()), product);
    }
}
