use async_trait::async_trait;
use tracing::debug;

use storefront_core::DomainError;
use storefront_events::{DeliveryContext, Event, Handler};

use crate::product::Product;
use crate::repository::ProductRepository;

/// Applies `Products` events to a [`ProductRepository`].
///
/// Redelivered and replayed events are absorbed: a `ProductCreated` whose id
/// is already stored and a `ProductDeleted` for a product that is already
/// gone both succeed without changes. The stored row may already hold a later
/// `ProductUpdated`, so a replayed create never overwrites it.
pub struct ProductEventHandler<R> {
    repository: R,
}

impl<R: ProductRepository> ProductEventHandler<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R> Handler for ProductEventHandler<R>
where
    R: ProductRepository + 'static,
{
    async fn handle(&self, event: &Event, ctx: &DeliveryContext) -> anyhow::Result<()> {
        match event {
            Event::ProductCreated(e) => {
                let product = Product::from(e.clone());
                match self.repository.store(&product).await {
                    Err(DomainError::Conflict(_)) => {
                        debug!(product_id = %product.product_id(), attempt = ctx.attempt, "product already stored");
                    }
                    other => other?,
                }
            }
            Event::ProductUpdated(e) => {
                self.repository.update(&Product::from(e.clone())).await?;
            }
            Event::ProductDeleted(e) => match self.repository.delete(&e.product_id).await {
                Err(err) if err.is_not_found() => {
                    debug!(product_id = %e.product_id, "product already deleted");
                }
                other => other?,
            },
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use storefront_core::{DomainResult, ProductId};
    use storefront_events::{PRODUCTS_TOPIC, ProductCreated, ProductDeleted};

    /// Strict store: conflicts on duplicate ids, not-found on missing ones.
    #[derive(Default)]
    struct Strict(Mutex<HashMap<ProductId, Product>>);

    #[async_trait]
    impl ProductRepository for Strict {
        async fn store(&self, product: &Product) -> DomainResult<()> {
            let mut map = self.0.lock().unwrap();
            if map.contains_key(product.product_id()) {
                return Err(DomainError::conflict("duplicate id"));
            }
            map.insert(product.product_id().clone(), product.clone());
            Ok(())
        }

        async fn find_by_id(&self, product_id: &ProductId) -> DomainResult<Product> {
            self.0
                .lock()
                .unwrap()
                .get(product_id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("product"))
        }

        async fn find_by_name(&self, _name: &str) -> DomainResult<Product> {
            Err(DomainError::not_found("product"))
        }

        async fn list(&self) -> DomainResult<Vec<Product>> {
            Ok(self.0.lock().unwrap().values().cloned().collect())
        }

        async fn update(&self, product: &Product) -> DomainResult<()> {
            let mut map = self.0.lock().unwrap();
            match map.get_mut(product.product_id()) {
                Some(slot) => {
                    *slot = product.clone();
                    Ok(())
                }
                None => Err(DomainError::not_found("product")),
            }
        }

        async fn delete(&self, product_id: &ProductId) -> DomainResult<()> {
            self.0
                .lock()
                .unwrap()
                .remove(product_id)
                .map(|_| ())
                .ok_or_else(|| DomainError::not_found("product"))
        }
    }

    fn ctx(attempt: u32) -> DeliveryContext {
        DeliveryContext {
            topic: PRODUCTS_TOPIC,
            partition: 0,
            offset: 0,
            attempt,
        }
    }

    fn created(price: f64) -> Event {
        ProductCreated {
            product_id: "p1".into(),
            name: "Widget".into(),
            description: "A very useful widget".into(),
            price,
            amount: 5,
        }
        .into()
    }

    #[tokio::test]
    async fn redelivered_create_and_delete_are_no_ops() {
        let handler = ProductEventHandler::new(Strict::default());

        handler.handle(&created(9.99), &ctx(1)).await.unwrap();
        handler.handle(&created(9.99), &ctx(2)).await.unwrap();
        assert_eq!(handler.repository.list().await.unwrap().len(), 1);

        let deleted: Event = ProductDeleted {
            product_id: "p1".into(),
        }
        .into();
        handler.handle(&deleted, &ctx(1)).await.unwrap();
        handler.handle(&deleted, &ctx(2)).await.unwrap();
        assert!(handler.repository.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replayed_create_keeps_the_later_state() {
        let handler = ProductEventHandler::new(Strict::default());
        let later = Product::new("p1".into(), "Widget", "A very useful widget", 12.0, 5);
        handler.repository.store(&later).await.unwrap();

        handler.handle(&created(9.99), &ctx(1)).await.unwrap();

        assert_eq!(handler.repository.find_by_id(&"p1".into()).await.unwrap(), later);
    }

    #[tokio::test]
    async fn update_of_unknown_product_fails_for_redelivery() {
        let handler = ProductEventHandler::new(Strict::default());
        let updated: Event = storefront_events::ProductUpdated {
            product_id: "p1".into(),
            name: "Widget".into(),
            description: "A very useful widget".into(),
            price: 1.0,
            amount: 1,
        }
        .into();

        assert!(handler.handle(&updated, &ctx(1)).await.is_err());
    }
}
