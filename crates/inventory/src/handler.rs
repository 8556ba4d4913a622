use async_trait::async_trait;
use tracing::debug;

use storefront_events::{DeliveryContext, Event, Handler};

use crate::item::InventoryItem;
use crate::repository::InventoryRepository;

/// Keeps the inventory read model in step with the `Products` topic.
///
/// Created and updated products are upserted; deletions remove the item.
/// Every operation is idempotent, so redelivery is harmless.
pub struct InventoryHandler<R> {
    repository: R,
}

impl<R: InventoryRepository> InventoryHandler<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R> Handler for InventoryHandler<R>
where
    R: InventoryRepository + 'static,
{
    async fn handle(&self, event: &Event, ctx: &DeliveryContext) -> anyhow::Result<()> {
        match event {
            Event::ProductCreated(e) => self.repository.upsert(&InventoryItem::from(e)).await?,
            Event::ProductUpdated(e) => self.repository.upsert(&InventoryItem::from(e)).await?,
            Event::ProductDeleted(e) => {
                if !self.repository.remove(&e.product_id).await? {
                    debug!(product_id = %e.product_id, offset = ctx.offset, "inventory item already removed");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::InventoryQueries;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use storefront_core::{DomainError, DomainResult, ProductId};
    use storefront_events::{PRODUCTS_TOPIC, ProductCreated, ProductDeleted, ProductUpdated};

    #[derive(Default)]
    struct Items(Mutex<HashMap<ProductId, InventoryItem>>);

    #[async_trait]
    impl InventoryRepository for Items {
        async fn upsert(&self, item: &InventoryItem) -> DomainResult<()> {
            self.0
                .lock()
                .unwrap()
                .insert(item.product_id.clone(), item.clone());
            Ok(())
        }

        async fn get(&self, product_id: &ProductId) -> DomainResult<InventoryItem> {
            self.0
                .lock()
                .unwrap()
                .get(product_id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("inventory item {product_id}")))
        }

        async fn list(&self) -> DomainResult<Vec<InventoryItem>> {
            Ok(self.0.lock().unwrap().values().cloned().collect())
        }

        async fn remove(&self, product_id: &ProductId) -> DomainResult<bool> {
            Ok(self.0.lock().unwrap().remove(product_id).is_some())
        }
    }

    fn ctx() -> DeliveryContext {
        DeliveryContext {
            topic: PRODUCTS_TOPIC,
            partition: 0,
            offset: 0,
            attempt: 1,
        }
    }

    fn created(id: &str, amount: i64) -> Event {
        ProductCreated {
            product_id: id.into(),
            name: "Widget".into(),
            description: "A very useful widget".into(),
            price: 9.99,
            amount,
        }
        .into()
    }

    #[tokio::test]
    async fn product_lifecycle_is_mirrored() {
        let items = Arc::new(Items::default());
        let handler = InventoryHandler::new(Arc::clone(&items));
        let queries = InventoryQueries::new(Arc::clone(&items));

        handler.handle(&created("p1", 5), &ctx()).await.unwrap();
        let updated: Event = ProductUpdated {
            product_id: "p1".into(),
            name: "Widget".into(),
            description: "A very useful widget".into(),
            price: 9.99,
            amount: 0,
        }
        .into();
        handler.handle(&updated, &ctx()).await.unwrap();
        assert_eq!(queries.get(&"p1".into()).await.unwrap().amount, 0);

        let deleted: Event = ProductDeleted {
            product_id: "p1".into(),
        }
        .into();
        handler.handle(&deleted, &ctx()).await.unwrap();
        handler.handle(&deleted, &ctx()).await.unwrap();
        assert!(queries.get(&"p1".into()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn in_stock_lists_only_positive_amounts_in_id_order() {
        let items = Arc::new(Items::default());
        let handler = InventoryHandler::new(Arc::clone(&items));
        for (id, amount) in [("p3", 1), ("p1", 2), ("p2", 0)] {
            handler.handle(&created(id, amount), &ctx()).await.unwrap();
        }

        let queries = InventoryQueries::new(items);
        let ids: Vec<String> = queries
            .in_stock()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.product_id.into_inner())
            .collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        assert_eq!(queries.list().await.unwrap().len(), 3);
    }
}
