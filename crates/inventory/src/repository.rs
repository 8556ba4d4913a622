use std::sync::Arc;

use async_trait::async_trait;

use storefront_core::{DomainResult, ProductId};

use crate::item::InventoryItem;

/// Storage for [`InventoryItem`]s.
///
/// Writes are upserts and removals are tolerant of missing items, so
/// replaying the `Products` topic from any offset converges to the same state.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Insert or replace the item with this product id.
    async fn upsert(&self, item: &InventoryItem) -> DomainResult<()>;

    /// `NotFound` if there is no item for the product.
    async fn get(&self, product_id: &ProductId) -> DomainResult<InventoryItem>;

    async fn list(&self) -> DomainResult<Vec<InventoryItem>>;

    /// Remove the item. Returns whether it existed.
    async fn remove(&self, product_id: &ProductId) -> DomainResult<bool>;
}

#[async_trait]
impl<R> InventoryRepository for Arc<R>
where
    R: InventoryRepository + ?Sized,
{
    async fn upsert(&self, item: &InventoryItem) -> DomainResult<()> {
        (**self).upsert(item).await
    }

    async fn get(&self, product_id: &ProductId) -> DomainResult<InventoryItem> {
        (**self).get(product_id).await
    }

    async fn list(&self) -> DomainResult<Vec<InventoryItem>> {
        (**self).list().await
    }

    async fn remove(&self, product_id: &ProductId) -> DomainResult<bool> {
        (**self).remove(product_id).await
    }
}
