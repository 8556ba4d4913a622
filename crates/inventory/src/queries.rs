use storefront_core::{DomainResult, ProductId};

use crate::item::InventoryItem;
use crate::repository::InventoryRepository;

/// Read-only access to the inventory read model.
pub struct InventoryQueries<R> {
    repository: R,
}

impl<R: InventoryRepository> InventoryQueries<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub async fn get(&self, product_id: &ProductId) -> DomainResult<InventoryItem> {
        self.repository.get(product_id).await
    }

    /// All items, ordered by product id.
    pub async fn list(&self) -> DomainResult<Vec<InventoryItem>> {
        let mut items = self.repository.list().await?;
        items.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(items)
    }

    /// Items with a positive amount, ordered by product id.
    pub async fn in_stock(&self) -> DomainResult<Vec<InventoryItem>> {
        let mut items = self.list().await?;
        items.retain(InventoryItem::in_stock);
        Ok(items)
    }
}
