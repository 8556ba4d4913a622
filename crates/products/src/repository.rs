use std::sync::Arc;

use async_trait::async_trait;

use storefront_core::{DomainResult, ProductId};

use crate::product::Product;

/// Product read model.
///
/// Written only by [`crate::ProductEventHandler`]; read by the service for
/// lookups and uniqueness checks.
///
/// Errors: `NotFound` for a missing id or name, `Conflict` when storing an id
/// that already exists, `Internal` when the backing store fails.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn store(&self, product: &Product) -> DomainResult<()>;

    async fn find_by_id(&self, product_id: &ProductId) -> DomainResult<Product>;

    async fn find_by_name(&self, name: &str) -> DomainResult<Product>;

    async fn list(&self) -> DomainResult<Vec<Product>>;

    async fn update(&self, product: &Product) -> DomainResult<()>;

    async fn delete(&self, product_id: &ProductId) -> DomainResult<()>;
}

#[async_trait]
impl<R> ProductRepository for Arc<R>
where
    R: ProductRepository + ?Sized,
{
    async fn store(&self, product: &Product) -> DomainResult<()> {
        (**self).store(product).await
    }

    async fn find_by_id(&self, product_id: &ProductId) -> DomainResult<Product> {
        (**self).find_by_id(product_id).await
    }

    async fn find_by_name(&self, name: &str) -> DomainResult<Product> {
        (**self).find_by_name(name).await
    }

    async fn list(&self) -> DomainResult<Vec<Product>> {
        (**self).list().await
    }

    async fn update(&self, product: &Product) -> DomainResult<()> {
        (**self).update(product).await
    }

    async fn delete(&self, product_id: &ProductId) -> DomainResult<()> {
        (**self).delete(product_id).await
    }
}
