use std::sync::Arc;

use async_trait::async_trait;

use storefront_core::{CustomerId, DomainResult};

use crate::customer::Customer;

/// Customer read model. `NotFound` for a missing id or email, `Conflict`
/// when storing an id that already exists.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn store(&self, customer: &Customer) -> DomainResult<()>;

    async fn find_by_id(&self, customer_id: &CustomerId) -> DomainResult<Customer>;

    async fn find_by_email(&self, email: &str) -> DomainResult<Customer>;

    async fn update(&self, customer: &Customer) -> DomainResult<()>;

    async fn delete(&self, customer_id: &CustomerId) -> DomainResult<()>;
}

#[async_trait]
impl<R> CustomerRepository for Arc<R>
where
    R: CustomerRepository + ?Sized,
{
    async fn store(&self, customer: &Customer) -> DomainResult<()> {
        (**self).store(customer).await
    }

    async fn find_by_id(&self, customer_id: &CustomerId) -> DomainResult<Customer> {
        (**self).find_by_id(customer_id).await
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Customer> {
        (**self).find_by_email(email).await
    }

    async fn update(&self, customer: &Customer) -> DomainResult<()> {
        (**self).update(customer).await
    }

    async fn delete(&self, customer_id: &CustomerId) -> DomainResult<()> {
        (**self).delete(customer_id).await
    }
}
