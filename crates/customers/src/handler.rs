use async_trait::async_trait;
use tracing::debug;

use storefront_core::DomainError;
use storefront_events::{DeliveryContext, Event, Handler};

use crate::customer::{Customer, ShippingAddress};
use crate::repository::CustomerRepository;

/// Applies `Customers` events to a [`CustomerRepository`].
///
/// A `CustomerCreated` for a stored id and a `CustomerDeleted` for a missing
/// one are treated as already applied.
pub struct CustomerEventHandler<R> {
    repository: R,
}

impl<R: CustomerRepository> CustomerEventHandler<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R> Handler for CustomerEventHandler<R>
where
    R: CustomerRepository + 'static,
{
    async fn handle(&self, event: &Event, _ctx: &DeliveryContext) -> anyhow::Result<()> {
        match event {
            Event::CustomerCreated(e) => {
                let customer = Customer::from(e.clone());
                match self.repository.store(&customer).await {
                    Err(DomainError::Conflict(_)) => {
                        debug!(customer_id = %customer.customer_id(), "customer already stored");
                    }
                    other => other?,
                }
            }
            Event::CustomerShippingAddressUpdated(e) => {
                let mut customer = self.repository.find_by_id(&e.customer_id).await?;
                customer.set_shipping_address(ShippingAddress::from(e));
                self.repository.update(&customer).await?;
            }
            Event::CustomerDeleted(e) => match self.repository.delete(&e.customer_id).await {
                Err(err) if err.is_not_found() => {
                    debug!(customer_id = %e.customer_id, "customer already deleted");
                }
                other => other?,
            },
            _ => {}
        }
        Ok(())
    }
}
