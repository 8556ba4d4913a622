//! Command side of the catalog.
//!
//! Every write follows the same choreography:
//!
//! 1. validate the request
//! 2. check the local read model (existence, name uniqueness)
//! 3. build the event carrying the full resulting state
//! 4. publish it
//! 5. return the projected product
//!
//! The read model only changes once [`crate::ProductEventHandler`] consumes
//! the event, so a `get_by_id` right after `create` may still answer
//! `NotFound`. Callers that need read-after-write must wait for the handler.

use tracing::{error, info, instrument};

use storefront_core::{DomainError, ProductId};
use storefront_events::{CommandError, CommandResult, Event, Publisher};

use crate::product::Product;
use crate::repository::ProductRepository;
use crate::request::{CreateProductRequest, RestockProductRequest, UpdateProductRequest};

pub struct ProductService<R, P> {
    repository: R,
    publisher: P,
}

impl<R, P> ProductService<R, P>
where
    R: ProductRepository,
    P: Publisher,
{
    pub fn new(repository: R, publisher: P) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, mut request: CreateProductRequest) -> CommandResult<Product> {
        request.validate()?;

        match self.repository.find_by_name(&request.name).await {
            Ok(_) => {
                return Err(DomainError::conflict(format!(
                    "product with name={} already exists",
                    request.name
                ))
                .into());
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(logged("create", err.into())),
        }

        let product = Product::new(
            ProductId::generate(),
            request.name,
            request.description,
            request.price,
            request.amount,
        );
        self.publish("create", product.to_created().into()).await?;

        info!(product_id = %product.product_id(), "product creation published");
        Ok(product)
    }

    pub async fn get_by_id(&self, product_id: &ProductId) -> CommandResult<Product> {
        self.repository
            .find_by_id(product_id)
            .await
            .map_err(|err| logged("get_by_id", err.into()))
    }

    pub async fn list(&self) -> CommandResult<Vec<Product>> {
        self.repository
            .list()
            .await
            .map_err(|err| logged("list", err.into()))
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id))]
    pub async fn update(&self, mut request: UpdateProductRequest) -> CommandResult<Product> {
        request.validate()?;

        let mut product = self.find("update", &request.product_id).await?;
        if let Some(name) = request.name {
            product.set_name(name);
        }
        if let Some(description) = request.description {
            product.set_description(description);
        }
        if let Some(price) = request.price {
            product.set_price(price);
        }

        self.publish("update", product.to_updated().into()).await?;
        Ok(product)
    }

    /// Add stock. The resulting amount never drops below zero.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, amount = request.amount))]
    pub async fn restock(&self, request: RestockProductRequest) -> CommandResult<Product> {
        request.validate()?;

        let mut product = self.find("restock", &request.product_id).await?;
        product.adjust_stock(request.amount);

        self.publish("restock", product.to_updated().into()).await?;
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, product_id: &ProductId) -> CommandResult<()> {
        let product = self.find("delete", product_id).await?;
        self.publish("delete", product.to_deleted().into()).await
    }

    async fn find(&self, method: &'static str, product_id: &ProductId) -> CommandResult<Product> {
        self.repository
            .find_by_id(product_id)
            .await
            .map_err(|err| logged(method, err.into()))
    }

    async fn publish(&self, method: &'static str, event: Event) -> CommandResult<()> {
        self.publisher
            .publish(&event)
            .await
            .map_err(|err| logged(method, err.into()))
    }
}

/// Log failures the caller cannot fix (store or broker), pass the rest through.
fn logged(method: &'static str, err: CommandError) -> CommandError {
    if matches!(
        err,
        CommandError::Publish(_) | CommandError::Domain(DomainError::Internal(_))
    ) {
        error!(method, error = %err, "product command failed");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use storefront_core::DomainResult;
    use storefront_events::{BrokerError, PublishError};

    /// Map-backed read model, enough to drive the service.
    #[derive(Default)]
    struct Products(Mutex<BTreeMap<ProductId, Product>>);

    impl Products {
        fn with(products: &[Product]) -> Self {
            let map = products
                .iter()
                .map(|p| (p.product_id().clone(), p.clone()))
                .collect();
            Self(Mutex::new(map))
        }
    }

    #[async_trait]
    impl ProductRepository for Products {
        async fn store(&self, product: &Product) -> DomainResult<()> {
            self.0
                .lock()
                .unwrap()
                .insert(product.product_id().clone(), product.clone());
            Ok(())
        }

        async fn find_by_id(&self, product_id: &ProductId) -> DomainResult<Product> {
            self.0
                .lock()
                .unwrap()
                .get(product_id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("product with id={product_id}")))
        }

        async fn find_by_name(&self, name: &str) -> DomainResult<Product> {
            self.0
                .lock()
                .unwrap()
                .values()
                .find(|p| p.name() == name)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("product with name={name}")))
        }

        async fn list(&self) -> DomainResult<Vec<Product>> {
            Ok(self.0.lock().unwrap().values().cloned().collect())
        }

        async fn update(&self, product: &Product) -> DomainResult<()> {
            self.store(product).await
        }

        async fn delete(&self, product_id: &ProductId) -> DomainResult<()> {
            self.0.lock().unwrap().remove(product_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Published {
        events: Mutex<Vec<Event>>,
        fail: bool,
    }

    #[async_trait]
    impl Publisher for Published {
        async fn publish(&self, event: &Event) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Broker {
                    topic: event.topic().to_string(),
                    event_type: event.event_type().to_string(),
                    attempts: 3,
                    source: BrokerError::Timeout("no ack".into()),
                });
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn widget() -> Product {
        Product::new("p1".into(), "Widget", "A very useful widget", 9.99, 5)
    }

    fn create_request(name: &str) -> CreateProductRequest {
        CreateProductRequest {
            name: name.into(),
            description: "Something for the shelf".into(),
            price: 4.5,
            amount: 2,
        }
    }

    #[tokio::test]
    async fn create_publishes_without_touching_the_read_model() {
        let service = ProductService::new(Products::default(), Published::default());

        let product = service.create(create_request(" Gadget ")).await.unwrap();

        assert_eq!(product.name(), "Gadget");
        assert!(service.repository.list().await.unwrap().is_empty());
        let events = service.publisher.events.lock().unwrap().clone();
        assert_eq!(events, vec![Event::from(product.to_created())]);
    }

    #[tokio::test]
    async fn create_rejects_taken_name_without_publishing() {
        let service = ProductService::new(Products::with(&[widget()]), Published::default());

        let err = service.create(create_request("Widget")).await.unwrap_err();

        assert_eq!(err.status_code(), 409);
        assert!(service.publisher.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_any_lookup() {
        let service = ProductService::new(Products::default(), Published::default());
        let err = service.create(create_request("abc")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn update_publishes_full_merged_state() {
        let service = ProductService::new(Products::with(&[widget()]), Published::default());

        let updated = service
            .update(UpdateProductRequest {
                product_id: "p1".into(),
                name: None,
                description: None,
                price: Some(12.0),
            })
            .await
            .unwrap();

        assert_eq!(updated.price(), 12.0);
        assert_eq!(updated.name(), "Widget");
        let events = service.publisher.events.lock().unwrap().clone();
        assert!(matches!(&events[0], Event::ProductUpdated(e) if e.amount == 5 && e.price == 12.0));
    }

    #[tokio::test]
    async fn restock_adds_to_current_stock() {
        let service = ProductService::new(Products::with(&[widget()]), Published::default());

        let product = service
            .restock(RestockProductRequest {
                product_id: "p1".into(),
                amount: 3,
            })
            .await
            .unwrap();

        assert_eq!(product.amount(), 8);
    }

    #[tokio::test]
    async fn delete_of_unknown_product_is_not_found() {
        let service = ProductService::new(Products::default(), Published::default());
        let err = service.delete(&"nope".into()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(service.publisher.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_reported_as_bad_gateway() {
        let publisher = Published {
            fail: true,
            ..Published::default()
        };
        let service = ProductService::new(Products::with(&[widget()]), publisher);

        let err = service.delete(&"p1".into()).await.unwrap_err();

        assert!(matches!(err, CommandError::Publish(_)));
        assert_eq!(err.status_code(), 502);
        // Nothing was written locally, so there is nothing to undo.
        assert!(service.repository.find_by_id(&"p1".into()).await.is_ok());
    }
}
