use tracing::{error, info, instrument};

use storefront_core::{CustomerId, DomainError};
use storefront_events::{CommandError, CommandResult, Event, Publisher};

use crate::customer::{CreateCustomerRequest, Customer, UpdateShippingAddressRequest};
use crate::repository::CustomerRepository;

/// Command side of the customer registry: validate, check, publish.
///
/// Returned customers are projections of the published event; the read model
/// catches up once [`crate::CustomerEventHandler`] runs.
pub struct CustomerService<R, P> {
    repository: R,
    publisher: P,
}

impl<R, P> CustomerService<R, P>
where
    R: CustomerRepository,
    P: Publisher,
{
    pub fn new(repository: R, publisher: P) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// Register a customer. Emails are unique.
    #[instrument(skip_all)]
    pub async fn create(&self, mut request: CreateCustomerRequest) -> CommandResult<Customer> {
        request.validate()?;

        match self.repository.find_by_email(&request.email).await {
            Ok(_) => {
                return Err(DomainError::conflict(format!(
                    "customer with email={} already exists",
                    request.email
                ))
                .into());
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(logged("create", err.into())),
        }

        let customer = Customer::new(
            CustomerId::generate(),
            request.first_name,
            request.last_name,
            request.email,
        );
        self.publish("create", customer.to_created().into()).await?;

        info!(customer_id = %customer.customer_id(), "customer registration published");
        Ok(customer)
    }

    pub async fn get_by_id(&self, customer_id: &CustomerId) -> CommandResult<Customer> {
        self.find("get_by_id", customer_id).await
    }

    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn update_shipping_address(
        &self,
        mut request: UpdateShippingAddressRequest,
    ) -> CommandResult<Customer> {
        request.validate()?;

        let mut customer = self.find("update_shipping_address", &request.customer_id).await?;
        self.publish("update_shipping_address", request.to_event().into())
            .await?;

        customer.set_shipping_address(request.address());
        Ok(customer)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, customer_id: &CustomerId) -> CommandResult<()> {
        let customer = self.find("delete", customer_id).await?;
        self.publish("delete", customer.to_deleted().into()).await
    }

    async fn find(&self, method: &'static str, customer_id: &CustomerId) -> CommandResult<Customer> {
        self.repository
            .find_by_id(customer_id)
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

fn logged(method: &'static str, err: CommandError) -> CommandError {
    if matches!(
        err,
        CommandError::Publish(_) | CommandError::Domain(DomainError::Internal(_))
    ) {
        error!(method, error = %err, "customer command failed");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use storefront_core::DomainResult;
    use storefront_events::{BrokerError, PublishError};

    /// Read model holding at most one customer.
    #[derive(Default)]
    struct One(Option<Customer>);

    #[async_trait]
    impl CustomerRepository for One {
        async fn store(&self, _customer: &Customer) -> DomainResult<()> {
            Ok(())
        }

        async fn find_by_id(&self, customer_id: &CustomerId) -> DomainResult<Customer> {
            self.0
                .clone()
                .filter(|c| c.customer_id() == customer_id)
                .ok_or_else(|| DomainError::not_found(format!("customer with id={customer_id}")))
        }

        async fn find_by_email(&self, email: &str) -> DomainResult<Customer> {
            self.0
                .clone()
                .filter(|c| c.email() == email)
                .ok_or_else(|| DomainError::not_found(format!("customer with email={email}")))
        }

        async fn update(&self, _customer: &Customer) -> DomainResult<()> {
            Ok(())
        }

        async fn delete(&self, _customer_id: &CustomerId) -> DomainResult<()> {
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
                    attempts: 1,
                    source: BrokerError::Fatal("closed".into()),
                });
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn ada() -> Customer {
        Customer::new("c1".into(), "Ada", "Lovelace", "ada@example.com")
    }

    fn request(email: &str) -> CreateCustomerRequest {
        CreateCustomerRequest {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            email: email.into(),
        }
    }

    #[tokio::test]
    async fn create_publishes_registration() {
        let service = CustomerService::new(One::default(), Published::default());

        let customer = service.create(request("grace@example.com")).await.unwrap();

        let events = service.publisher.events.lock().unwrap().clone();
        assert_eq!(events, vec![Event::from(customer.to_created())]);
        assert!(customer.shipping_address().is_none());
    }

    #[tokio::test]
    async fn taken_email_is_a_conflict() {
        let service = CustomerService::new(One(Some(ada())), Published::default());

        let err = service.create(request("ada@example.com")).await.unwrap_err();

        assert_eq!(err.status_code(), 409);
        assert!(service.publisher.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn address_update_publishes_validated_address() {
        let service = CustomerService::new(One(Some(ada())), Published::default());

        let customer = service
            .update_shipping_address(UpdateShippingAddressRequest {
                customer_id: "c1".into(),
                country: " Italy ".into(),
                city: "Rome".into(),
                zip_code: "00100".into(),
                street: "Via Roma 1".into(),
            })
            .await
            .unwrap();

        assert_eq!(customer.shipping_address().unwrap().country, "Italy");
        let events = service.publisher.events.lock().unwrap().clone();
        assert!(matches!(&events[0], Event::CustomerShippingAddressUpdated(e) if e.country == "Italy"));
    }

    #[tokio::test]
    async fn delete_reports_publish_failure() {
        let publisher = Published {
            fail: true,
            ..Published::default()
        };
        let service = CustomerService::new(One(Some(ada())), publisher);

        let err = service.delete(&"c1".into()).await.unwrap_err();

        assert_eq!(err.status_code(), 502);
        assert!(service.delete(&"c2".into()).await.unwrap_err().is_not_found());
    }
}
