//! Listener process wiring.
//!
//! Builds the read models, registers every handler for the configured topics
//! and runs the listener until a shutdown signal arrives.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use storefront_customers::{CustomerEventHandler, CustomerRepository};
use storefront_events::{
    BrokerConsumer, CUSTOMERS_TOPIC, ListenError, Listener, PRODUCTS_TOPIC, Topic,
};
use storefront_infra::AppConfig;
use storefront_infra::read_model::{
    InMemoryCustomerRepository, InMemoryInventoryRepository, InMemoryProductRepository,
    PgCustomerRepository, PgInventoryRepository, PgProductRepository, ensure_schema,
};
use storefront_inventory::{InventoryHandler, InventoryRepository};
use storefront_products::{ProductEventHandler, ProductRepository};

/// The read models this process keeps up to date.
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub inventory: Arc<dyn InventoryRepository>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            products: Arc::new(InMemoryProductRepository::new()),
            customers: Arc::new(InMemoryCustomerRepository::new()),
            inventory: Arc::new(InMemoryInventoryRepository::new()),
        }
    }

    pub async fn postgres(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        ensure_schema(&pool).await?;

        Ok(Self {
            products: Arc::new(PgProductRepository::new(pool.clone())),
            customers: Arc::new(PgCustomerRepository::new(pool.clone())),
            inventory: Arc::new(PgInventoryRepository::new(pool)),
        })
    }

    /// Postgres when `DATABASE_URL` is set, in-memory otherwise.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        match &config.database_url {
            Some(url) => {
                info!("using postgres read models");
                Self::postgres(url).await
            }
            None => {
                info!("DATABASE_URL not set; using in-memory read models");
                Ok(Self::in_memory())
            }
        }
    }
}

/// Register the catalog and inventory handlers on `Products` and the
/// customer handler on `Customers`, for whichever of those `topics` lists.
pub fn register_handlers<C: BrokerConsumer>(
    listener: &Listener<C>,
    stores: &Stores,
    topics: &[Topic],
) -> Result<(), ListenError> {
    if topics.contains(&PRODUCTS_TOPIC) {
        listener.handle(PRODUCTS_TOPIC, ProductEventHandler::new(Arc::clone(&stores.products)))?;
        listener.handle(PRODUCTS_TOPIC, InventoryHandler::new(Arc::clone(&stores.inventory)))?;
    }
    if topics.contains(&CUSTOMERS_TOPIC) {
        listener.handle(
            CUSTOMERS_TOPIC,
            CustomerEventHandler::new(Arc::clone(&stores.customers)),
        )?;
    }
    Ok(())
}

/// Run `listener` until `shutdown` resolves, then drain in-flight handlers.
///
/// Returns early with the error if the broker fails fatally.
pub async fn run_until<C, F>(listener: &Listener<C>, shutdown: F) -> anyhow::Result<()>
where
    C: BrokerConsumer,
    F: Future<Output = ()>,
{
    let token = CancellationToken::new();
    let listen = listener.listen(token.clone());
    tokio::pin!(listen);

    tokio::select! {
        result = &mut listen => return result.context("listener failed"),
        () = shutdown => {
            info!("shutdown requested, draining handlers");
            token.cancel();
        }
    }

    listen.await.context("listener failed while draining")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use storefront_events::{
        CustomerCreated, DecoderRegistry, Event, EventPublisher, InMemoryBroker, ListenerConfig,
        ListenerState, ProductCreated, Publisher,
    };
    use tokio::sync::oneshot;

    fn listener(broker: &InMemoryBroker) -> Listener<storefront_events::InMemoryConsumer> {
        Listener::new(broker.consumer("worker"), Arc::new(DecoderRegistry::standard())).with_config(
            ListenerConfig {
                redelivery_backoff: Duration::from_millis(5),
                ..ListenerConfig::default()
            },
        )
    }

    #[test]
    fn only_configured_topics_get_handlers() {
        let broker = InMemoryBroker::new();
        let listener = listener(&broker);

        register_handlers(&listener, &Stores::in_memory(), &[CUSTOMERS_TOPIC]).unwrap();

        assert_eq!(listener.topics(), vec![CUSTOMERS_TOPIC]);
    }

    #[tokio::test]
    async fn runs_until_shutdown_and_applies_events() {
        let broker = InMemoryBroker::new();
        let stores = Stores::in_memory();
        let listener = listener(&broker);
        register_handlers(&listener, &stores, &[PRODUCTS_TOPIC, CUSTOMERS_TOPIC]).unwrap();

        let publisher = EventPublisher::new(broker.clone());
        let events: [Event; 2] = [
            ProductCreated {
                product_id: "p1".into(),
                name: "Widget".into(),
                description: "A very useful widget".into(),
                price: 9.99,
                amount: 5,
            }
            .into(),
            CustomerCreated {
                customer_id: "c1".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "ada@example.com".into(),
            }
            .into(),
        ];
        for event in &events {
            publisher.publish(event).await.unwrap();
        }

        let (stop, stopped) = oneshot::channel::<()>();
        let run = run_until(&listener, async {
            let _ = stopped.await;
        });
        let check = async {
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let product = stores.products.find_by_id(&"p1".into()).await;
                    let item = stores.inventory.get(&"p1".into()).await;
                    let customer = stores.customers.find_by_id(&"c1".into()).await;
                    if product.is_ok() && item.is_ok() && customer.is_ok() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("read models did not catch up");
            stop.send(()).unwrap();
        };

        let (result, ()) = tokio::join!(run, check);
        result.unwrap();
        assert_eq!(listener.state(), ListenerState::Stopped);
    }
}
