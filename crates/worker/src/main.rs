use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use storefront_events::{DecoderRegistry, Listener};
use storefront_infra::AppConfig;
use storefront_infra::kafka::{KafkaConsumer, KafkaProducer};
use storefront_observability::LogFormat;
use storefront_worker::{Stores, register_handlers, run_until};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let format: LogFormat = config.log_format.parse()?;
    storefront_observability::init_with(format);

    let stores = Stores::from_config(&config).await?;
    let consumer = KafkaConsumer::new(&config.kafka).context("failed to create kafka consumer")?;

    let mut listener = Listener::new(consumer, Arc::new(DecoderRegistry::standard()))
        .with_config(config.listener.clone());
    if config.listener.dead_letter_after.is_some() {
        let producer =
            KafkaProducer::new(&config.kafka).context("failed to create dead-letter producer")?;
        listener = listener.with_dead_letter(Arc::new(producer));
    }
    register_handlers(&listener, &stores, &config.topics)?;

    info!(
        group = %config.kafka.consumer_group,
        topics = ?listener.topics(),
        "worker starting"
    );

    run_until(&listener, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c; stopping");
        }
    })
    .await?;

    info!("worker stopped");
    Ok(())
}
