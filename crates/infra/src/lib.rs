//! Infrastructure layer: read-model storage, broker adapters, configuration.

pub mod config;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod read_model;


pub use config::{AppConfig, ConfigError, KafkaConfig};
