//! Process configuration, read from the environment.
//!
//! | variable | default |
//! |---|---|
//! | `KAFKA_BOOTSTRAP_SERVERS` | required |
//! | `KAFKA_CONSUMER_GROUP` | `storefront-worker` |
//! | `KAFKA_CLIENT_ID` | `storefront` |
//! | `STOREFRONT_TOPICS` | `Products,Customers` |
//! | `STOREFRONT_DISPATCH_POLICY` | `ordered` |
//! | `STOREFRONT_REDELIVERY_BACKOFF_MS` | `100` |
//! | `STOREFRONT_DEAD_LETTER_AFTER` | unset (no dead-lettering) |
//! | `DATABASE_URL` | unset (in-memory read models) |
//! | `LOG_FORMAT` | `json` |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use storefront_events::{CUSTOMERS_TOPIC, DispatchPolicy, ListenerConfig, PRODUCTS_TOPIC, Topic};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Comma-separated broker list.
    pub bootstrap_servers: String,
    pub client_id: String,
    pub consumer_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub kafka: KafkaConfig,
    /// Topics the worker registers handlers for.
    pub topics: Vec<Topic>,
    pub listener: ListenerConfig,
    pub database_url: Option<String>,
    pub log_format: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let kafka = KafkaConfig {
            bootstrap_servers: var("KAFKA_BOOTSTRAP_SERVERS")
                .ok_or(ConfigError::Missing("KAFKA_BOOTSTRAP_SERVERS"))?,
            client_id: var("KAFKA_CLIENT_ID").unwrap_or_else(|| "storefront".to_owned()),
            consumer_group: var("KAFKA_CONSUMER_GROUP")
                .unwrap_or_else(|| "storefront-worker".to_owned()),
        };

        let topics = match var("STOREFRONT_TOPICS") {
            Some(list) => parse_topics(&list)?,
            None => vec![PRODUCTS_TOPIC, CUSTOMERS_TOPIC],
        };

        let mut listener = ListenerConfig::default();
        if let Some(policy) = var("STOREFRONT_DISPATCH_POLICY") {
            listener.policy = DispatchPolicy::from_str(&policy).map_err(|e| ConfigError::Invalid {
                var: "STOREFRONT_DISPATCH_POLICY",
                reason: e.to_string(),
            })?;
        }
        if let Some(ms) = var("STOREFRONT_REDELIVERY_BACKOFF_MS") {
            listener.redelivery_backoff =
                Duration::from_millis(parse_number("STOREFRONT_REDELIVERY_BACKOFF_MS", &ms)?);
        }
        if let Some(after) = var("STOREFRONT_DEAD_LETTER_AFTER") {
            let after: u32 = parse_number("STOREFRONT_DEAD_LETTER_AFTER", &after)?;
            if after == 0 {
                return Err(ConfigError::Invalid {
                    var: "STOREFRONT_DEAD_LETTER_AFTER",
                    reason: "must be at least 1".into(),
                });
            }
            listener.dead_letter_after = Some(after);
        }

        Ok(Self {
            kafka,
            topics,
            listener,
            database_url: var("DATABASE_URL"),
            log_format: var("LOG_FORMAT").unwrap_or_else(|| "json".to_owned()),
        })
    }

    pub fn listens_to(&self, topic: &Topic) -> bool {
        self.topics.contains(topic)
    }
}

fn parse_topics(list: &str) -> Result<Vec<Topic>, ConfigError> {
    let mut topics = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let topic = if name == PRODUCTS_TOPIC.as_str() {
            PRODUCTS_TOPIC
        } else if name == CUSTOMERS_TOPIC.as_str() {
            CUSTOMERS_TOPIC
        } else {
            return Err(ConfigError::Invalid {
                var: "STOREFRONT_TOPICS",
                reason: format!("unknown topic {name}"),
            });
        };
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    }
    if topics.is_empty() {
        return Err(ConfigError::Invalid {
            var: "STOREFRONT_TOPICS",
            reason: "no topics given".into(),
        });
    }
    Ok(topics)
}

fn parse_number<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_brokers_are_set() {
        let config = load(&[("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092")]).unwrap();

        assert_eq!(config.kafka.consumer_group, "storefront-worker");
        assert_eq!(config.topics, vec![PRODUCTS_TOPIC, CUSTOMERS_TOPIC]);
        assert_eq!(config.listener, ListenerConfig::default());
        assert_eq!(config.database_url, None);
        assert_eq!(config.log_format, "json");
    }

    #[test]
    fn brokers_are_required() {
        assert_eq!(
            load(&[("KAFKA_BOOTSTRAP_SERVERS", "  ")]).unwrap_err(),
            ConfigError::Missing("KAFKA_BOOTSTRAP_SERVERS")
        );
    }

    #[test]
    fn listener_settings_are_parsed() {
        let config = load(&[
            ("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
            ("STOREFRONT_TOPICS", "Products, Products"),
            ("STOREFRONT_DISPATCH_POLICY", "Concurrent"),
            ("STOREFRONT_REDELIVERY_BACKOFF_MS", "250"),
            ("STOREFRONT_DEAD_LETTER_AFTER", "5"),
        ])
        .unwrap();

        assert_eq!(config.topics, vec![PRODUCTS_TOPIC]);
        assert!(!config.listens_to(&CUSTOMERS_TOPIC));
        assert_eq!(config.listener.policy, DispatchPolicy::Concurrent);
        assert_eq!(config.listener.redelivery_backoff, Duration::from_millis(250));
        assert_eq!(config.listener.dead_letter_after, Some(5));
    }

    #[test]
    fn bad_values_name_the_variable() {
        let cases = [
            ("STOREFRONT_TOPICS", "Orders"),
            ("STOREFRONT_DISPATCH_POLICY", "random"),
            ("STOREFRONT_DEAD_LETTER_AFTER", "0"),
            ("STOREFRONT_REDELIVERY_BACKOFF_MS", "soon"),
        ];
        for (name, value) in cases {
            let err = load(&[("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"), (name, value)])
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { var, .. } if var == name),
                "{name}={value} gave {err:?}"
            );
        }
    }
}
