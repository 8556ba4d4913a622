//! Decoder registry: `EventType` tag → concrete event decoder.
//!
//! Consumers receive raw envelopes; the registry turns the `(type tag, body)`
//! pair back into a typed [`Event`].
//!
//! ## Lifecycle
//!
//! The registry is assembled once at startup with [`DecoderRegistryBuilder`]
//! and frozen. A built [`DecoderRegistry`] is immutable, so it can be shared
//! behind an `Arc` and read from any number of consumer tasks without locking.
//!
//! ## Decoding rules
//!
//! - The type tag is looked up **before** the body is parsed: an unknown tag
//!   is reported as [`DecodeError::UnrecognizedType`] no matter what bytes
//!   came with it.
//! - A known tag whose body does not parse is [`DecodeError::Malformed`].
//! - Registering the same tag twice is a startup error, not a silent overwrite.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::envelope::{EVENT_TYPE_HEADER, Envelope};
use crate::event::{Event, EventType, EventVariant, Topic};

type DecodeFn = fn(&[u8]) -> Result<Event, serde_json::Error>;

fn decode_json<V: EventVariant>(bytes: &[u8]) -> Result<Event, serde_json::Error> {
    serde_json::from_slice::<V>(bytes).map(Into::into)
}

#[derive(Debug, Clone)]
struct Registration {
    topic: Topic,
    decode: DecodeFn,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized event type: {0}")]
    UnrecognizedType(String),

    #[error("envelope is missing the EventType header")]
    MissingTypeHeader,

    #[error("EventType header is not valid UTF-8")]
    InvalidTypeHeader,

    #[error("malformed {event_type} body: {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("event type registered twice: {0}")]
    DuplicateType(String),
}

/// Builds a [`DecoderRegistry`].
#[derive(Debug, Default)]
pub struct DecoderRegistryBuilder {
    entries: HashMap<String, Registration>,
}

impl DecoderRegistryBuilder {
    /// Register the decoder for variant `V` under `V::EVENT_TYPE`.
    pub fn register<V: EventVariant>(mut self) -> Result<Self, RegistryError> {
        let tag = V::EVENT_TYPE.as_str().to_owned();
        if self.entries.contains_key(&tag) {
            return Err(RegistryError::DuplicateType(tag));
        }

        self.entries.insert(
            tag,
            Registration {
                topic: V::TOPIC,
                decode: decode_json::<V>,
            },
        );
        Ok(self)
    }

    pub fn build(self) -> DecoderRegistry {
        DecoderRegistry {
            entries: self.entries,
        }
    }
}

/// Immutable map from event type tag to decoder.
#[derive(Debug, Clone)]
pub struct DecoderRegistry {
    entries: HashMap<String, Registration>,
}

impl DecoderRegistry {
    pub fn builder() -> DecoderRegistryBuilder {
        DecoderRegistryBuilder::default()
    }

    /// Registry with a decoder for every event variant in [`Event`].
    pub fn standard() -> Self {
        use crate::customer::{CustomerCreated, CustomerDeleted, CustomerShippingAddressUpdated};
        use crate::product::{ProductCreated, ProductDeleted, ProductUpdated};

        fn build() -> Result<DecoderRegistry, RegistryError> {
            Ok(DecoderRegistry::builder()
                .register::<ProductCreated>()?
                .register::<ProductUpdated>()?
                .register::<ProductDeleted>()?
                .register::<CustomerCreated>()?
                .register::<CustomerShippingAddressUpdated>()?
                .register::<CustomerDeleted>()?
                .build())
        }

        // The variant tags above are distinct constants.
        build().expect("standard event types are unique")
    }

    /// Decode a body given its type tag.
    pub fn decode(&self, event_type: &str, bytes: &[u8]) -> Result<Event, DecodeError> {
        let registration = self
            .entries
            .get(event_type)
            .ok_or_else(|| DecodeError::UnrecognizedType(event_type.to_owned()))?;

        (registration.decode)(bytes).map_err(|source| DecodeError::Malformed {
            event_type: event_type.to_owned(),
            source,
        })
    }

    /// Decode an envelope using its `EventType` header.
    pub fn decode_envelope(&self, envelope: &Envelope) -> Result<Event, DecodeError> {
        let raw = envelope
            .header(EVENT_TYPE_HEADER)
            .ok_or(DecodeError::MissingTypeHeader)?;
        let event_type = core::str::from_utf8(raw).map_err(|_| DecodeError::InvalidTypeHeader)?;
        self.decode(event_type, envelope.value())
    }

    pub fn contains(&self, event_type: &EventType) -> bool {
        self.entries.contains_key(event_type.as_str())
    }

    /// Topics covered by at least one registered decoder.
    pub fn topics(&self) -> Vec<Topic> {
        self.entries
            .values()
            .map(|r| r.topic.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::{CustomerCreated, CustomerDeleted, CustomerShippingAddressUpdated};
    use crate::event::{CUSTOMERS_TOPIC, PRODUCTS_TOPIC};
    use crate::product::{ProductCreated, ProductDeleted, ProductUpdated};
    use proptest::prelude::*;

    #[test]
    fn standard_registry_knows_every_variant() {
        let registry = DecoderRegistry::standard();
        assert_eq!(registry.len(), 6);
        assert!(registry.contains(&ProductUpdated::EVENT_TYPE));
        assert!(registry.contains(&CustomerShippingAddressUpdated::EVENT_TYPE));
        assert_eq!(registry.topics(), vec![CUSTOMERS_TOPIC, PRODUCTS_TOPIC]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let err = DecoderRegistry::builder()
            .register::<ProductCreated>()
            .unwrap()
            .register::<ProductCreated>()
            .unwrap_err();

        assert_eq!(err, RegistryError::DuplicateType("Product.Created".into()));
    }

    #[test]
    fn known_type_with_bad_body_is_malformed() {
        let registry = DecoderRegistry::standard();
        let err = registry
            .decode("Product.Deleted", br#"{"wrong":"shape"}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { ref event_type, .. } if event_type == "Product.Deleted"));
    }

    #[test]
    fn empty_registry_recognizes_nothing() {
        let registry = DecoderRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.decode("Product.Deleted", br#"{"product_id":"p1"}"#),
            Err(DecodeError::UnrecognizedType(_))
        ));
    }

    #[test]
    fn envelope_without_type_header_is_rejected() {
        let event: Event = ProductDeleted {
            product_id: "p1".into(),
        }
        .into();
        let envelope = Envelope::from_event(&event).unwrap().without_header(EVENT_TYPE_HEADER);

        let err = DecoderRegistry::standard()
            .decode_envelope(&envelope)
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingTypeHeader));
    }

    fn product_fields() -> impl Strategy<Value = (String, String, String, f64, i64)> {
        (
            "[a-z0-9-]{1,36}",
            "[ -~]{0,32}",
            "[ -~]{0,64}",
            1u32..100_000_000,
            0i64..1_000_000,
        )
            .prop_map(|(id, name, description, cents, amount)| {
                (id, name, description, f64::from(cents) / 100.0, amount)
            })
    }

    fn any_event() -> impl Strategy<Value = Event> {
        let id = "[a-z0-9-]{1,36}";
        let text = "[ -~]{0,32}";
        prop_oneof![
            product_fields().prop_map(|(id, name, description, price, amount)| {
                Event::from(ProductCreated {
                    product_id: id.into(),
                    name,
                    description,
                    price,
                    amount,
                })
            }),
            product_fields().prop_map(|(id, name, description, price, amount)| {
                Event::from(ProductUpdated {
                    product_id: id.into(),
                    name,
                    description,
                    price,
                    amount,
                })
            }),
            id.prop_map(|id| Event::from(ProductDeleted {
                product_id: id.into()
            })),
            (id, text, text, "[a-z]{1,12}@[a-z]{1,12}\\.com").prop_map(
                |(id, first_name, last_name, email)| Event::from(CustomerCreated {
                    customer_id: id.into(),
                    first_name,
                    last_name,
                    email,
                })
            ),
            (id, text, text, "[0-9A-Z ]{1,10}", text).prop_map(
                |(id, country, city, zip_code, street)| {
                    Event::from(CustomerShippingAddressUpdated {
                        customer_id: id.into(),
                        country,
                        city,
                        zip_code,
                        street,
                    })
                }
            ),
            id.prop_map(|id| Event::from(CustomerDeleted {
                customer_id: id.into()
            })),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(event in any_event()) {
            let envelope = Envelope::from_event(&event).unwrap();

            let decoded = DecoderRegistry::standard().decode_envelope(&envelope).unwrap();
            prop_assert_eq!(decoded, event);
        }

        #[test]
        fn unknown_type_is_unrecognized_for_any_body(
            tag in "[A-Za-z.]{1,24}",
            body in proptest::collection::vec(any::<u8>(), 0..128),
        ) {
            let registry = DecoderRegistry::standard();
            prop_assume!(!registry.contains(&EventType::new(tag.clone())));

            let result = registry.decode(&tag, &body);
            prop_assert!(matches!(result, Err(DecodeError::UnrecognizedType(t)) if t == tag));
        }
    }
}
