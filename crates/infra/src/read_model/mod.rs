//! Read-model storage behind the service repository traits.
//!
//! - [`memory`]: lock-protected maps for tests/dev and single-process runs
//! - [`postgres`]: one table per read model, via `sqlx`

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryCustomerRepository, InMemoryInventoryRepository, InMemoryProductRepository};
pub use postgres::{PgCustomerRepository, PgInventoryRepository, PgProductRepository, ensure_schema};
