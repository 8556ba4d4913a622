//! Customers: the command side of the `Customers` topic.
//!
//! Same choreography as the catalog: [`CustomerService`] validates and
//! publishes, [`CustomerEventHandler`] applies events to the read model.

pub mod customer;
pub mod handler;
pub mod repository;
pub mod service;

pub use customer::{CreateCustomerRequest, Customer, ShippingAddress, UpdateShippingAddressRequest};
pub use handler::CustomerEventHandler;
pub use repository::CustomerRepository;
pub use service::CustomerService;
