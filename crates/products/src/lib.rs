//! Products catalog: the command side of the `Products` topic.
//!
//! [`ProductService`] validates requests against its read model and publishes
//! product events; [`ProductEventHandler`] applies those events back to the
//! read model. The service never writes to the repository itself.

pub mod handler;
pub mod product;
pub mod repository;
pub mod request;
pub mod service;

pub use handler::ProductEventHandler;
pub use product::Product;
pub use repository::ProductRepository;
pub use request::{CreateProductRequest, RestockProductRequest, UpdateProductRequest};
pub use service::ProductService;
