//! Inventory read model.
//!
//! Built independently from the `Products` topic: the inventory process runs
//! its own listener and keeps its own copy of every product's stock, without
//! ever calling the catalog.

pub mod handler;
pub mod item;
pub mod queries;
pub mod repository;

pub use handler::InventoryHandler;
pub use item::InventoryItem;
pub use queries::InventoryQueries;
pub use repository::InventoryRepository;
