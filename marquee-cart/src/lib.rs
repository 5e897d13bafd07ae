pub mod models;
pub mod repository;
pub mod memory;
pub mod manager;

pub use models::{Cart, CartLine, CartSnapshot, CartStatus, SnapshotLine};
pub use repository::CartRepository;
pub use memory::InMemoryCartRepository;
pub use manager::{CartError, CartManager};
