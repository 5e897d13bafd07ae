pub mod app_config;
pub mod database;
pub mod cart_repo;
pub mod catalog_repo;
pub mod order_repo;
pub mod payment_repo;
pub mod redis_repo;

pub use app_config::{Config, StorageBackend};
pub use database::DbClient;
pub use cart_repo::PgCartRepository;
pub use catalog_repo::PgCatalogRepository;
pub use order_repo::PgOrderRepository;
pub use payment_repo::PgPaymentRepository;
pub use redis_repo::RedisClient;
