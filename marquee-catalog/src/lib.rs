pub mod movie;
pub mod pricing;
pub mod inventory;
pub mod repository;
pub mod memory;

pub use movie::{Movie, Showing, CatalogError};
pub use pricing::{PricingConfig, PricingEngine, PricingError, Quote, QuoteLine};
pub use inventory::{
    Availability, InventoryError, InventoryLedger, LedgerConfig, Reservation, ReservationId,
    ReservationState, SweepReport,
};
pub use repository::{CatalogRepository, MoviePage, MovieQuery};
pub use memory::InMemoryCatalogRepository;
