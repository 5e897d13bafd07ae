pub mod clock;
pub mod locks;
pub mod payment;

pub use clock::{Clock, ManualClock, SystemClock};
pub use locks::KeyedLocks;
pub use payment::{
    ChargeRequest, GatewayError, PaymentGateway, SettlementNotice, SettlementOutcome,
    TransactionId,
};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
