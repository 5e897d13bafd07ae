pub mod models;
pub mod repository;
pub mod memory;
pub mod manager;
pub mod events;
pub mod orchestrator;
pub mod finalizer;
pub mod reconciler;

pub use models::{
    FlaggedSettlement, InconsistencyKind, Order, OrderError, OrderLine, OrderStatus, Payment,
    PaymentFilter, PaymentStatus,
};
pub use repository::{OrderRepository, PaymentRepository};
pub use memory::{InMemoryOrderRepository, InMemoryPaymentRepository};
pub use manager::{OrderManager, OrderManagerError};
pub use events::EventPublisher;
pub use orchestrator::{MockPaymentGateway, PaymentOrchestrator, RetryPolicy};
pub use finalizer::{Actor, FinalizeError, FinalizerDeps, OrderFinalizer, RecoveryReport, Settled};
pub use reconciler::{PaymentReconciler, QueueError, ReconcileOutcome, SettlementQueue};

#[cfg(test)]
mod finalizer_tests;
