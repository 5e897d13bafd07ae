use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::{CoreResult, TransactionId};
use uuid::Uuid;

use crate::models::{FlaggedSettlement, InconsistencyKind, Order, OrderStatus, Payment, PaymentFilter};

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: &Order) -> CoreResult<()>;

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>>;

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        reason: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Newest first.
    async fn list_orders_for_user(&self, user_id: &str) -> CoreResult<Vec<Order>>;

    async fn list_orders_by_status(&self, status: OrderStatus) -> CoreResult<Vec<Order>>;
}

/// Repository trait for payments and flagged settlements
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_payment(&self, payment: &Payment) -> CoreResult<()>;

    async fn get_payment_by_order(&self, order_id: Uuid) -> CoreResult<Option<Payment>>;

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> CoreResult<Option<Payment>>;

    /// Persist status, transaction id and `updated_at`.
    async fn update_payment(&self, payment: &Payment) -> CoreResult<()>;

    /// Newest first.
    async fn list_payments(&self, filter: &PaymentFilter) -> CoreResult<Vec<Payment>>;

    /// Fails with `Conflict` if the transaction already has a flag of this kind.
    async fn create_flag(&self, flag: &FlaggedSettlement) -> CoreResult<()>;

    async fn get_flag(&self, id: Uuid) -> CoreResult<Option<FlaggedSettlement>>;

    /// The flag raised for `transaction_id` with `kind`, resolved or not.
    async fn find_flag(
        &self,
        transaction_id: &TransactionId,
        kind: InconsistencyKind,
    ) -> CoreResult<Option<FlaggedSettlement>>;

    async fn list_flags(&self, include_resolved: bool) -> CoreResult<Vec<FlaggedSettlement>>;

    async fn resolve_flag(&self, id: Uuid, resolved_at: DateTime<Utc>) -> CoreResult<()>;
}
