use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::{CoreError, CoreResult, TransactionId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{FlaggedSettlement, InconsistencyKind, Order, OrderStatus, Payment, PaymentFilter};
use crate::repository::{OrderRepository, PaymentRepository};

/// Order store kept in process memory. Used for standalone runs and tests.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> CoreResult<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(CoreError::Conflict(format!("order {} already exists", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        reason: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("order {}", id)))?;
        order.status = status;
        order.status_reason = reason.map(str::to_string);
        order.updated_at = updated_at;
        Ok(())
    }

    async fn list_orders_for_user(&self, user_id: &str) -> CoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_orders_by_status(&self, status: OrderStatus) -> CoreResult<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: RwLock<HashMap<Uuid, Payment>>,
    flags: RwLock<HashMap<Uuid, FlaggedSettlement>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create_payment(&self, payment: &Payment) -> CoreResult<()> {
        let mut payments = self.payments.write().await;
        if payments.values().any(|p| p.order_id == payment.order_id) {
            return Err(CoreError::Conflict(format!(
                "order {} already has a payment",
                payment.order_id
            )));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment_by_order(&self, order_id: Uuid) -> CoreResult<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> CoreResult<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.transaction_id.as_ref() == Some(transaction_id))
            .cloned())
    }

    async fn update_payment(&self, payment: &Payment) -> CoreResult<()> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&payment.id) {
            Some(existing) => {
                existing.status = payment.status;
                existing.transaction_id = payment.transaction_id.clone();
                existing.updated_at = payment.updated_at;
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("payment {}", payment.id))),
        }
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> CoreResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn create_flag(&self, flag: &FlaggedSettlement) -> CoreResult<()> {
        let mut flags = self.flags.write().await;
        if flags
            .values()
            .any(|f| f.transaction_id == flag.transaction_id && f.kind == flag.kind)
        {
            return Err(CoreError::Conflict(format!(
                "transaction {} already flagged as {}",
                flag.transaction_id, flag.kind
            )));
        }
        flags.insert(flag.id, flag.clone());
        Ok(())
    }

    async fn get_flag(&self, id: Uuid) -> CoreResult<Option<FlaggedSettlement>> {
        Ok(self.flags.read().await.get(&id).cloned())
    }

    async fn find_flag(
        &self,
        transaction_id: &TransactionId,
        kind: InconsistencyKind,
    ) -> CoreResult<Option<FlaggedSettlement>> {
        Ok(self
            .flags
            .read()
            .await
            .values()
            .find(|f| &f.transaction_id == transaction_id && f.kind == kind)
            .cloned())
    }

    async fn list_flags(&self, include_resolved: bool) -> CoreResult<Vec<FlaggedSettlement>> {
        let mut flags: Vec<FlaggedSettlement> = self
            .flags
            .read()
            .await
            .values()
            .filter(|f| include_resolved || !f.resolved)
            .cloned()
            .collect();
        flags.sort_by(|a, b| b.flagged_at.cmp(&a.flagged_at));
        Ok(flags)
    }

    async fn resolve_flag(&self, id: Uuid, resolved_at: DateTime<Utc>) -> CoreResult<()> {
        let mut flags = self.flags.write().await;
        let flag = flags
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("flagged settlement {}", id)))?;
        flag.resolved = true;
        flag.resolved_at = Some(resolved_at);
        Ok(())
    }
}
