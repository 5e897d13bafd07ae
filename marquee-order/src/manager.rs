use marquee_core::{Clock, CoreError};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::{Order, OrderError, OrderStatus};
use crate::repository::OrderRepository;

/// Manages order lifecycle and state transitions on top of the order store.
#[derive(Clone)]
pub struct OrderManager {
    orders: Arc<dyn OrderRepository>,
    clock: Arc<dyn Clock>,
}

impl OrderManager {
    pub fn new(orders: Arc<dyn OrderRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { orders, clock }
    }

    pub async fn create_order(&self, order: &Order) -> Result<(), OrderManagerError> {
        self.orders.create_order(order).await?;
        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total_cents = order.total_cents,
            "Order created"
        );
        Ok(())
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderManagerError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(OrderManagerError::Order(OrderError::NotFound(order_id)))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderManagerError> {
        Ok(self.orders.list_orders_for_user(user_id).await?)
    }

    pub async fn list_pending(&self) -> Result<Vec<Order>, OrderManagerError> {
        Ok(self
            .orders
            .list_orders_by_status(OrderStatus::PendingPayment)
            .await?)
    }

    /// Transition: PendingPayment → Paid (seats committed, money settled)
    pub async fn mark_paid(&self, order_id: Uuid) -> Result<Order, OrderManagerError> {
        self.transition(order_id, OrderStatus::Paid, None).await
    }

    /// Transition: PendingPayment → Failed
    pub async fn mark_failed(&self, order_id: Uuid, reason: &str) -> Result<Order, OrderManagerError> {
        self.transition(order_id, OrderStatus::Failed, Some(reason.to_string()))
            .await
    }

    /// Transition: Paid → Refunded
    pub async fn mark_refunded(&self, order_id: Uuid) -> Result<Order, OrderManagerError> {
        self.transition(order_id, OrderStatus::Refunded, None).await
    }

    async fn transition(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        reason: Option<String>,
    ) -> Result<Order, OrderManagerError> {
        let mut order = self.get_order(order_id).await?;
        let from = order.status;
        order.transition(next, reason, self.clock.now())?;

        self.orders
            .update_order_status(
                order.id,
                order.status,
                order.status_reason.as_deref(),
                order.updated_at,
            )
            .await?;

        info!(order_id = %order_id, from = %from, to = %next, "Order status changed");
        Ok(order)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderManagerError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Storage(#[from] CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOrderRepository;
    use crate::models::OrderLine;
    use chrono::Utc;
    use marquee_catalog::ReservationId;
    use marquee_core::SystemClock;

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            user_id: "customer@example.com".to_string(),
            cart_id: Uuid::new_v4(),
            lines: vec![OrderLine {
                showing_id: Uuid::new_v4(),
                quantity: 2,
                unit_price_cents: 1000,
                reservation_id: ReservationId::new(),
            }],
            subtotal_cents: 2000,
            booking_fee_cents: 0,
            tax_cents: 0,
            total_cents: 2000,
            currency: "USD".to_string(),
            status: OrderStatus::PendingPayment,
            status_reason: None,
            expires_at: now + chrono::Duration::minutes(15),
            created_at: now,
            updated_at: now,
        }
    }

    fn manager() -> OrderManager {
        OrderManager::new(Arc::new(InMemoryOrderRepository::new()), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_order_lifecycle() {
        let manager = manager();
        let order = order();
        manager.create_order(&order).await.unwrap();

        let paid = manager.mark_paid(order.id).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);

        let refunded = manager.mark_refunded(order.id).await.unwrap();
        assert_eq!(refunded.status, OrderStatus::Refunded);
        assert_eq!(manager.get_order(order.id).await.unwrap().status, OrderStatus::Refunded);
    }

    #[tokio::test]
    async fn test_invalid_transition() {
        let manager = manager();
        let order = order();
        manager.create_order(&order).await.unwrap();

        manager.mark_failed(order.id, "payment_declined").await.unwrap();
        let stored = manager.get_order(order.id).await.unwrap();
        assert_eq!(stored.status_reason.as_deref(), Some("payment_declined"));

        // Failed is final
        let result = manager.mark_paid(order.id).await;
        assert!(matches!(
            result,
            Err(OrderManagerError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Failed,
                to: OrderStatus::Paid
            }))
        ));
        assert!(manager.list_pending().await.unwrap().is_empty());
    }
}
