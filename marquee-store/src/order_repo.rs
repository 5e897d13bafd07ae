use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_catalog::ReservationId;
use marquee_core::{CoreError, CoreResult};
use marquee_order::{Order, OrderLine, OrderRepository, OrderStatus};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{storage_error, to_i32, to_u32};

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, order_ids: &[Uuid]) -> CoreResult<HashMap<Uuid, Vec<OrderLine>>> {
        let rows: Vec<OrderLineRow> = sqlx::query_as(
            r#"
            SELECT order_id, showing_id, quantity, unit_price_cents, reservation_id
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let order_id = row.order_id;
            lines.entry(order_id).or_default().push(row.try_into()?);
        }
        Ok(lines)
    }

    async fn assemble(&self, rows: Vec<OrderRow>) -> CoreResult<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut lines = self.load_lines(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let order_lines = lines.remove(&row.id).unwrap_or_default();
                row.into_order(order_lines)
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    cart_id: Uuid,
    subtotal_cents: i64,
    booking_fee_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    currency: String,
    status: String,
    status_reason: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> CoreResult<Order> {
        let status: OrderStatus = self.status.parse().map_err(CoreError::StorageError)?;
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            cart_id: self.cart_id,
            lines,
            subtotal_cents: self.subtotal_cents,
            booking_fee_cents: self.booking_fee_cents,
            tax_cents: self.tax_cents,
            total_cents: self.total_cents,
            currency: self.currency,
            status,
            status_reason: self.status_reason,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    order_id: Uuid,
    showing_id: Uuid,
    quantity: i32,
    unit_price_cents: i64,
    reservation_id: Uuid,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = CoreError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        Ok(OrderLine {
            showing_id: row.showing_id,
            quantity: to_u32(row.quantity, "quantity")?,
            unit_price_cents: row.unit_price_cents,
            reservation_id: ReservationId(row.reservation_id),
        })
    }
}

const ORDER_COLUMNS: &str = "id, user_id, cart_id, subtotal_cents, booking_fee_cents, tax_cents, total_cents, \
     currency, status, status_reason, expires_at, created_at, updated_at";

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_order(&self, order: &Order) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, cart_id, subtotal_cents, booking_fee_cents, tax_cents, total_cents,
                currency, status, status_reason, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(order.cart_id)
        .bind(order.subtotal_cents)
        .bind(order.booking_fee_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(order.status_reason.as_deref())
        .bind(order.expires_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        for (line_no, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, showing_id, quantity, unit_price_cents, reservation_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id)
            .bind(line_no as i32)
            .bind(line.showing_id)
            .bind(to_i32(line.quantity, "quantity")?)
            .bind(line.unit_price_cents)
            .bind(line.reservation_id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => Ok(self.assemble(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        reason: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, status_reason = $3, updated_at = $4 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(reason)
            .bind(updated_at)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("order {}", id)));
        }
        Ok(())
    }

    async fn list_orders_for_user(&self, user_id: &str) -> CoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        self.assemble(rows).await
    }

    async fn list_orders_by_status(&self, status: OrderStatus) -> CoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE status = $1 ORDER BY created_at",
            ORDER_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        self.assemble(rows).await
    }
}
