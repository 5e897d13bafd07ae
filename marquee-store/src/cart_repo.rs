use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_cart::{Cart, CartLine, CartRepository};
use marquee_core::{CoreError, CoreResult};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{storage_error, to_i32, to_u32};

pub struct PgCartRepository {
    pool: PgPool,
}

impl PgCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn assemble(&self, rows: Vec<CartRow>) -> CoreResult<Vec<Cart>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items: Vec<CartItemRow> = sqlx::query_as(
            r#"
            SELECT cart_id, showing_id, quantity, added_at
            FROM cart_items
            WHERE cart_id = ANY($1)
            ORDER BY cart_id, added_at, showing_id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut lines: HashMap<Uuid, Vec<CartLine>> = HashMap::new();
        for item in items {
            lines.entry(item.cart_id).or_default().push(CartLine {
                showing_id: item.showing_id,
                quantity: to_u32(item.quantity, "quantity")?,
                added_at: item.added_at,
            });
        }

        rows.into_iter()
            .map(|row| {
                let cart_lines = lines.remove(&row.id).unwrap_or_default();
                row.into_cart(cart_lines)
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_cart(self, lines: Vec<CartLine>) -> CoreResult<Cart> {
        Ok(Cart {
            id: self.id,
            user_id: self.user_id,
            lines,
            status: self.status.parse().map_err(CoreError::StorageError)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    cart_id: Uuid,
    showing_id: Uuid,
    quantity: i32,
    added_at: DateTime<Utc>,
}

const CART_COLUMNS: &str = "id, user_id, status, created_at, updated_at";

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn get_cart(&self, user_id: &str) -> CoreResult<Option<Cart>> {
        let row: Option<CartRow> = sqlx::query_as(&format!("SELECT {} FROM carts WHERE user_id = $1", CART_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => Ok(self.assemble(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn save_cart(&self, cart: &Cart) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // A user's new cart replaces whatever cart row they had before.
        sqlx::query("DELETE FROM carts WHERE user_id = $1 AND id <> $2")
            .bind(&cart.user_id)
            .bind(cart.id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.id)
        .bind(&cart.user_id)
        .bind(cart.status.as_str())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        for line in &cart.lines {
            sqlx::query(
                r#"
                INSERT INTO cart_items (cart_id, showing_id, quantity, added_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(cart.id)
            .bind(line.showing_id)
            .bind(to_i32(line.quantity, "quantity")?)
            .bind(line.added_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn delete_cart(&self, user_id: &str, cart_id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM carts WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(cart_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_checking_out(&self) -> CoreResult<Vec<Cart>> {
        let rows: Vec<CartRow> = sqlx::query_as(&format!(
            "SELECT {} FROM carts WHERE status = 'checking_out' ORDER BY updated_at",
            CART_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        self.assemble(rows).await
    }
}
