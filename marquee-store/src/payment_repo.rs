use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::{CoreError, CoreResult, SettlementOutcome, TransactionId};
use marquee_order::{FlaggedSettlement, InconsistencyKind, Payment, PaymentFilter, PaymentRepository};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::storage_error;

pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    user_id: String,
    transaction_id: Option<String>,
    amount_cents: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            user_id: row.user_id,
            transaction_id: row.transaction_id.map(TransactionId),
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: row.status.parse().map_err(CoreError::StorageError)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FlagRow {
    id: Uuid,
    transaction_id: String,
    order_id: Option<Uuid>,
    kind: String,
    outcome: String,
    decline_reason: Option<String>,
    detail: String,
    flagged_at: DateTime<Utc>,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<FlagRow> for FlaggedSettlement {
    type Error = CoreError;

    fn try_from(row: FlagRow) -> Result<Self, Self::Error> {
        Ok(FlaggedSettlement {
            id: row.id,
            transaction_id: TransactionId(row.transaction_id),
            order_id: row.order_id,
            kind: row.kind.parse().map_err(CoreError::StorageError)?,
            outcome: match (row.outcome.as_str(), row.decline_reason) {
                ("succeeded", _) => SettlementOutcome::Succeeded,
                ("declined", reason) => SettlementOutcome::Declined {
                    reason: reason.unwrap_or_default(),
                },
                (other, _) => {
                    return Err(CoreError::StorageError(format!("unknown settlement outcome: {}", other)))
                }
            },
            detail: row.detail,
            flagged_at: row.flagged_at,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
        })
    }
}

const PAYMENT_COLUMNS: &str =
    "id, order_id, user_id, transaction_id, amount_cents, currency, status, created_at, updated_at";
const FLAG_COLUMNS: &str =
    "id, transaction_id, order_id, kind, outcome, decline_reason, detail, flagged_at, resolved, resolved_at";

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn create_payment(&self, payment: &Payment) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, user_id, transaction_id, amount_cents, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.user_id)
        .bind(payment.transaction_id.as_ref().map(TransactionId::as_str))
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_payment_by_order(&self, order_id: Uuid) -> CoreResult<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {} FROM payments WHERE order_id = $1", PAYMENT_COLUMNS))
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        row.map(Payment::try_from).transpose()
    }

    async fn get_payment_by_transaction(&self, transaction_id: &TransactionId) -> CoreResult<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {} FROM payments WHERE transaction_id = $1", PAYMENT_COLUMNS))
                .bind(transaction_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        row.map(Payment::try_from).transpose()
    }

    async fn update_payment(&self, payment: &Payment) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE payments SET status = $2, transaction_id = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(payment.id)
        .bind(payment.status.as_str())
        .bind(payment.transaction_id.as_ref().map(TransactionId::as_str))
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("payment {}", payment.id)));
        }
        Ok(())
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> CoreResult<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payments
            WHERE ($1::text IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY created_at DESC
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(filter.user_id.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.created_from)
        .bind(filter.created_to)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn create_flag(&self, flag: &FlaggedSettlement) -> CoreResult<()> {
        let (outcome, decline_reason) = match &flag.outcome {
            SettlementOutcome::Succeeded => ("succeeded", None),
            SettlementOutcome::Declined { reason } => ("declined", Some(reason.as_str())),
        };
        sqlx::query(
            r#"
            INSERT INTO flagged_settlements
                (id, transaction_id, order_id, kind, outcome, decline_reason, detail, flagged_at, resolved, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(flag.id)
        .bind(flag.transaction_id.as_str())
        .bind(flag.order_id)
        .bind(flag.kind.as_str())
        .bind(outcome)
        .bind(decline_reason)
        .bind(&flag.detail)
        .bind(flag.flagged_at)
        .bind(flag.resolved)
        .bind(flag.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_flag(&self, id: Uuid) -> CoreResult<Option<FlaggedSettlement>> {
        let row: Option<FlagRow> =
            sqlx::query_as(&format!("SELECT {} FROM flagged_settlements WHERE id = $1", FLAG_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        row.map(FlaggedSettlement::try_from).transpose()
    }

    async fn find_flag(
        &self,
        transaction_id: &TransactionId,
        kind: InconsistencyKind,
    ) -> CoreResult<Option<FlaggedSettlement>> {
        let row: Option<FlagRow> = sqlx::query_as(&format!(
            "SELECT {} FROM flagged_settlements WHERE transaction_id = $1 AND kind = $2",
            FLAG_COLUMNS
        ))
        .bind(transaction_id.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(FlaggedSettlement::try_from).transpose()
    }

    async fn list_flags(&self, include_resolved: bool) -> CoreResult<Vec<FlaggedSettlement>> {
        let rows: Vec<FlagRow> = sqlx::query_as(&format!(
            "SELECT {} FROM flagged_settlements WHERE $1 OR NOT resolved ORDER BY flagged_at DESC",
            FLAG_COLUMNS
        ))
        .bind(include_resolved)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(FlaggedSettlement::try_from).collect()
    }

    async fn resolve_flag(&self, id: Uuid, resolved_at: DateTime<Utc>) -> CoreResult<()> {
        let result = sqlx::query("UPDATE flagged_settlements SET resolved = TRUE, resolved_at = $2 WHERE id = $1")
            .bind(id)
            .bind(resolved_at)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("flagged settlement {}", id)));
        }
        Ok(())
    }
}
