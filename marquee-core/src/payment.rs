use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier assigned by the payment provider to a charge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Echoed back by the provider on settlement notices. Also makes retries
    /// of the same charge safe on the provider side.
    pub idempotency_key: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub token: Masked<String>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Payment declined: {0}")]
    Declined(String),
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorize and capture `amount_cents` against `token`.
    async fn charge(&self, request: &ChargeRequest) -> Result<TransactionId, GatewayError>;

    /// Return funds for a previously settled transaction. Returns the refund id.
    async fn refund(
        &self,
        transaction_id: &TransactionId,
        amount_cents: i64,
    ) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Succeeded,
    Declined { reason: String },
}

/// The provider's final word on a transaction, delivered asynchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementNotice {
    pub transaction_id: TransactionId,
    pub order_id: Option<Uuid>,
    pub outcome: SettlementOutcome,
    pub received_at: DateTime<Utc>,
}

impl SettlementNotice {
    pub fn succeeded(transaction_id: TransactionId, order_id: Option<Uuid>) -> Self {
        Self {
            transaction_id,
            order_id,
            outcome: SettlementOutcome::Succeeded,
            received_at: Utc::now(),
        }
    }

    pub fn declined(
        transaction_id: TransactionId,
        order_id: Option<Uuid>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            order_id,
            outcome: SettlementOutcome::Declined {
                reason: reason.into(),
            },
            received_at: Utc::now(),
        }
    }
}
