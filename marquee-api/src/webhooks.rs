use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use marquee_core::{SettlementNotice, TransactionId};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Succeeded,
    Declined,
}

#[derive(Debug, Deserialize)]
pub struct SettlementWebhook {
    pub transaction_id: String,
    /// The charge's idempotency key, echoed back by the provider.
    pub order_id: Option<Uuid>,
    pub status: SettlementStatus,
    pub reason: Option<String>,
}

impl SettlementWebhook {
    fn into_notice(self) -> SettlementNotice {
        let transaction_id = TransactionId::new(self.transaction_id);
        match self.status {
            SettlementStatus::Succeeded => SettlementNotice::succeeded(transaction_id, self.order_id),
            SettlementStatus::Declined => SettlementNotice::declined(
                transaction_id,
                self.order_id,
                self.reason.unwrap_or_else(|| "declined".to_string()),
            ),
        }
    }
}

/// POST /v1/webhooks/payments
/// Accept a settlement notice and hand it to the reconciler. Answers 503
/// while the queue is full so the provider redelivers later.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SettlementWebhook>,
) -> Result<StatusCode, AppError> {
    let presented = headers.get(SECRET_HEADER).and_then(|h| h.to_str().ok());
    if presented != Some(state.webhook_secret.as_str()) {
        return Err(AppError::Authentication("Invalid webhook signature".to_string()));
    }
    if payload.transaction_id.trim().is_empty() {
        return Err(AppError::Validation("transaction_id is required".to_string()));
    }

    tracing::info!(
        transaction_id = %payload.transaction_id,
        order_id = ?payload.order_id,
        status = ?payload.status,
        "Received settlement webhook"
    );

    state.settlements.try_enqueue(payload.into_notice()).map_err(|e| {
        tracing::warn!("Settlement notice refused: {}", e);
        AppError::from(e)
    })?;

    Ok(StatusCode::ACCEPTED)
}
