use axum::{
    extract::{Path, Query, State},
    Json,
};
use marquee_cart::Cart;
use marquee_order::{FlaggedSettlement, Payment, PaymentFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SettlementsQuery {
    #[serde(default)]
    pub include_resolved: bool,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub flag: FlaggedSettlement,
    pub refund_id: Option<String>,
}

/// GET /v1/admin/payments?user_id=&status=&created_from=&created_to=
pub async fn list_payments(
    State(state): State<AppState>,
    Query(filter): Query<PaymentFilter>,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(state.payments.list_payments(&filter).await?))
}

/// GET /v1/admin/carts/{user_id}
pub async fn get_user_cart(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Cart>, AppError> {
    Ok(Json(state.carts.get(&user_id).await?))
}

/// GET /v1/admin/settlements
/// Settlement notices parked for manual reconciliation.
pub async fn list_settlements(
    State(state): State<AppState>,
    Query(query): Query<SettlementsQuery>,
) -> Result<Json<Vec<FlaggedSettlement>>, AppError> {
    Ok(Json(state.reconciler.list_flags(query.include_resolved).await?))
}

/// POST /v1/admin/settlements/{id}/resolve
/// Refund the money behind a flagged settlement and close the flag.
pub async fn resolve_settlement(
    State(state): State<AppState>,
    Path(flag_id): Path<Uuid>,
) -> Result<Json<ResolveResponse>, AppError> {
    let (flag, refund_id) = state.reconciler.resolve(flag_id).await?;
    tracing::info!(flag_id = %flag_id, refund_id = ?refund_id, "Flagged settlement resolved");
    Ok(Json(ResolveResponse { flag, refund_id }))
}
