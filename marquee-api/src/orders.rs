use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures_util::{Stream, StreamExt};
use marquee_order::{FinalizeError, Order};
use marquee_shared::Masked;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    /// Card token from the payment provider's client SDK.
    pub payment_token: Masked<String>,
}

/// POST /v1/orders
/// Check out the caller's cart and charge for it. The order stays
/// `pending_payment` until the provider confirms settlement.
pub async fn place_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.finalizer.place_order(&claims.sub, req.payment_token).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /v1/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = state
        .finalizer
        .orders()
        .list_for_user(&claims.sub)
        .await
        .map_err(FinalizeError::from)?;
    Ok(Json(orders))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.finalizer.get_order(order_id, &claims.actor()).await?))
}

/// POST /v1/orders/{id}/refund
pub async fn refund_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.finalizer.refund(order_id, &claims.actor()).await?;
    Ok(Json(order))
}

/// GET /v1/orders/events
/// Server-sent order lifecycle events. Users see their own orders, admins
/// see everything including flagged settlements without a known owner.
pub async fn order_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let is_admin = claims.role.is_admin();
    let user_id = claims.sub;

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let visible = match &result {
            Ok(event) => is_admin || event.user_id() == Some(user_id.as_str()),
            Err(_) => false,
        };
        async move {
            match result {
                Ok(event) if visible => Event::default().event(event.name()).json_data(&event).ok().map(Ok),
                _ => None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
