use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use marquee_cart::Cart;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub showing_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// GET /v1/cart
pub async fn get_cart(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Cart>, AppError> {
    Ok(Json(state.carts.get(&claims.sub).await?))
}

/// POST /v1/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<Cart>), AppError> {
    let cart = state.carts.add_item(&claims.sub, req.showing_id, req.quantity).await?;
    tracing::debug!(user_id = %claims.sub, showing_id = %req.showing_id, quantity = req.quantity, "Item added to cart");
    Ok((StatusCode::CREATED, Json(cart)))
}

/// DELETE /v1/cart/items/{showing_id}
pub async fn remove_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(showing_id): Path<Uuid>,
) -> Result<Json<Cart>, AppError> {
    Ok(Json(state.carts.remove_item(&claims.sub, showing_id).await?))
}

/// DELETE /v1/cart
pub async fn abandon_cart(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, AppError> {
    state.carts.abandon(&claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
