use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod carts;
pub mod error;
pub mod middleware;
pub mod movies;
pub mod orders;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

use crate::middleware::{
    admin_auth_middleware, circuit_breaker_middleware, moderator_auth_middleware, rate_limit_middleware,
    user_auth_middleware,
};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let public = Router::new()
        .route("/health", get(health))
        .route("/v1/movies", get(movies::list_movies))
        .route("/v1/movies/{id}/showings", get(movies::list_showings))
        .route("/v1/showings/{id}", get(movies::get_showing))
        .route("/v1/webhooks/payments", post(webhooks::handle_payment_webhook));

    // Checkout sits behind the circuit breaker, listing orders does not.
    let checkout = post(orders::place_order)
        .route_layer(from_fn_with_state(state.clone(), circuit_breaker_middleware))
        .get(orders::list_orders);

    let customer = Router::new()
        .route("/v1/cart", get(carts::get_cart).delete(carts::abandon_cart))
        .route("/v1/cart/items", post(carts::add_item))
        .route("/v1/cart/items/{showing_id}", delete(carts::remove_item))
        .route("/v1/orders", checkout)
        .route("/v1/orders/events", get(orders::order_events))
        .route("/v1/orders/{id}", get(orders::get_order))
        .route("/v1/orders/{id}/refund", post(orders::refund_order))
        .route_layer(from_fn_with_state(state.clone(), user_auth_middleware));

    let catalog_admin = Router::new()
        .route("/v1/admin/movies", post(movies::create_movie))
        .route("/v1/admin/showings", post(movies::create_showing))
        .route_layer(from_fn_with_state(state.clone(), moderator_auth_middleware));

    let admin = Router::new()
        .route("/v1/admin/payments", get(admin::list_payments))
        .route("/v1/admin/carts/{user_id}", get(admin::get_user_cart))
        .route("/v1/admin/settlements", get(admin::list_settlements))
        .route("/v1/admin/settlements/{id}/resolve", post(admin::resolve_settlement))
        .route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .merge(public)
        .merge(customer)
        .merge(catalog_admin)
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
