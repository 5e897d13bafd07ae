use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;

use crate::state::AppState;

const WINDOW_SECONDS: u64 = 60;

/// Requests each client IP may make per minute, by route group. Zero turns
/// the limit off for that group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimits {
    pub general_per_minute: u64,
    pub checkout_per_minute: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    General,
    /// Placing and refunding orders, which reach the payment provider.
    Checkout,
    /// Provider callbacks; never limited.
    Webhook,
}

impl RateScope {
    pub fn of(method: &Method, path: &str) -> Self {
        if path.starts_with("/v1/webhooks/") {
            RateScope::Webhook
        } else if method == Method::POST
            && (path == "/v1/orders" || (path.starts_with("/v1/orders/") && path.ends_with("/refund")))
        {
            RateScope::Checkout
        } else {
            RateScope::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateScope::General => "general",
            RateScope::Checkout => "checkout",
            RateScope::Webhook => "webhook",
        }
    }
}

impl RateLimits {
    pub fn limit_for(&self, scope: RateScope) -> Option<u64> {
        let limit = match scope {
            RateScope::General => self.general_per_minute,
            RateScope::Checkout => self.checkout_per_minute,
            RateScope::Webhook => return None,
        };
        (limit > 0).then_some(limit)
    }
}

pub fn rate_limit_key(scope: RateScope, client: &str) -> String {
    format!("ratelimit:{}:{}", scope.as_str(), client)
}

/// Fixed window per client IP and route group, backed by Redis. Without
/// Redis, or when Redis errors, requests pass.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };
    let scope = RateScope::of(req.method(), req.uri().path());
    let Some(limit) = state.rate_limits.limit_for(scope) else {
        return next.run(req).await;
    };

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = rate_limit_key(scope, &ip);

    match redis.check_rate_limit(&key, limit, WINDOW_SECONDS).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::debug!(scope = scope.as_str(), client = %ip, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "Rate limit exceeded" })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, failing open: {}", e);
            next.run(req).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_fall_into_scopes() {
        assert_eq!(RateScope::of(&Method::POST, "/v1/orders"), RateScope::Checkout);
        assert_eq!(
            RateScope::of(&Method::POST, "/v1/orders/5b1c/refund"),
            RateScope::Checkout
        );
        assert_eq!(RateScope::of(&Method::GET, "/v1/orders"), RateScope::General);
        assert_eq!(RateScope::of(&Method::GET, "/v1/movies"), RateScope::General);
        assert_eq!(
            RateScope::of(&Method::POST, "/v1/webhooks/payments"),
            RateScope::Webhook
        );
    }

    #[test]
    fn test_limits_per_scope() {
        let limits = RateLimits {
            general_per_minute: 120,
            checkout_per_minute: 0,
        };
        assert_eq!(limits.limit_for(RateScope::General), Some(120));
        assert_eq!(limits.limit_for(RateScope::Checkout), None);
        assert_eq!(limits.limit_for(RateScope::Webhook), None);

        // one client's checkout budget is separate from its browsing budget
        assert_ne!(
            rate_limit_key(RateScope::General, "10.0.0.1"),
            rate_limit_key(RateScope::Checkout, "10.0.0.1")
        );
    }
}
