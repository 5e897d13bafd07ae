use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use marquee_cart::CartError;
use marquee_catalog::{CatalogError, InventoryError, PricingError};
use marquee_core::{CoreError, GatewayError};
use marquee_order::{FinalizeError, OrderError, QueueError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PaymentRequired(String),
    #[error("{0}")]
    Gone(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::Internal(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::Validation(msg),
            CoreError::NotFound(msg) => AppError::NotFound(format!("Not found: {}", msg)),
            CoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Invalid(_) => AppError::Validation(err.to_string()),
            CatalogError::MovieNotFound(_) | CatalogError::ShowingNotFound(_) => AppError::NotFound(err.to_string()),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::InvalidConfig(_) => AppError::Internal(err.into()),
            _ => AppError::Validation(err.to_string()),
        }
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        let msg = err.to_string();
        match err {
            InventoryError::ShowingNotFound(_) | InventoryError::ReservationNotFound(_) => AppError::NotFound(msg),
            InventoryError::ReservationExpired(_) => AppError::Gone(msg),
            InventoryError::CapacityExceeded { .. }
            | InventoryError::ReservationReleased(_)
            | InventoryError::AlreadyCommitted(_)
            | InventoryError::ShowingAlreadyRegistered(_) => AppError::Conflict(msg),
            InventoryError::InvalidQuantity(_) | InventoryError::InvalidCapacity { .. } => AppError::Validation(msg),
        }
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        let msg = err.to_string();
        match err {
            CartError::Inventory(e) => e.into(),
            CartError::Storage(e) => e.into(),
            CartError::EmptyCart | CartError::InvalidQuantity(_) => AppError::Validation(msg),
            CartError::CartNotFound(_) | CartError::NotInCart(_) | CartError::ShowingNotFound(_) => {
                AppError::NotFound(msg)
            }
            CartError::AlreadyInCart(_) | CartError::CartLocked | CartError::CheckoutInProgress => {
                AppError::Conflict(msg)
            }
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Declined(_) => AppError::PaymentRequired(err.to_string()),
            GatewayError::Unavailable(_) => AppError::Unavailable(err.to_string()),
        }
    }
}

impl From<FinalizeError> for AppError {
    fn from(err: FinalizeError) -> Self {
        let msg = err.to_string();
        match err {
            FinalizeError::Cart(e) => e.into(),
            FinalizeError::Inventory(e) => e.into(),
            FinalizeError::Pricing(e) => e.into(),
            FinalizeError::Gateway(e) => e.into(),
            FinalizeError::Storage(e) => e.into(),
            FinalizeError::Order(OrderError::NotFound(_))
            | FinalizeError::OrderNotFound(_)
            | FinalizeError::ShowingNotFound(_)
            | FinalizeError::FlagNotFound(_) => AppError::NotFound(msg),
            FinalizeError::Order(OrderError::InvalidTransition { .. })
            | FinalizeError::AlreadyResolved(_)
            | FinalizeError::PaymentNotRefundable { .. }
            | FinalizeError::SeatsNotReturnable { .. }
            | FinalizeError::RefundAmountUnknown(_) => AppError::Conflict(msg),
            FinalizeError::Forbidden => AppError::Authorization(msg),
            e @ FinalizeError::InconsistentSettlement { .. } => AppError::Internal(e.into()),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_catalog::ReservationId;
    use marquee_core::TransactionId;
    use marquee_order::PaymentStatus;
    use uuid::Uuid;

    #[test]
    fn test_checkout_failures_map_to_http_status() {
        let sold_out: AppError = FinalizeError::Cart(CartError::Inventory(InventoryError::CapacityExceeded {
            showing_id: Uuid::new_v4(),
            requested: 3,
            available: 1,
        }))
        .into();
        assert_eq!(sold_out.status(), StatusCode::CONFLICT);

        let declined: AppError = FinalizeError::Gateway(GatewayError::Declined("insufficient funds".into())).into();
        assert_eq!(declined.status(), StatusCode::PAYMENT_REQUIRED);

        let down: AppError = FinalizeError::Gateway(GatewayError::Unavailable("timeout".into())).into();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);

        let expired: AppError = InventoryError::ReservationExpired(ReservationId::new()).into();
        assert_eq!(expired.status(), StatusCode::GONE);

        let empty: AppError = CartError::EmptyCart.into();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_blocked_refunds_are_conflicts() {
        let parked: AppError = FinalizeError::PaymentNotRefundable {
            order_id: Uuid::new_v4(),
            status: PaymentStatus::ManualReview,
        }
        .into();
        assert_eq!(parked.status(), StatusCode::CONFLICT);
        assert!(parked.to_string().contains("manual_review"));

        let untracked: AppError = FinalizeError::RefundAmountUnknown(TransactionId::new("txn_1")).into();
        assert_eq!(untracked.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_storage_failures_hide_details() {
        let err: AppError = CoreError::StorageError("connection reset".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let full: AppError = QueueError::Full.into();
        assert_eq!(full.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
