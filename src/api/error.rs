//! HTTP mapping for [`EcommerceError`].
//!
//! Every error becomes `{"error": <code>, "message": <text>}`. Storage
//! failures are logged and reported to clients as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::aggregates::{CartError, CouponError, OrderError, ProductError, ReturnError};
use crate::EcommerceError;

fn order_status(e: &OrderError) -> StatusCode {
    match e {
        OrderError::NoItems | OrderError::ReasonRequired => StatusCode::BAD_REQUEST,
        OrderError::NotCancellable(_)
        | OrderError::NotReturnable(_)
        | OrderError::ReturnWindowClosed { .. }
        | OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
    }
}

fn product_parts(e: &ProductError) -> (StatusCode, &'static str) {
    match e {
        ProductError::MissingName => (StatusCode::BAD_REQUEST, "validation_failed"),
        ProductError::InvalidPricing(_) => (StatusCode::BAD_REQUEST, "invalid_pricing"),
        ProductError::UnknownBox(_) => (StatusCode::BAD_REQUEST, "unknown_box"),
    }
}

impl EcommerceError {
    /// Status code and machine-readable error code.
    pub fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Coupon(e) => match e {
                CouponError::UsageExceeded => (StatusCode::CONFLICT, e.code()),
                _ => (StatusCode::BAD_REQUEST, e.code()),
            },
            Self::Order(e) => (order_status(e), e.code()),
            Self::Return(e) => match e {
                ReturnError::Order(inner) => (order_status(inner), e.code()),
                ReturnError::AlreadyRequested | ReturnError::AlreadyDecided(_) => (StatusCode::CONFLICT, e.code()),
                ReturnError::NotesRequired => (StatusCode::BAD_REQUEST, e.code()),
            },
            Self::Cart(e) => match e {
                CartError::ItemNotFound => (StatusCode::NOT_FOUND, "item_not_found"),
                CartError::EmptyCart => (StatusCode::BAD_REQUEST, "empty_cart"),
                CartError::Changed => (StatusCode::CONFLICT, "cart_changed"),
                CartError::ProductUnavailable(_) => (StatusCode::NOT_FOUND, "product_unavailable"),
                CartError::Product(p) => product_parts(p),
            },
            Self::Product(e) => product_parts(e),
            Self::Review(_) => (StatusCode::BAD_REQUEST, "invalid_rating"),
            Self::CouponCode(_) => (StatusCode::BAD_REQUEST, "invalid_coupon_code"),
            Self::Quantity(_) => (StatusCode::BAD_REQUEST, "invalid_quantity"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::InsufficientStock(_) => (StatusCode::CONFLICT, "insufficient_stock"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            Self::StorageError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();

        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;

    #[test]
    fn test_status_mapping() {
        assert_eq!(EcommerceError::from(CouponError::Expired).parts(), (StatusCode::BAD_REQUEST, "expired"));
        assert_eq!(
            EcommerceError::from(OrderError::NotCancellable(OrderStatus::Shipped)).parts(),
            (StatusCode::CONFLICT, "not_cancellable")
        );
        assert_eq!(
            EcommerceError::from(ReturnError::Order(OrderError::ReturnWindowClosed { days: 30 })).parts(),
            (StatusCode::CONFLICT, "return_window_closed")
        );
        assert_eq!(EcommerceError::Forbidden.parts().0, StatusCode::FORBIDDEN);
        assert_eq!(
            EcommerceError::from(crate::store::StoreError::CartChanged).parts(),
            (StatusCode::CONFLICT, "cart_changed")
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let response = EcommerceError::StorageError("password=hunter2".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
