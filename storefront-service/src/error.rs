use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use service_core::error::ErrorResponse;
use thiserror::Error;

use crate::models::PlanId;

/// Failures of the storefront's request-level operations.
#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Order total {total} is below the minimum payable amount of {minimum}")]
    InvalidAmount { total: Decimal, minimum: Decimal },

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment signature verification failed")]
    SignatureVerification { gateway_order_id: Option<String> },

    #[error("No order for gateway order id {0}")]
    OrderNotFound(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),

    #[error("Persistence error: {0}")]
    Persistence(anyhow::Error),

    #[error("Cart store error: {0}")]
    Cart(anyhow::Error),
}

impl StorefrontError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorefrontError::GatewayUnavailable(_))
    }
}

impl From<mongodb::error::Error> for StorefrontError {
    fn from(err: mongodb::error::Error) -> Self {
        StorefrontError::Persistence(anyhow::Error::new(err))
    }
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let (status, error_message, details) = match self {
            StorefrontError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                "Validation error".to_string(),
                Some(err.to_string()),
            ),
            StorefrontError::InvalidAmount { .. } => {
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            StorefrontError::GatewayUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Payment gateway unavailable, please try again".to_string(),
                None,
            ),
            StorefrontError::SignatureVerification { .. } => {
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            StorefrontError::OrderNotFound(_) | StorefrontError::PlanNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string(), None)
            }
            StorefrontError::Persistence(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
            ),
            StorefrontError::Cart(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Cart unavailable".to_string(),
                Some(err.to_string()),
            ),
        };

        let body = ErrorResponse::new(error_message, details);
        let body = if retryable { body.retryable() } else { body };
        body.into_response_with(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn gateway_failure_is_a_retryable_500() {
        let err = StorefrontError::GatewayUnavailable("timed out".to_string());
        assert!(err.is_retryable());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn amount_below_minimum_is_a_bad_request() {
        let err = StorefrontError::InvalidAmount {
            total: dec!(0),
            minimum: dec!(1),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_order_is_not_found() {
        let err = StorefrontError::OrderNotFound("order_abc".to_string());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
