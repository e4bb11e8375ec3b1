use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;

use crate::error::StorefrontError;
use crate::startup::AppState;

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Razorpay server-to-server events. Signed over the raw body with the
/// webhook secret.
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), StorefrontError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(StorefrontError::SignatureVerification {
            gateway_order_id: None,
        })?;

    match state.reconciliation.handle_webhook(&body, signature).await {
        Ok(Some(order)) => Ok((
            StatusCode::OK,
            Json(json!({ "status": "processed", "order_status": order.status })),
        )),
        Ok(None) => Ok((StatusCode::OK, Json(json!({ "status": "ignored" })))),
        // Acknowledge so the gateway stops retrying events for orders we do not hold.
        Err(StorefrontError::OrderNotFound(_)) => {
            Ok((StatusCode::OK, Json(json!({ "status": "unknown_order" }))))
        }
        Err(err) => Err(err),
    }
}
