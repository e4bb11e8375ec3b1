//! Payment callbacks and the customer-facing status pages.

use askama::Template;
#[cfg(feature = "ccavenue")]
use axum::{response::Redirect, Form};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};

#[cfg(feature = "ccavenue")]
use crate::dtos::CcavenueResponseForm;
use crate::dtos::{PaymentVerificationRequest, VerificationResponse};
use crate::error::StorefrontError;
use crate::middleware::session::SessionKey;
use crate::models::{Order, OrderStatus};
use crate::services::gateway::CallbackPayload;
use crate::startup::AppState;

const FAILED_PAGE: &str = "/payment/failed";

fn success_page(gateway_order_id: &str) -> String {
    format!("/payment/success/{}", gateway_order_id)
}

fn outcome(result: &Result<Order, StorefrontError>) -> VerificationResponse {
    match result {
        Ok(order) if order.status == OrderStatus::Paid => VerificationResponse {
            success: true,
            redirect_url: success_page(order.gateway_order_id.as_deref().unwrap_or_default()),
        },
        _ => VerificationResponse {
            success: false,
            redirect_url: FAILED_PAGE.to_string(),
        },
    }
}

/// `POST /payment/verification`: the browser relays the gateway's signed
/// result. Every outcome is a 200 with `{success, redirect_url}`.
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    body: Result<Json<PaymentVerificationRequest>, JsonRejection>,
) -> Json<VerificationResponse> {
    let Ok(Json(body)) = body else {
        tracing::warn!("Payment verification with unreadable body");
        return Json(outcome(&Err(StorefrontError::SignatureVerification {
            gateway_order_id: None,
        })));
    };

    let payload = CallbackPayload::Signed {
        gateway_order_id: body.razorpay_order_id,
        gateway_payment_id: body.razorpay_payment_id,
        signature: body.razorpay_signature,
    };
    let result = state.reconciliation.verify(&payload, Some(&session)).await;
    if let Err(err) = &result {
        tracing::warn!(error = %err, "Payment verification failed");
    }
    Json(outcome(&result))
}

/// Any method other than POST on the verification route.
pub async fn verification_method_not_allowed() -> Json<VerificationResponse> {
    Json(VerificationResponse {
        success: false,
        redirect_url: FAILED_PAGE.to_string(),
    })
}

/// `POST /payment/ccavenue/response`: CCAvenue's encrypted result.
#[cfg(feature = "ccavenue")]
pub async fn ccavenue_response(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    Form(form): Form<CcavenueResponseForm>,
) -> Redirect {
    let payload = CallbackPayload::Encrypted {
        gateway_order_id: form.order_no,
        enc_resp: form.enc_resp,
    };
    match state.reconciliation.verify(&payload, Some(&session)).await {
        Ok(order) => {
            let gateway_order_id = order.gateway_order_id.clone().unwrap_or_default();
            match order.status {
                OrderStatus::Paid => Redirect::to(&success_page(&gateway_order_id)),
                OrderStatus::Cancelled => {
                    Redirect::to(&format!("/payment/cancelled/{}", gateway_order_id))
                }
                _ => Redirect::to(FAILED_PAGE),
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "CCAvenue response rejected");
            Redirect::to(FAILED_PAGE)
        }
    }
}

/// Order facts shown on a status page.
pub struct OrderSummary {
    pub invoice_number: String,
    pub gateway_order_id: String,
    pub status: String,
    pub email: String,
    pub total: String,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            invoice_number: order.id.invoice_number(),
            gateway_order_id: order.gateway_order_id.clone().unwrap_or_default(),
            status: order.status.to_string(),
            email: order.customer.email.clone(),
            total: format!("{:.2}", order.total_cost()),
        }
    }
}

#[derive(Template)]
#[template(path = "payment_status.html")]
pub struct PaymentStatusPage {
    pub heading: &'static str,
    pub message: &'static str,
    pub order: Option<OrderSummary>,
}

impl PaymentStatusPage {
    fn for_order(order: &Order) -> Self {
        let (heading, message) = match order.status {
            OrderStatus::Paid => (
                "Payment successful",
                "Your payment was received. An invoice is on its way to your inbox.",
            ),
            OrderStatus::Pending => (
                "Payment pending",
                "We have not received confirmation from the payment gateway yet.",
            ),
            OrderStatus::Failed => (
                "Payment failed",
                "Your payment could not be completed. No order has been confirmed.",
            ),
            OrderStatus::Cancelled => (
                "Payment cancelled",
                "You cancelled the payment. Your order was not placed.",
            ),
        };
        Self {
            heading,
            message,
            order: Some(OrderSummary::from(order)),
        }
    }
}

pub async fn payment_success(
    State(state): State<AppState>,
    Path(gateway_order_id): Path<String>,
) -> Result<PaymentStatusPage, StorefrontError> {
    let order = state.reconciliation.find_order(&gateway_order_id).await?;
    Ok(PaymentStatusPage::for_order(&order))
}

/// Generic failure page, used when no order can be named.
pub async fn payment_failed_page() -> PaymentStatusPage {
    PaymentStatusPage {
        heading: "Payment failed",
        message: "Your payment could not be verified. If money was deducted, contact support.",
        order: None,
    }
}

/// Force a non-paid order to `failed` and show its status.
pub async fn payment_failed(
    State(state): State<AppState>,
    Path(gateway_order_id): Path<String>,
) -> Result<PaymentStatusPage, StorefrontError> {
    let order = state.reconciliation.mark_failed(&gateway_order_id).await?;
    Ok(PaymentStatusPage::for_order(&order))
}

/// Force a non-paid order to `cancelled` and show its status.
pub async fn payment_cancelled(
    State(state): State<AppState>,
    Path(gateway_order_id): Path<String>,
) -> Result<PaymentStatusPage, StorefrontError> {
    let order = state.reconciliation.mark_cancelled(&gateway_order_id).await?;
    Ok(PaymentStatusPage::for_order(&order))
}
