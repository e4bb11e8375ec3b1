//! Payment gateway clients.
//!
//! Exactly one provider is compiled into a build, chosen with the `razorpay`
//! (default) or `ccavenue` cargo feature. Both sit behind [`PaymentGateway`].

#[cfg(all(feature = "razorpay", feature = "ccavenue"))]
compile_error!("features `razorpay` and `ccavenue` are mutually exclusive");

#[cfg(not(any(feature = "razorpay", feature = "ccavenue")))]
compile_error!("enable exactly one payment gateway feature: `razorpay` or `ccavenue`");

#[cfg(feature = "ccavenue")]
pub mod ccavenue;
#[cfg(feature = "razorpay")]
pub mod razorpay;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::Config;
use crate::error::StorefrontError;
use crate::models::{BillingDetails, CustomerDetails, OrderId};
use crate::services::repository::PaymentRecord;

#[cfg(feature = "ccavenue")]
pub use ccavenue::CcavenueGateway as ConfiguredGateway;
#[cfg(feature = "razorpay")]
pub use razorpay::RazorpayGateway as ConfiguredGateway;

/// Everything a gateway needs to reserve a charge for one order.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub order_id: OrderId,
    pub receipt: String,
    /// Amount in the currency's minor unit (paise for INR).
    pub amount: u64,
    pub currency: String,
    pub customer: CustomerDetails,
    pub billing: BillingDetails,
    /// Where an off-site gateway sends the customer back to.
    pub return_url: String,
    pub cancel_url: String,
}

/// A form the browser must post to the gateway to start payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutForm {
    pub action: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayIntent {
    pub gateway_order_id: String,
    pub amount: u64,
    pub currency: String,
    pub checkout_form: Option<CheckoutForm>,
}

/// Payment result as posted back by the customer's browser.
#[derive(Debug, Clone)]
pub enum CallbackPayload {
    Signed {
        gateway_order_id: String,
        gateway_payment_id: String,
        signature: String,
    },
    Encrypted {
        gateway_order_id: Option<String>,
        enc_resp: String,
    },
}

impl CallbackPayload {
    /// Order id as claimed by the (untrusted) payload.
    pub fn claimed_order_id(&self) -> Option<&str> {
        match self {
            CallbackPayload::Signed {
                gateway_order_id, ..
            } => Some(gateway_order_id),
            CallbackPayload::Encrypted {
                gateway_order_id, ..
            } => gateway_order_id.as_deref(),
        }
    }
}

/// Authenticated outcome of a callback or webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackVerdict {
    Captured {
        gateway_order_id: String,
        payment: PaymentRecord,
    },
    Declined {
        gateway_order_id: String,
        reason: String,
    },
    Aborted {
        gateway_order_id: String,
    },
}

impl CallbackVerdict {
    pub fn gateway_order_id(&self) -> &str {
        match self {
            CallbackVerdict::Captured {
                gateway_order_id, ..
            }
            | CallbackVerdict::Declined {
                gateway_order_id, ..
            }
            | CallbackVerdict::Aborted { gateway_order_id } => gateway_order_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway credentials are not configured")]
    NotConfigured,

    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected the request: {code} - {description}")]
    Rejected { code: String, description: String },

    #[error("malformed gateway response: {0}")]
    Malformed(String),

    #[error("callback signature is invalid")]
    SignatureInvalid { gateway_order_id: Option<String> },

    #[error("callback type is not supported by this gateway")]
    Unsupported,
}

impl From<GatewayError> for StorefrontError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::SignatureInvalid { gateway_order_id } => {
                StorefrontError::SignatureVerification { gateway_order_id }
            }
            GatewayError::Unsupported => StorefrontError::SignatureVerification {
                gateway_order_id: None,
            },
            other => StorefrontError::GatewayUnavailable(other.to_string()),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short provider name, e.g. `razorpay`.
    fn provider(&self) -> &'static str;

    /// Publishable key handed to the browser checkout, if the provider has one.
    fn public_key(&self) -> &str;

    async fn create_intent(&self, request: &IntentRequest) -> Result<GatewayIntent, GatewayError>;

    /// Authenticate a browser callback and decide what it reports.
    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackVerdict, GatewayError>;

    /// Authenticate a server-to-server webhook. `Ok(None)` means the event is
    /// valid but irrelevant to order status.
    fn verify_webhook(
        &self,
        _body: &[u8],
        _signature: &str,
    ) -> Result<Option<CallbackVerdict>, GatewayError> {
        Err(GatewayError::Unsupported)
    }
}

pub fn configured_gateway(config: &Config) -> ConfiguredGateway {
    #[cfg(feature = "razorpay")]
    let gateway = ConfiguredGateway::new(config.razorpay.clone());
    #[cfg(feature = "ccavenue")]
    let gateway = ConfiguredGateway::new(config.ccavenue.clone());

    if gateway.is_configured() {
        tracing::info!(provider = gateway.provider(), "Payment gateway initialized");
    } else {
        tracing::warn!(
            provider = gateway.provider(),
            "Payment gateway credentials not configured - checkout will fail"
        );
    }
    gateway
}
