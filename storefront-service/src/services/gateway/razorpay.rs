//! Razorpay Orders API client.
//!
//! Checkout happens in Razorpay's browser widget; the widget posts back
//! `razorpay_order_id`, `razorpay_payment_id` and a signature computed as
//! `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::verify_hmac_sha256;

use super::{
    CallbackPayload, CallbackVerdict, GatewayError, GatewayIntent, IntentRequest, PaymentGateway,
};
use crate::config::RazorpayConfig;
use crate::services::repository::PaymentRecord;

#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    config: RazorpayConfig,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
    notes: OrderNotes<'a>,
}

#[derive(Debug, Serialize)]
struct OrderNotes<'a> {
    order_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: u64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayError {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    code: String,
    description: String,
}

/// The parts of a webhook event that affect order status.
#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<Wrapped<PaymentEntity>>,
    order: Option<Wrapped<OrderEntity>>,
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    id: String,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    fn webhook_verdict(event: WebhookEvent) -> Option<CallbackVerdict> {
        let payment = event.payload.payment.map(|p| p.entity);
        let order_id = event
            .payload
            .order
            .map(|o| o.entity.id)
            .or_else(|| payment.as_ref().and_then(|p| p.order_id.clone()));

        match event.event.as_str() {
            "payment.captured" | "order.paid" => {
                let payment = payment?;
                Some(CallbackVerdict::Captured {
                    gateway_order_id: order_id?,
                    payment: PaymentRecord {
                        payment_id: payment.id,
                        signature: None,
                    },
                })
            }
            "payment.failed" => Some(CallbackVerdict::Declined {
                gateway_order_id: order_id?,
                reason: payment
                    .and_then(|p| p.error_description)
                    .unwrap_or_else(|| "payment failed".to_string()),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn provider(&self) -> &'static str {
        "razorpay"
    }

    fn public_key(&self) -> &str {
        &self.config.key_id
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<GatewayIntent, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let body = CreateOrderRequest {
            amount: request.amount,
            currency: &request.currency,
            receipt: &request.receipt,
            payment_capture: 1,
            notes: OrderNotes {
                order_id: request.order_id.as_str(),
            },
        };

        let url = format!("{}/orders", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "Razorpay create order response");

        if status.is_success() {
            let order: RazorpayOrder =
                serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;
            tracing::info!(
                order_id = %request.order_id,
                gateway_order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                "Razorpay order created"
            );
            Ok(GatewayIntent {
                gateway_order_id: order.id,
                amount: order.amount,
                currency: order.currency,
                checkout_form: None,
            })
        } else {
            let detail = serde_json::from_str::<RazorpayError>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| RazorpayErrorDetail {
                    code: status.as_u16().to_string(),
                    description: body.clone(),
                });
            tracing::warn!(
                order_id = %request.order_id,
                code = %detail.code,
                description = %detail.description,
                "Razorpay order creation failed"
            );
            Err(GatewayError::Rejected {
                code: detail.code,
                description: detail.description,
            })
        }
    }

    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackVerdict, GatewayError> {
        let CallbackPayload::Signed {
            gateway_order_id,
            gateway_payment_id,
            signature,
        } = payload
        else {
            return Err(GatewayError::Unsupported);
        };
        if self.config.key_secret.expose_secret().is_empty() {
            return Err(GatewayError::NotConfigured);
        }

        let signed = format!("{}|{}", gateway_order_id, gateway_payment_id);
        let valid = verify_hmac_sha256(
            self.config.key_secret.expose_secret(),
            signed.as_bytes(),
            signature,
        )
        .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if !valid {
            return Err(GatewayError::SignatureInvalid {
                gateway_order_id: Some(gateway_order_id.clone()),
            });
        }

        Ok(CallbackVerdict::Captured {
            gateway_order_id: gateway_order_id.clone(),
            payment: PaymentRecord {
                payment_id: gateway_payment_id.clone(),
                signature: Some(signature.clone()),
            },
        })
    }

    fn verify_webhook(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<Option<CallbackVerdict>, GatewayError> {
        let secret = self.config.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(GatewayError::NotConfigured);
        }

        let valid = verify_hmac_sha256(secret, body, signature)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        if !valid {
            return Err(GatewayError::SignatureInvalid {
                gateway_order_id: None,
            });
        }

        let event: WebhookEvent =
            serde_json::from_slice(body).map_err(|e| GatewayError::Malformed(e.to_string()))?;
        tracing::debug!(event = %event.event, "Razorpay webhook received");
        Ok(Self::webhook_verdict(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingDetails, CustomerDetails, OrderId};
    use secrecy::Secret;
    use serde_json::json;
    use service_core::utils::hmac_sha256_hex;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_base: &str) -> RazorpayConfig {
        RazorpayConfig {
            key_id: "rzp_test_123".to_string(),
            key_secret: Secret::new("my_secret_key".to_string()),
            webhook_secret: Secret::new("webhook_secret".to_string()),
            api_base: api_base.to_string(),
        }
    }

    fn intent_request(amount: u64) -> IntentRequest {
        let order_id = OrderId::generate();
        IntentRequest {
            receipt: order_id.receipt(),
            order_id,
            amount,
            currency: "INR".to_string(),
            customer: CustomerDetails {
                first_name: "Asha".to_string(),
                last_name: "Rao".to_string(),
                email: "asha@example.com".to_string(),
                address: "12 MG Road".to_string(),
                postal_code: "560001".to_string(),
                city: "Bengaluru".to_string(),
                state: "Karnataka".to_string(),
                phone: "9000000000".to_string(),
            },
            billing: BillingDetails::default(),
            return_url: "http://localhost/return".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
        }
    }

    #[test]
    fn is_configured_requires_both_keys() {
        assert!(RazorpayGateway::new(test_config("http://localhost")).is_configured());

        let mut config = test_config("http://localhost");
        config.key_id = String::new();
        assert!(!RazorpayGateway::new(config).is_configured());
    }

    #[tokio::test]
    async fn create_intent_posts_minor_units_with_capture() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(body_partial_json(json!({
                "amount": 99900,
                "currency": "INR",
                "payment_capture": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_RZP001",
                "entity": "order",
                "amount": 99900,
                "currency": "INR",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = RazorpayGateway::new(test_config(&server.uri()));
        let intent = gateway.create_intent(&intent_request(99900)).await.unwrap();

        assert_eq!(intent.gateway_order_id, "order_RZP001");
        assert_eq!(intent.amount, 99900);
        assert!(intent.checkout_form.is_none());
    }

    #[tokio::test]
    async fn api_error_is_reported_as_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {
                    "code": "BAD_REQUEST_ERROR",
                    "description": "Authentication failed"
                }
            })))
            .mount(&server)
            .await;

        let gateway = RazorpayGateway::new(test_config(&server.uri()));
        let err = gateway.create_intent(&intent_request(100)).await.unwrap_err();

        match err {
            GatewayError::Rejected { code, .. } => assert_eq!(code, "BAD_REQUEST_ERROR"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn valid_callback_signature_is_captured() {
        let gateway = RazorpayGateway::new(test_config("http://localhost"));
        let signature = hmac_sha256_hex("my_secret_key", b"order_123|pay_456").unwrap();

        let verdict = gateway
            .verify_callback(&CallbackPayload::Signed {
                gateway_order_id: "order_123".to_string(),
                gateway_payment_id: "pay_456".to_string(),
                signature: signature.clone(),
            })
            .unwrap();

        assert_eq!(
            verdict,
            CallbackVerdict::Captured {
                gateway_order_id: "order_123".to_string(),
                payment: PaymentRecord {
                    payment_id: "pay_456".to_string(),
                    signature: Some(signature),
                },
            }
        );
    }

    #[test]
    fn invalid_callback_signature_names_the_order() {
        let gateway = RazorpayGateway::new(test_config("http://localhost"));
        let err = gateway
            .verify_callback(&CallbackPayload::Signed {
                gateway_order_id: "order_123".to_string(),
                gateway_payment_id: "pay_456".to_string(),
                signature: "invalid_signature".to_string(),
            })
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::SignatureInvalid { gateway_order_id: Some(ref id) } if id == "order_123"
        ));
    }

    #[test]
    fn callback_with_empty_secret_is_not_configured() {
        let mut config = test_config("http://localhost");
        config.key_secret = Secret::new(String::new());
        let gateway = RazorpayGateway::new(config);
        // HMAC over an empty key is computable by anyone.
        let signature = hmac_sha256_hex("", b"order_123|pay_456").unwrap();

        let err = gateway
            .verify_callback(&CallbackPayload::Signed {
                gateway_order_id: "order_123".to_string(),
                gateway_payment_id: "pay_456".to_string(),
                signature,
            })
            .unwrap_err();

        assert!(matches!(err, GatewayError::NotConfigured));
    }

    #[test]
    fn captured_webhook_carries_no_callback_signature() {
        let gateway = RazorpayGateway::new(test_config("http://localhost"));
        let body = serde_json::to_vec(&json!({
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": { "id": "pay_9", "order_id": "order_123" }
                }
            }
        }))
        .unwrap();
        let signature = hmac_sha256_hex("webhook_secret", &body).unwrap();

        let verdict = gateway.verify_webhook(&body, &signature).unwrap();
        assert_eq!(
            verdict,
            Some(CallbackVerdict::Captured {
                gateway_order_id: "order_123".to_string(),
                payment: PaymentRecord {
                    payment_id: "pay_9".to_string(),
                    signature: None,
                },
            })
        );
    }

    #[test]
    fn webhook_with_bad_signature_is_rejected() {
        let gateway = RazorpayGateway::new(test_config("http://localhost"));
        let err = gateway.verify_webhook(b"{}", "deadbeef").unwrap_err();
        assert!(matches!(err, GatewayError::SignatureInvalid { .. }));
    }

    #[test]
    fn payment_failed_webhook_is_declined() {
        let gateway = RazorpayGateway::new(test_config("http://localhost"));
        let body = serde_json::to_vec(&json!({
            "event": "payment.failed",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_9",
                        "order_id": "order_123",
                        "error_description": "Card declined"
                    }
                }
            }
        }))
        .unwrap();
        let signature = hmac_sha256_hex("webhook_secret", &body).unwrap();

        let verdict = gateway.verify_webhook(&body, &signature).unwrap();
        assert_eq!(
            verdict,
            Some(CallbackVerdict::Declined {
                gateway_order_id: "order_123".to_string(),
                reason: "Card declined".to_string(),
            })
        );
    }

    #[test]
    fn unrelated_webhook_events_are_ignored() {
        let gateway = RazorpayGateway::new(test_config("http://localhost"));
        let body = br#"{"event":"refund.created","payload":{}}"#;
        let signature = hmac_sha256_hex("webhook_secret", body).unwrap();
        assert_eq!(gateway.verify_webhook(body, &signature).unwrap(), None);
    }
}
