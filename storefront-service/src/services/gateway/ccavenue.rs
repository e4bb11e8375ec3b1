//! CCAvenue hosted checkout.
//!
//! There is no server-side order API: the browser posts an AES-128-CBC
//! encrypted `encRequest` to CCAvenue, which later posts an encrypted
//! `encResp` back to us. The AES key is `md5(working_key)` with a fixed IV.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use async_trait::async_trait;
use md5::{Digest, Md5};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use std::collections::{BTreeMap, HashMap};

use super::{
    CallbackPayload, CallbackVerdict, CheckoutForm, GatewayError, GatewayIntent, IntentRequest,
    PaymentGateway,
};
use crate::config::CcavenueConfig;
use crate::services::repository::PaymentRecord;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const IV: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// Hex ciphertext of `plain_text` under `working_key`.
pub fn encrypt(plain_text: &str, working_key: &str) -> String {
    let key = Md5::digest(working_key.as_bytes());
    let cipher_text = Aes128CbcEnc::new(&key, &IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plain_text.as_bytes());
    hex::encode(cipher_text)
}

/// Inverse of [`encrypt`]. Bad hex is `Malformed`; a wrong key (bad padding
/// or non-UTF-8 output) is `SignatureInvalid`.
pub fn decrypt(cipher_hex: &str, working_key: &str) -> Result<String, GatewayError> {
    let bytes = hex::decode(cipher_hex.trim())
        .map_err(|e| GatewayError::Malformed(format!("encResp is not hex: {}", e)))?;
    let key = Md5::digest(working_key.as_bytes());
    let plain = Aes128CbcDec::new(&key, &IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
        .map_err(|_| GatewayError::SignatureInvalid {
            gateway_order_id: None,
        })?;
    String::from_utf8(plain).map_err(|_| GatewayError::SignatureInvalid {
        gateway_order_id: None,
    })
}

#[derive(Clone)]
pub struct CcavenueGateway {
    config: CcavenueConfig,
}

impl CcavenueGateway {
    pub fn new(config: CcavenueConfig) -> Self {
        Self { config }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.merchant_id.is_empty()
            && !self.config.access_code.is_empty()
            && !self.config.working_key.expose_secret().is_empty()
    }

    fn request_fields(&self, request: &IntentRequest) -> Vec<(&'static str, String)> {
        let customer = &request.customer;
        let billing = &request.billing;
        let amount = Decimal::new(request.amount as i64, 2);

        vec![
            ("merchant_id", self.config.merchant_id.clone()),
            ("order_id", request.receipt.clone()),
            ("currency", request.currency.clone()),
            ("amount", format!("{:.2}", amount)),
            ("redirect_url", request.return_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("language", "EN".to_string()),
            ("billing_name", billing.name.clone()),
            ("billing_address", billing.address.clone()),
            ("billing_city", billing.city.clone()),
            ("billing_state", billing.state.clone()),
            ("billing_zip", billing.postal_code.clone()),
            ("billing_country", "India".to_string()),
            ("billing_tel", customer.phone.clone()),
            ("billing_email", customer.email.clone()),
            ("merchant_param1", request.order_id.to_string()),
        ]
    }
}

#[async_trait]
impl PaymentGateway for CcavenueGateway {
    fn provider(&self) -> &'static str {
        "ccavenue"
    }

    fn public_key(&self) -> &str {
        &self.config.access_code
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<GatewayIntent, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let plain = serde_urlencoded::to_string(self.request_fields(request))
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let enc_request = encrypt(&plain, self.config.working_key.expose_secret());

        let mut fields = BTreeMap::new();
        fields.insert("encRequest".to_string(), enc_request);
        fields.insert("access_code".to_string(), self.config.access_code.clone());

        tracing::info!(
            order_id = %request.order_id,
            gateway_order_id = %request.receipt,
            amount = request.amount,
            "CCAvenue checkout request prepared"
        );

        Ok(GatewayIntent {
            gateway_order_id: request.receipt.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            checkout_form: Some(CheckoutForm {
                action: self.config.transaction_url.clone(),
                fields,
            }),
        })
    }

    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackVerdict, GatewayError> {
        let CallbackPayload::Encrypted {
            gateway_order_id: claimed,
            enc_resp,
        } = payload
        else {
            return Err(GatewayError::Unsupported);
        };

        let plain = decrypt(enc_resp, self.config.working_key.expose_secret()).map_err(|e| {
            match e {
                GatewayError::SignatureInvalid { .. } => GatewayError::SignatureInvalid {
                    gateway_order_id: claimed.clone(),
                },
                other => other,
            }
        })?;
        let response: HashMap<String, String> = serde_urlencoded::from_str(&plain)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let gateway_order_id = response
            .get("order_id")
            .cloned()
            .ok_or_else(|| GatewayError::Malformed("response has no order_id".to_string()))?;

        // The cleartext orderNo posted alongside encResp must match what was encrypted.
        if let Some(claimed) = claimed {
            if claimed != &gateway_order_id {
                return Err(GatewayError::SignatureInvalid {
                    gateway_order_id: Some(claimed.clone()),
                });
            }
        }

        let field = |name: &str| response.get(name).cloned().unwrap_or_default();
        let verdict = match field("order_status").as_str() {
            "Success" => CallbackVerdict::Captured {
                gateway_order_id,
                payment: PaymentRecord {
                    payment_id: field("tracking_id"),
                    signature: Some(field("bank_ref_no")).filter(|r| !r.is_empty()),
                },
            },
            "Aborted" => CallbackVerdict::Aborted { gateway_order_id },
            other => {
                let message = field("failure_message");
                let reason = if message.is_empty() {
                    format!("order_status={}", other)
                } else {
                    message
                };
                CallbackVerdict::Declined {
                    gateway_order_id,
                    reason,
                }
            }
        };
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingDetails, CustomerDetails, OrderId};
    use secrecy::Secret;

    const WORKING_KEY: &str = "TESTWORKINGKEY";

    fn gateway() -> CcavenueGateway {
        CcavenueGateway::new(CcavenueConfig {
            merchant_id: "12345".to_string(),
            access_code: "AVAB00AA00AA00AAAA".to_string(),
            working_key: Secret::new(WORKING_KEY.to_string()),
            transaction_url: "https://test.ccavenue.com/transaction".to_string(),
        })
    }

    fn encrypted(body: &str) -> CallbackPayload {
        CallbackPayload::Encrypted {
            gateway_order_id: None,
            enc_resp: encrypt(body, WORKING_KEY),
        }
    }

    #[test]
    fn encryption_matches_known_vector() {
        assert_eq!(
            encrypt("order_id=order_abc&order_status=Success", WORKING_KEY),
            "d72635a8e7143cbfbbb1fcf7ab1a21956e01292c35d2ff747d017f0820fbfbab792bc2e91dbc0b613fd6ef797f7138b8"
        );
    }

    #[test]
    fn wrong_working_key_fails_padding_check() {
        let cipher = encrypt("order_id=order_abc&order_status=Success", WORKING_KEY);
        assert!(matches!(
            decrypt(&cipher, "OTHERKEY"),
            Err(GatewayError::SignatureInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn intent_round_trips_through_working_key() {
        let order_id = OrderId::generate();
        let request = IntentRequest {
            receipt: order_id.receipt(),
            order_id,
            amount: 99900,
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
            return_url: "http://localhost/payment/ccavenue/response".to_string(),
            cancel_url: "http://localhost/payment/ccavenue/response".to_string(),
        };

        let intent = gateway().create_intent(&request).await.unwrap();
        assert_eq!(intent.gateway_order_id, request.receipt);

        let form = intent.checkout_form.unwrap();
        let plain = decrypt(&form.fields["encRequest"], WORKING_KEY).unwrap();
        let fields: HashMap<String, String> = serde_urlencoded::from_str(&plain).unwrap();
        assert_eq!(fields["amount"], "999.00");
        assert_eq!(fields["order_id"], request.receipt);
    }

    #[test]
    fn success_status_is_captured() {
        let verdict = gateway()
            .verify_callback(&encrypted(
                "order_id=order_abc&tracking_id=3100&bank_ref_no=BR1&order_status=Success",
            ))
            .unwrap();
        assert_eq!(
            verdict,
            CallbackVerdict::Captured {
                gateway_order_id: "order_abc".to_string(),
                payment: PaymentRecord {
                    payment_id: "3100".to_string(),
                    signature: Some("BR1".to_string()),
                },
            }
        );
    }

    #[test]
    fn aborted_and_failure_statuses_map_to_negative_verdicts() {
        let aborted = gateway()
            .verify_callback(&encrypted("order_id=order_abc&order_status=Aborted"))
            .unwrap();
        assert_eq!(
            aborted,
            CallbackVerdict::Aborted {
                gateway_order_id: "order_abc".to_string()
            }
        );

        let failed = gateway()
            .verify_callback(&encrypted(
                "order_id=order_abc&order_status=Failure&failure_message=Insufficient+funds",
            ))
            .unwrap();
        assert_eq!(
            failed,
            CallbackVerdict::Declined {
                gateway_order_id: "order_abc".to_string(),
                reason: "Insufficient funds".to_string(),
            }
        );
    }

    #[test]
    fn mismatched_clear_order_number_is_rejected() {
        let payload = CallbackPayload::Encrypted {
            gateway_order_id: Some("order_other".to_string()),
            enc_resp: encrypt("order_id=order_abc&order_status=Success", WORKING_KEY),
        };
        assert!(matches!(
            gateway().verify_callback(&payload),
            Err(GatewayError::SignatureInvalid { .. })
        ));
    }
}
