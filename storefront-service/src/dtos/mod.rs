use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    BillingDetails, Broker, CustomerDetails, HostingDetails, Plan, PlanDuration, PlanId,
    QuantityPolicy,
};
use crate::services::cart::{Cart, CartLine};
use crate::services::checkout::OrderDraft;

#[derive(Debug, Serialize)]
pub struct PlanView {
    pub id: PlanId,
    pub name: String,
    pub price: Decimal,
    pub duration: PlanDuration,
    pub duration_label: &'static str,
    pub is_featured: bool,
    pub features: Vec<String>,
    pub specifications: Vec<String>,
    pub quantity_policy: QuantityPolicy,
}

impl From<Plan> for PlanView {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            price: plan.price,
            duration: plan.duration,
            duration_label: plan.duration.label(),
            is_featured: plan.is_featured,
            features: plan.features,
            specifications: plan.specifications,
            quantity_policy: plan.quantity_policy,
        }
    }
}

/// Body of `POST /cart/add/:plan_id`.
#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartForm {
    #[serde(default = "default_quantity")]
    #[validate(range(max = 100, message = "Quantity cannot exceed 100"))]
    pub quantity: u32,
    /// Replace the quantity instead of adding to it.
    #[serde(default)]
    pub update: bool,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub plan_id: PlanId,
    pub name: String,
    pub duration: PlanDuration,
    pub quantity: u32,
    pub price: Decimal,
    pub total: Decimal,
}

impl From<CartLine<'_>> for CartLineView {
    fn from(line: CartLine<'_>) -> Self {
        Self {
            plan_id: line.plan.id.clone(),
            name: line.plan.name.clone(),
            duration: line.plan.duration,
            quantity: line.quantity,
            price: line.price,
            total: line.total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub count: u32,
    pub total: Decimal,
}

impl CartView {
    pub fn new(cart: &Cart, lines: Vec<CartLineView>) -> Self {
        Self {
            lines,
            count: cart.count(),
            total: cart.total_price(),
        }
    }
}

/// Checkout form. Billing fields left blank fall back to the customer's.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderForm {
    #[serde(default)]
    #[validate(length(max = 100))]
    pub domain_name: String,
    #[serde(default)]
    pub broker_name: Broker,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub api_key: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub api_secret: String,

    #[validate(length(min = 1, max = 50, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 250, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, max = 20, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, max = 20, message = "Phone is required"))]
    pub phone: String,

    #[serde(default)]
    #[validate(length(max = 100))]
    pub billing_name: String,
    #[serde(default)]
    #[validate(length(max = 250))]
    pub billing_address: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub billing_city: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub billing_state: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub billing_postal_code: String,
    #[serde(default)]
    #[validate(length(max = 15, message = "GST number is at most 15 characters"))]
    pub gst_number: String,
}

impl From<OrderForm> for OrderDraft {
    fn from(form: OrderForm) -> Self {
        OrderDraft {
            customer: CustomerDetails {
                first_name: form.first_name,
                last_name: form.last_name,
                email: form.email,
                address: form.address,
                postal_code: form.postal_code,
                city: form.city,
                state: form.state,
                phone: form.phone,
            },
            hosting: HostingDetails {
                domain_name: form.domain_name,
                broker: form.broker_name,
                api_key: form.api_key,
                api_secret: form.api_secret,
            },
            billing: BillingDetails {
                name: form.billing_name,
                address: form.billing_address,
                city: form.billing_city,
                state: form.billing_state,
                postal_code: form.billing_postal_code,
                gst_number: form.gst_number,
            },
        }
    }
}

/// Razorpay checkout callback body.
#[derive(Debug, Deserialize)]
pub struct PaymentVerificationRequest {
    #[serde(default)]
    pub razorpay_order_id: String,
    #[serde(default)]
    pub razorpay_payment_id: String,
    #[serde(default)]
    pub razorpay_signature: String,
}

/// CCAvenue posts `encResp` and the clear `orderNo`.
#[derive(Debug, Deserialize)]
pub struct CcavenueResponseForm {
    #[serde(rename = "encResp")]
    pub enc_resp: String,
    #[serde(rename = "orderNo")]
    pub order_no: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub success: bool,
    pub redirect_url: String,
}
