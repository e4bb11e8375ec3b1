//! Orders, their line items, and the payment status state machine.

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::plan::{PlanDuration, PlanId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Receipt reference sent to the gateway; unique per order and at most 40 chars.
    pub fn receipt(&self) -> String {
        format!("order_{}", self.0.replace('-', ""))
    }

    /// Human-facing invoice number, e.g. `BS-1A2B3C4D`.
    pub fn invoice_number(&self) -> String {
        let short: String = self.0.chars().filter(|c| *c != '-').take(8).collect();
        format!("BS-{}", short.to_uppercase())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Apply a payment event.
    ///
    /// `paid` is terminal: a repeated capture is a no-op and every other event
    /// is rejected. A capture reported for a failed or cancelled order still
    /// wins, because the gateway has already taken the money.
    pub fn transition(self, event: PaymentEvent) -> Result<Transition, IllegalTransition> {
        use OrderStatus::*;
        use PaymentEvent::*;

        let to = match (self, event) {
            (Pending, PaymentCaptured) => Paid,
            (Pending, SignatureRejected | PaymentFailed) => Failed,
            (Pending, PaymentCancelled) => Cancelled,

            (Paid, PaymentCaptured) => return Ok(Transition::Unchanged(Paid)),
            (Paid, _) => return Err(IllegalTransition { from: self, event }),

            (Failed | Cancelled, PaymentCaptured) => Paid,
            (Failed, SignatureRejected | PaymentFailed) => return Ok(Transition::Unchanged(Failed)),
            (Cancelled, PaymentCancelled) => return Ok(Transition::Unchanged(Cancelled)),
            (Failed, PaymentCancelled) => Cancelled,
            (Cancelled, PaymentFailed) => Failed,
            // A bad signature never overrides the customer's own cancel.
            (Cancelled, SignatureRejected) => {
                return Err(IllegalTransition { from: self, event });
            }
        };

        Ok(Transition::Moved { from: self, to })
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the gateway (or the customer, via the gateway UI) reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    PaymentCaptured,
    SignatureRejected,
    PaymentFailed,
    PaymentCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved { from: OrderStatus, to: OrderStatus },
    Unchanged(OrderStatus),
}

impl Transition {
    pub fn status(&self) -> OrderStatus {
        match self {
            Transition::Moved { to, .. } => *to,
            Transition::Unchanged(status) => *status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {event:?} to a {from} order")]
pub struct IllegalTransition {
    pub from: OrderStatus,
    pub event: PaymentEvent,
}

/// Broker the hosted trading stack connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Broker {
    #[serde(rename = "5paisa")]
    FivePaisa,
    #[serde(rename = "5paisa_xts")]
    FivePaisaXts,
    #[serde(rename = "aliceblue")]
    AliceBlue,
    #[serde(rename = "angelone")]
    AngelOne,
    #[serde(rename = "compositedge_xts")]
    CompositedgeXts,
    #[serde(rename = "dhan")]
    Dhan,
    #[serde(rename = "dhan_sandbox")]
    DhanSandbox,
    #[serde(rename = "firstock")]
    Firstock,
    #[serde(rename = "flattrade")]
    Flattrade,
    #[serde(rename = "fyers")]
    Fyers,
    #[serde(rename = "groww")]
    Groww,
    #[serde(rename = "iifl_xts")]
    IiflXts,
    #[serde(rename = "indiabulls")]
    IndiaBulls,
    #[serde(rename = "indmoney")]
    IndMoney,
    #[serde(rename = "kotak_securities")]
    KotakSecurities,
    #[serde(rename = "paytm")]
    Paytm,
    #[serde(rename = "pocketful")]
    Pocketful,
    #[serde(rename = "shoonya")]
    Shoonya,
    #[serde(rename = "upstox")]
    Upstox,
    #[serde(rename = "wisdom_capital_xts")]
    WisdomCapitalXts,
    #[serde(rename = "zebu")]
    Zebu,
    #[default]
    #[serde(rename = "zerodha")]
    Zerodha,
}

impl Broker {
    pub fn display_name(&self) -> &'static str {
        match self {
            Broker::FivePaisa => "5paisa",
            Broker::FivePaisaXts => "5paisa (XTS)",
            Broker::AliceBlue => "Aliceblue",
            Broker::AngelOne => "AngelOne",
            Broker::CompositedgeXts => "Compositedge (XTS)",
            Broker::Dhan => "Dhan",
            Broker::DhanSandbox => "Dhan (Sandbox)",
            Broker::Firstock => "Firstock",
            Broker::Flattrade => "Flattrade",
            Broker::Fyers => "Fyers",
            Broker::Groww => "Groww",
            Broker::IiflXts => "IIFL (XTS)",
            Broker::IndiaBulls => "IndiaBulls",
            Broker::IndMoney => "IndMoney",
            Broker::KotakSecurities => "Kotak Securities",
            Broker::Paytm => "Paytm",
            Broker::Pocketful => "Pocketful",
            Broker::Shoonya => "Shoonya",
            Broker::Upstox => "Upstox",
            Broker::WisdomCapitalXts => "Wisdom Capital (XTS)",
            Broker::Zebu => "Zebu",
            Broker::Zerodha => "Zerodha",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address: String,
    pub postal_code: String,
    pub city: String,
    pub state: String,
    pub phone: String,
}

impl CustomerDetails {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostingDetails {
    pub domain_name: String,
    pub broker: Broker,
    pub api_key: String,
    pub api_secret: String,
}

/// Billing block; every field falls back to the customer's own details.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BillingDetails {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub gst_number: String,
}

impl BillingDetails {
    pub fn resolved(self, customer: &CustomerDetails) -> Self {
        fn or(value: String, fallback: &str) -> String {
            if value.trim().is_empty() {
                fallback.to_string()
            } else {
                value
            }
        }

        Self {
            name: or(self.name, &customer.full_name()),
            address: or(self.address, &customer.address),
            city: or(self.city, &customer.city),
            state: or(self.state, &customer.state),
            postal_code: or(self.postal_code, &customer.postal_code),
            gst_number: self.gst_number,
        }
    }
}

/// Price and quantity snapshot of one plan at checkout time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub plan_id: PlanId,
    pub plan_name: String,
    pub duration: PlanDuration,
    pub price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    pub fn cost(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    pub customer: CustomerDetails,
    pub hosting: HostingDetails,
    pub billing: BillingDetails,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A fresh `pending` order with no gateway correlation yet.
    pub fn new(
        customer: CustomerDetails,
        hosting: HostingDetails,
        billing: BillingDetails,
        items: Vec<OrderItem>,
    ) -> Self {
        let now = Utc::now();
        let billing = billing.resolved(&customer);
        Self {
            id: OrderId::generate(),
            customer,
            hosting,
            billing,
            items,
            status: OrderStatus::Pending,
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_signature: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_cost(&self) -> Decimal {
        self.items.iter().map(OrderItem::cost).sum()
    }
}
