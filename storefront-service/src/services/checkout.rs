//! Checkout: turn a session cart into a pending order and a gateway intent.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::sync::Arc;

use crate::config::CheckoutConfig;
use crate::error::StorefrontError;
use crate::middleware::session::SessionKey;
use crate::models::{BillingDetails, CustomerDetails, HostingDetails, Order, OrderId, OrderItem};
use crate::services::cart::CartStore;
use crate::services::catalog::CatalogRepository;
use crate::services::gateway::{CheckoutForm, GatewayError, IntentRequest, PaymentGateway};
use crate::services::metrics::record_checkout;
use crate::services::repository::OrderRepository;

/// Path the off-site gateway posts its encrypted result back to.
pub const GATEWAY_RETURN_PATH: &str = "/payment/ccavenue/response";

/// Customer-entered details of a checkout, already validated.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub customer: CustomerDetails,
    pub hosting: HostingDetails,
    pub billing: BillingDetails,
}

/// What the browser needs to open the gateway checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutIntent {
    pub order_id: OrderId,
    pub gateway_order_id: String,
    /// Minor units.
    pub amount: u64,
    pub currency: String,
    pub total: Decimal,
    pub provider: &'static str,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_form: Option<CheckoutForm>,
}

/// `round(total * 100)` as an integer; `None` for negative or oversized totals.
pub fn to_minor_units(total: Decimal) -> Option<u64> {
    (total * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
}

#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartStore>,
    gateway: Arc<dyn PaymentGateway>,
    settings: CheckoutConfig,
    public_url: String,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutConfig,
        public_url: String,
    ) -> Self {
        Self {
            catalog,
            orders,
            carts,
            gateway,
            settings,
            public_url,
        }
    }

    /// Snapshot the cart into a pending order, persist it and reserve the
    /// charge with the gateway.
    ///
    /// The cart is cleared only once the gateway intent exists. A rejected
    /// amount leaves nothing persisted; a gateway failure leaves a pending
    /// order without a gateway id and the cart intact.
    pub async fn begin(
        &self,
        session: &SessionKey,
        draft: OrderDraft,
    ) -> Result<CheckoutIntent, StorefrontError> {
        let cart = self.carts.load(session).await?;
        let plans = self.catalog.plans_by_ids(&cart.plan_ids()).await?;
        let items: Vec<OrderItem> = cart
            .lines(&plans)
            .map(|line| OrderItem {
                plan_id: line.plan.id.clone(),
                plan_name: line.plan.name.clone(),
                duration: line.plan.duration,
                price: line.price,
                quantity: line.quantity,
            })
            .collect();

        let order = Order::new(draft.customer, draft.hosting, draft.billing, items);
        let total = order.total_cost();

        if total < self.settings.minimum_amount {
            record_checkout("below_minimum");
            tracing::info!(
                session = %session,
                total = %total,
                "Checkout rejected below minimum amount"
            );
            return Err(StorefrontError::InvalidAmount {
                total,
                minimum: self.settings.minimum_amount,
            });
        }

        let amount = to_minor_units(total).ok_or_else(|| StorefrontError::InvalidAmount {
            total,
            minimum: self.settings.minimum_amount,
        })?;

        self.orders.insert(&order).await?;
        tracing::info!(
            order_id = %order.id,
            total = %total,
            items = order.items.len(),
            "Order created"
        );

        let return_url = format!("{}{}", self.public_url, GATEWAY_RETURN_PATH);
        let request = IntentRequest {
            order_id: order.id.clone(),
            receipt: order.id.receipt(),
            amount,
            currency: self.settings.currency.clone(),
            customer: order.customer.clone(),
            billing: order.billing.clone(),
            return_url: return_url.clone(),
            cancel_url: return_url,
        };

        let intent = match tokio::time::timeout(
            self.settings.gateway_timeout(),
            self.gateway.create_intent(&request),
        )
        .await
        {
            Ok(Ok(intent)) => intent,
            Ok(Err(err)) => return Err(self.gateway_failure(&order, err)),
            Err(_) => return Err(self.gateway_failure(&order, GatewayError::Timeout)),
        };

        if !self
            .orders
            .assign_gateway_order_id(&order.id, &intent.gateway_order_id)
            .await?
        {
            return Err(StorefrontError::Persistence(anyhow::anyhow!(
                "order {} already has a gateway order id",
                order.id
            )));
        }

        self.carts.clear(session).await?;
        record_checkout("intent_created");

        Ok(CheckoutIntent {
            order_id: order.id,
            gateway_order_id: intent.gateway_order_id,
            amount: intent.amount,
            currency: intent.currency,
            total,
            provider: self.gateway.provider(),
            key: self.gateway.public_key().to_string(),
            checkout_form: intent.checkout_form,
        })
    }

    fn gateway_failure(&self, order: &Order, err: GatewayError) -> StorefrontError {
        record_checkout("gateway_unavailable");
        tracing::warn!(
            order_id = %order.id,
            provider = self.gateway.provider(),
            error = %err,
            "Gateway intent creation failed; order left pending"
        );
        StorefrontError::GatewayUnavailable(err.to_string())
    }
}
