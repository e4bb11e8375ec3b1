//! Payment reconciliation: apply gateway outcomes to orders.
//!
//! All status writes go through [`OrderStatus::transition`] and a
//! compare-and-set on the stored status, so concurrent callbacks for one
//! gateway order cannot both win. Only the request whose write moved an
//! order to `paid` dispatches the invoice.

use std::sync::Arc;

use crate::error::StorefrontError;
use crate::middleware::session::SessionKey;
use crate::models::{IllegalTransition, Order, OrderStatus, PaymentEvent, Transition};
use crate::services::cart::CartStore;
use crate::services::checkout::to_minor_units;
use crate::services::gateway::{CallbackPayload, CallbackVerdict, GatewayError, PaymentGateway};
use crate::services::invoice::InvoiceDispatcher;
use crate::services::metrics::{record_captured_amount, record_transition};
use crate::services::repository::{OrderRepository, PaymentRecord};

const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Result of applying one payment event to an order.
#[derive(Debug, Clone)]
pub enum Applied {
    Moved { order: Order, from: OrderStatus },
    Unchanged(Order),
    Rejected { order: Order, error: IllegalTransition },
}

impl Applied {
    pub fn order(&self) -> &Order {
        match self {
            Applied::Moved { order, .. }
            | Applied::Unchanged(order)
            | Applied::Rejected { order, .. } => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Applied::Moved { order, .. }
            | Applied::Unchanged(order)
            | Applied::Rejected { order, .. } => order,
        }
    }
}

#[derive(Clone)]
pub struct ReconciliationService {
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartStore>,
    gateway: Arc<dyn PaymentGateway>,
    invoices: InvoiceDispatcher,
    currency: String,
}

impl ReconciliationService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartStore>,
        gateway: Arc<dyn PaymentGateway>,
        invoices: InvoiceDispatcher,
        currency: String,
    ) -> Self {
        Self {
            orders,
            carts,
            gateway,
            invoices,
            currency,
        }
    }

    /// Verify a browser callback and settle the order it names.
    ///
    /// An invalid signature fails the named order (unless it is already paid)
    /// and is reported as `SignatureVerification`. Replaying a valid capture
    /// for a paid order succeeds without side effects.
    pub async fn verify(
        &self,
        payload: &CallbackPayload,
        session: Option<&SessionKey>,
    ) -> Result<Order, StorefrontError> {
        let verdict = match self.gateway.verify_callback(payload) {
            Ok(verdict) => verdict,
            Err(GatewayError::SignatureInvalid { gateway_order_id }) => {
                return Err(self
                    .reject_signature(payload, gateway_order_id.as_deref())
                    .await);
            }
            Err(err) => {
                tracing::error!(
                    claimed_order_id = ?payload.claimed_order_id(),
                    error = %err,
                    "Payment callback could not be verified"
                );
                return Err(err.into());
            }
        };

        let applied = self.settle(verdict).await?;

        if applied.order().status == OrderStatus::Paid {
            if let Some(session) = session {
                // The payment stands even when the cart cannot be cleared.
                if let Err(err) = self.carts.clear(session).await {
                    tracing::warn!(
                        session = %session,
                        gateway_order_id = ?applied.order().gateway_order_id,
                        error = %err,
                        "Failed to clear cart after payment"
                    );
                }
            }
        }

        Ok(applied.into_order())
    }

    /// Authenticate and apply a server-to-server webhook. `Ok(None)` for
    /// events that do not concern order status.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<Option<Order>, StorefrontError> {
        let verdict = match self.gateway.verify_webhook(body, signature) {
            Ok(Some(verdict)) => verdict,
            Ok(None) => return Ok(None),
            Err(GatewayError::SignatureInvalid { .. }) => {
                tracing::error!(
                    provider = self.gateway.provider(),
                    signature = %signature,
                    "Webhook signature verification failed"
                );
                return Err(StorefrontError::SignatureVerification {
                    gateway_order_id: None,
                });
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Some(self.settle(verdict).await?.into_order()))
    }

    /// Force a non-paid order to `failed`. A paid order is left as is.
    pub async fn mark_failed(&self, gateway_order_id: &str) -> Result<Order, StorefrontError> {
        self.forced(gateway_order_id, PaymentEvent::PaymentFailed).await
    }

    /// Force a non-paid order to `cancelled`. A paid order is left as is.
    pub async fn mark_cancelled(&self, gateway_order_id: &str) -> Result<Order, StorefrontError> {
        self.forced(gateway_order_id, PaymentEvent::PaymentCancelled)
            .await
    }

    pub async fn find_order(&self, gateway_order_id: &str) -> Result<Order, StorefrontError> {
        self.orders
            .find_by_gateway_order_id(gateway_order_id)
            .await?
            .ok_or_else(|| StorefrontError::OrderNotFound(gateway_order_id.to_string()))
    }

    async fn forced(
        &self,
        gateway_order_id: &str,
        event: PaymentEvent,
    ) -> Result<Order, StorefrontError> {
        let applied = self.apply(gateway_order_id, event, None).await?;
        if let Applied::Rejected { order, error } = &applied {
            tracing::warn!(
                order_id = %order.id,
                gateway_order_id = %gateway_order_id,
                error = %error,
                "Status change refused"
            );
        }
        Ok(applied.into_order())
    }

    async fn reject_signature(
        &self,
        payload: &CallbackPayload,
        gateway_order_id: Option<&str>,
    ) -> StorefrontError {
        match payload {
            CallbackPayload::Signed {
                gateway_order_id,
                gateway_payment_id,
                signature,
            } => tracing::error!(
                gateway_order_id = %gateway_order_id,
                gateway_payment_id = %gateway_payment_id,
                signature = %signature,
                "Payment signature verification failed"
            ),
            CallbackPayload::Encrypted { .. } => tracing::error!(
                claimed_order_id = ?payload.claimed_order_id(),
                "Encrypted payment response failed to decrypt"
            ),
        }

        if let Some(gateway_order_id) = gateway_order_id {
            match self
                .apply(gateway_order_id, PaymentEvent::SignatureRejected, None)
                .await
            {
                Ok(Applied::Rejected { order, .. }) => tracing::warn!(
                    order_id = %order.id,
                    status = %order.status,
                    "Invalid signature ignored for settled order"
                ),
                Ok(_) => {}
                Err(StorefrontError::OrderNotFound(_)) => {}
                Err(err) => tracing::error!(
                    gateway_order_id = %gateway_order_id,
                    error = %err,
                    "Failed to mark order failed after signature rejection"
                ),
            }
        }

        StorefrontError::SignatureVerification {
            gateway_order_id: gateway_order_id.map(str::to_string),
        }
    }

    async fn settle(&self, verdict: CallbackVerdict) -> Result<Applied, StorefrontError> {
        let result = match &verdict {
            CallbackVerdict::Captured {
                gateway_order_id,
                payment,
            } => {
                self.apply(gateway_order_id, PaymentEvent::PaymentCaptured, Some(payment))
                    .await
            }
            CallbackVerdict::Declined {
                gateway_order_id,
                reason,
            } => {
                tracing::info!(gateway_order_id = %gateway_order_id, reason = %reason, "Payment declined");
                self.apply(gateway_order_id, PaymentEvent::PaymentFailed, None)
                    .await
            }
            CallbackVerdict::Aborted { gateway_order_id } => {
                self.apply(gateway_order_id, PaymentEvent::PaymentCancelled, None)
                    .await
            }
        };

        let applied = match result {
            Ok(applied) => applied,
            Err(StorefrontError::OrderNotFound(gateway_order_id)) => {
                let payment_id = match &verdict {
                    CallbackVerdict::Captured { payment, .. } => payment.payment_id.as_str(),
                    _ => "",
                };
                tracing::error!(
                    gateway_order_id = %gateway_order_id,
                    gateway_payment_id = %payment_id,
                    "Verified payment references an unknown order"
                );
                return Err(StorefrontError::OrderNotFound(gateway_order_id));
            }
            Err(err) => return Err(err),
        };

        if let Applied::Moved { order, from } = &applied {
            if order.status == OrderStatus::Paid {
                tracing::info!(
                    order_id = %order.id,
                    gateway_order_id = ?order.gateway_order_id,
                    previous = %from,
                    "Order paid"
                );
                if let Some(amount) = to_minor_units(order.total_cost()) {
                    record_captured_amount(&self.currency, amount);
                }
                self.invoices.dispatch(order.clone());
            }
        }

        Ok(applied)
    }

    /// Apply `event` with compare-and-set, re-reading the order when another
    /// writer got there first.
    async fn apply(
        &self,
        gateway_order_id: &str,
        event: PaymentEvent,
        payment: Option<&PaymentRecord>,
    ) -> Result<Applied, StorefrontError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let mut order = self
                .orders
                .find_by_gateway_order_id(gateway_order_id)
                .await?
                .ok_or_else(|| StorefrontError::OrderNotFound(gateway_order_id.to_string()))?;

            let (from, to) = match order.status.transition(event) {
                Ok(Transition::Moved { from, to }) => (from, to),
                Ok(Transition::Unchanged(_)) => return Ok(Applied::Unchanged(order)),
                Err(error) => return Ok(Applied::Rejected { order, error }),
            };

            let record = payment.filter(|_| to == OrderStatus::Paid);
            if self
                .orders
                .compare_and_set_status(gateway_order_id, from, to, record)
                .await?
            {
                record_transition(from.as_str(), to.as_str());
                order.status = to;
                if let Some(record) = record {
                    order.gateway_payment_id = Some(record.payment_id.clone());
                    if record.signature.is_some() {
                        order.gateway_signature = record.signature.clone();
                    }
                }
                return Ok(Applied::Moved { order, from });
            }

            tracing::debug!(
                gateway_order_id = %gateway_order_id,
                expected = %from,
                "Order status changed concurrently; retrying"
            );
        }

        Err(StorefrontError::Persistence(anyhow::anyhow!(
            "order {} kept changing status while applying {:?}",
            gateway_order_id,
            event
        )))
    }
}
