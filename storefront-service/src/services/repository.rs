use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use mongodb::options::IndexOptions;
use mongodb::{bson::doc, Collection, Database, IndexModel};

use crate::error::StorefrontError;
use crate::models::{Order, OrderId, OrderStatus};

/// Gateway-side proof attached to an order when its payment is captured.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub payment_id: String,
    /// Callback signature or bank reference. Webhooks carry none.
    pub signature: Option<String>,
}

/// Order persistence. Status changes are compare-and-set so that concurrent
/// callbacks for one gateway order cannot both apply.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist an order together with its items.
    async fn insert(&self, order: &Order) -> Result<(), StorefrontError>;

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StorefrontError>;

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, StorefrontError>;

    /// Set the gateway order id if none is set yet. Returns whether it was set.
    async fn assign_gateway_order_id(
        &self,
        id: &OrderId,
        gateway_order_id: &str,
    ) -> Result<bool, StorefrontError>;

    /// Move `expected` to `next`, returning false when the stored status differed.
    async fn compare_and_set_status(
        &self,
        gateway_order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
        payment: Option<&PaymentRecord>,
    ) -> Result<bool, StorefrontError>;
}

#[derive(Clone)]
pub struct MongoOrderRepository {
    orders: Collection<Order>,
}

impl MongoOrderRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            orders: db.collection("orders"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), StorefrontError> {
        // Gateway ids are unique once assigned; pending orders without one are ignored.
        let gateway_index = IndexModel::builder()
            .keys(doc! { "gateway_order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("gateway_order_id_idx".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "gateway_order_id": { "$type": "string" } })
                    .build(),
            )
            .build();

        let status_index = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("status_created_idx".to_string())
                    .build(),
            )
            .build();

        self.orders
            .create_indexes([gateway_index, status_index], None)
            .await?;

        tracing::info!("Storefront order indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MongoOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), StorefrontError> {
        self.orders.insert_one(order, None).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StorefrontError> {
        Ok(self.orders.find_one(doc! { "_id": id.as_str() }, None).await?)
    }

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, StorefrontError> {
        let filter = doc! { "gateway_order_id": gateway_order_id };
        Ok(self.orders.find_one(filter, None).await?)
    }

    async fn assign_gateway_order_id(
        &self,
        id: &OrderId,
        gateway_order_id: &str,
    ) -> Result<bool, StorefrontError> {
        let filter = doc! { "_id": id.as_str(), "gateway_order_id": null };
        let update = doc! {
            "$set": {
                "gateway_order_id": gateway_order_id,
                "updated_at": mongodb::bson::DateTime::now()
            }
        };
        let result = self.orders.update_one(filter, update, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn compare_and_set_status(
        &self,
        gateway_order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
        payment: Option<&PaymentRecord>,
    ) -> Result<bool, StorefrontError> {
        let filter = doc! {
            "gateway_order_id": gateway_order_id,
            "status": expected.as_str()
        };
        let mut set = doc! {
            "status": next.as_str(),
            "updated_at": mongodb::bson::DateTime::now()
        };
        if let Some(payment) = payment {
            set.insert("gateway_payment_id", payment.payment_id.as_str());
            if let Some(signature) = &payment.signature {
                set.insert("gateway_signature", signature.as_str());
            }
        }

        let result = self
            .orders
            .update_one(filter, doc! { "$set": set }, None)
            .await?;
        Ok(result.matched_count == 1)
    }
}

/// Orders held in process memory, used by tests and local runs without MongoDB.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<OrderId, Order>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn all(&self) -> Vec<Order> {
        self.orders.iter().map(|o| o.value().clone()).collect()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), StorefrontError> {
        self.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StorefrontError> {
        Ok(self.orders.get(id).map(|o| o.value().clone()))
    }

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, StorefrontError> {
        Ok(self
            .orders
            .iter()
            .find(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id))
            .map(|o| o.value().clone()))
    }

    async fn assign_gateway_order_id(
        &self,
        id: &OrderId,
        gateway_order_id: &str,
    ) -> Result<bool, StorefrontError> {
        match self.orders.get_mut(id) {
            Some(mut order) if order.gateway_order_id.is_none() => {
                order.gateway_order_id = Some(gateway_order_id.to_string());
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_set_status(
        &self,
        gateway_order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
        payment: Option<&PaymentRecord>,
    ) -> Result<bool, StorefrontError> {
        let Some(mut order) = self
            .orders
            .iter_mut()
            .find(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id))
        else {
            return Ok(false);
        };

        if order.status != expected {
            return Ok(false);
        }
        order.status = next;
        order.updated_at = Utc::now();
        if let Some(payment) = payment {
            order.gateway_payment_id = Some(payment.payment_id.clone());
            if let Some(signature) = &payment.signature {
                order.gateway_signature = Some(signature.clone());
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingDetails, Broker, CustomerDetails, HostingDetails};

    fn order() -> Order {
        Order::new(
            CustomerDetails {
                first_name: "Asha".to_string(),
                last_name: "Rao".to_string(),
                email: "asha@example.com".to_string(),
                address: "12 MG Road".to_string(),
                postal_code: "560001".to_string(),
                city: "Bengaluru".to_string(),
                state: "Karnataka".to_string(),
                phone: "9000000000".to_string(),
            },
            HostingDetails {
                domain_name: "algo.example.com".to_string(),
                broker: Broker::default(),
                api_key: String::new(),
                api_secret: String::new(),
            },
            BillingDetails::default(),
            vec![],
        )
    }

    #[tokio::test]
    async fn gateway_id_is_assigned_once() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        repo.insert(&order).await.unwrap();

        assert!(repo.assign_gateway_order_id(&order.id, "order_A").await.unwrap());
        assert!(!repo.assign_gateway_order_id(&order.id, "order_B").await.unwrap());

        let stored = repo.find_by_gateway_order_id("order_A").await.unwrap().unwrap();
        assert_eq!(stored.id, order.id);
    }

    #[tokio::test]
    async fn status_update_requires_expected_status() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        repo.insert(&order).await.unwrap();
        repo.assign_gateway_order_id(&order.id, "order_A").await.unwrap();

        let payment = PaymentRecord {
            payment_id: "pay_1".to_string(),
            signature: Some("sig".to_string()),
        };
        assert!(repo
            .compare_and_set_status("order_A", OrderStatus::Pending, OrderStatus::Paid, Some(&payment))
            .await
            .unwrap());
        assert!(!repo
            .compare_and_set_status("order_A", OrderStatus::Pending, OrderStatus::Failed, None)
            .await
            .unwrap());

        let stored = repo.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        assert_eq!(stored.gateway_payment_id.as_deref(), Some("pay_1"));
    }
}
