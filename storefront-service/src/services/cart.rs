//! Session cart and the stores that hold it between requests.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::StorefrontError;
use crate::middleware::session::SessionKey;
use crate::models::{Plan, PlanId};

/// Quantity of one plan plus the price seen when it was first added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartEntry {
    pub quantity: u32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    entries: BTreeMap<PlanId, CartEntry>,
    #[serde(skip)]
    dirty: bool,
}

/// A cart entry joined to its live catalog plan.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine<'a> {
    pub plan: &'a Plan,
    pub quantity: u32,
    pub price: Decimal,
    pub total: Decimal,
}

impl Cart {
    /// Add `quantity` of `plan`, or set it outright when `update_quantity` is set.
    ///
    /// Setting a quantity of zero removes the entry. Single-instance plans never
    /// exceed one unit.
    pub fn add(&mut self, plan: &Plan, quantity: u32, update_quantity: bool) {
        let policy = plan.quantity_policy;

        if update_quantity && quantity == 0 {
            self.remove(&plan.id);
            return;
        }

        let entry = self.entries.entry(plan.id.clone()).or_insert(CartEntry {
            quantity: 0,
            price: plan.price,
        });
        let next = if update_quantity {
            quantity
        } else {
            entry.quantity.saturating_add(quantity)
        };
        entry.quantity = policy.clamp(next);

        if entry.quantity == 0 {
            self.entries.remove(&plan.id);
        }
        self.dirty = true;
    }

    pub fn remove(&mut self, plan_id: &PlanId) {
        if self.entries.remove(plan_id).is_some() {
            self.dirty = true;
        }
    }

    /// Lines for entries whose plan still exists; unknown plans are skipped.
    pub fn lines<'a>(
        &'a self,
        plans: &'a HashMap<PlanId, Plan>,
    ) -> impl Iterator<Item = CartLine<'a>> + 'a {
        self.entries.iter().filter_map(move |(plan_id, entry)| {
            plans.get(plan_id).map(|plan| CartLine {
                plan,
                quantity: entry.quantity,
                price: entry.price,
                total: entry.price * Decimal::from(entry.quantity),
            })
        })
    }

    pub fn plan_ids(&self) -> Vec<PlanId> {
        self.entries.keys().cloned().collect()
    }

    pub fn entry(&self, plan_id: &PlanId) -> Option<&CartEntry> {
        self.entries.get(plan_id)
    }

    pub fn count(&self) -> u32 {
        self.entries.values().map(|e| e.quantity).sum()
    }

    pub fn total_price(&self) -> Decimal {
        self.entries
            .values()
            .map(|e| e.price * Decimal::from(e.quantity))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// The stored cart, or an empty one.
    async fn load(&self, session: &SessionKey) -> Result<Cart, StorefrontError>;
    async fn save(&self, session: &SessionKey, cart: &Cart) -> Result<(), StorefrontError>;
    async fn clear(&self, session: &SessionKey) -> Result<(), StorefrontError>;
}

/// Carts as JSON strings under `cart:{session}`, expiring with the session.
#[derive(Clone)]
pub struct RedisCartStore {
    connection: ConnectionManager,
    ttl_secs: u64,
}

impl RedisCartStore {
    pub async fn connect(client: redis::Client, ttl_secs: u64) -> Result<Self, redis::RedisError> {
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            ttl_secs,
        })
    }

    fn key(session: &SessionKey) -> String {
        format!("cart:{}", session)
    }
}

fn cart_error(err: impl Into<anyhow::Error>) -> StorefrontError {
    let err = err.into();
    tracing::error!("Cart store failure: {:#}", err);
    StorefrontError::Cart(err)
}

#[async_trait]
impl CartStore for RedisCartStore {
    async fn load(&self, session: &SessionKey) -> Result<Cart, StorefrontError> {
        let mut con = self.connection.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::key(session))
            .query_async(&mut con)
            .await
            .map_err(cart_error)?;

        match raw {
            Some(json) => serde_json::from_str(&json).map_err(cart_error),
            None => Ok(Cart::default()),
        }
    }

    async fn save(&self, session: &SessionKey, cart: &Cart) -> Result<(), StorefrontError> {
        if cart.is_empty() {
            return self.clear(session).await;
        }

        let json = serde_json::to_string(cart).map_err(cart_error)?;
        let mut con = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(Self::key(session))
            .arg(json)
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut con)
            .await
            .map_err(cart_error)?;
        Ok(())
    }

    async fn clear(&self, session: &SessionKey) -> Result<(), StorefrontError> {
        let mut con = self.connection.clone();
        let _: () = redis::cmd("DEL")
            .arg(Self::key(session))
            .query_async(&mut con)
            .await
            .map_err(cart_error)?;
        Ok(())
    }
}

/// Process-local carts for tests and single-node development.
#[derive(Default)]
pub struct MemoryCartStore {
    carts: DashMap<SessionKey, Cart>,
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn load(&self, session: &SessionKey) -> Result<Cart, StorefrontError> {
        Ok(self
            .carts
            .get(session)
            .map(|cart| cart.value().clone())
            .unwrap_or_default())
    }

    async fn save(&self, session: &SessionKey, cart: &Cart) -> Result<(), StorefrontError> {
        if cart.is_empty() {
            self.carts.remove(session);
        } else {
            let mut stored = cart.clone();
            stored.dirty = false;
            self.carts.insert(session.clone(), stored);
        }
        Ok(())
    }

    async fn clear(&self, session: &SessionKey) -> Result<(), StorefrontError> {
        self.carts.remove(session);
        Ok(())
    }
}
