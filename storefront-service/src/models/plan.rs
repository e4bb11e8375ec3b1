//! Catalog plans.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog key of a plan; also the key of its cart entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlanId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlanId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Billing period of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlanDuration {
    #[serde(rename = "1_month")]
    OneMonth,
    #[serde(rename = "3_months")]
    ThreeMonths,
    #[serde(rename = "6_months")]
    SixMonths,
    #[default]
    #[serde(rename = "1_year")]
    OneYear,
}

impl PlanDuration {
    /// Suffix shown after a price, e.g. `₹999 /year`.
    pub fn label(&self) -> &'static str {
        match self {
            PlanDuration::OneMonth => "/month",
            PlanDuration::ThreeMonths => "/3 months",
            PlanDuration::SixMonths => "/6 months",
            PlanDuration::OneYear => "/year",
        }
    }
}

/// How many units of a plan a single cart may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityPolicy {
    #[default]
    Multiple,
    /// One server per order; repeated adds never raise the quantity above 1.
    SingleInstance,
}

impl QuantityPolicy {
    pub fn clamp(self, quantity: u32) -> u32 {
        match self {
            QuantityPolicy::Multiple => quantity,
            QuantityPolicy::SingleInstance => quantity.min(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(rename = "_id")]
    pub id: PlanId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub duration: PlanDuration,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub specifications: Vec<String>,
    #[serde(default)]
    pub quantity_policy: QuantityPolicy,
}

impl Plan {
    pub fn new(id: impl Into<PlanId>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            duration: PlanDuration::default(),
            is_featured: false,
            features: Vec::new(),
            specifications: Vec::new(),
            quantity_policy: QuantityPolicy::default(),
        }
    }

    pub fn single_instance(mut self) -> Self {
        self.quantity_policy = QuantityPolicy::SingleInstance;
        self
    }
}
