use async_trait::async_trait;
use dashmap::DashMap;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions, Collection, Database};
use std::collections::HashMap;

use crate::error::StorefrontError;
use crate::models::{Plan, PlanId};

/// Read-only view of the plan catalog.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Featured plans first, then by name.
    async fn list_plans(&self) -> Result<Vec<Plan>, StorefrontError>;
    async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>, StorefrontError>;
    async fn plans_by_ids(&self, ids: &[PlanId]) -> Result<HashMap<PlanId, Plan>, StorefrontError>;
}

#[derive(Clone)]
pub struct MongoCatalogRepository {
    plans: Collection<Plan>,
}

impl MongoCatalogRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            plans: db.collection("plans"),
        }
    }
}

#[async_trait]
impl CatalogRepository for MongoCatalogRepository {
    async fn list_plans(&self) -> Result<Vec<Plan>, StorefrontError> {
        let options = FindOptions::builder()
            .sort(doc! { "is_featured": -1, "name": 1 })
            .build();
        let cursor = self.plans.find(doc! {}, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>, StorefrontError> {
        Ok(self.plans.find_one(doc! { "_id": id.as_str() }, None).await?)
    }

    async fn plans_by_ids(&self, ids: &[PlanId]) -> Result<HashMap<PlanId, Plan>, StorefrontError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<&str> = ids.iter().map(PlanId::as_str).collect();
        let cursor = self.plans.find(doc! { "_id": { "$in": ids } }, None).await?;
        let plans: Vec<Plan> = cursor.try_collect().await?;
        Ok(plans.into_iter().map(|p| (p.id.clone(), p)).collect())
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    plans: DashMap<PlanId, Plan>,
}

impl InMemoryCatalog {
    pub fn new(plans: impl IntoIterator<Item = Plan>) -> Self {
        let catalog = Self::default();
        for plan in plans {
            catalog.upsert(plan);
        }
        catalog
    }

    pub fn upsert(&self, plan: Plan) {
        self.plans.insert(plan.id.clone(), plan);
    }

    pub fn delete(&self, id: &PlanId) {
        self.plans.remove(id);
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn list_plans(&self) -> Result<Vec<Plan>, StorefrontError> {
        let mut plans: Vec<Plan> = self.plans.iter().map(|p| p.value().clone()).collect();
        plans.sort_by(|a, b| {
            b.is_featured
                .cmp(&a.is_featured)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(plans)
    }

    async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>, StorefrontError> {
        Ok(self.plans.get(id).map(|p| p.value().clone()))
    }

    async fn plans_by_ids(&self, ids: &[PlanId]) -> Result<HashMap<PlanId, Plan>, StorefrontError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.plans.get(id).map(|p| (id.clone(), p.value().clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn featured_plans_list_first() {
        let mut featured = Plan::new("pro", "Pro VPS", dec!(1999));
        featured.is_featured = true;
        let catalog = InMemoryCatalog::new([
            Plan::new("basic", "Basic VPS", dec!(999)),
            featured,
        ]);

        let plans = catalog.list_plans().await.unwrap();
        assert_eq!(plans[0].id, PlanId::new("pro"));
    }

    #[tokio::test]
    async fn plans_by_ids_ignores_unknown_ids() {
        let catalog = InMemoryCatalog::new([Plan::new("basic", "Basic VPS", dec!(999))]);
        let found = catalog
            .plans_by_ids(&[PlanId::new("basic"), PlanId::new("missing")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
