use axum::{
    extract::{Path, State},
    Json,
};

use crate::dtos::PlanView;
use crate::error::StorefrontError;
use crate::models::PlanId;
use crate::startup::AppState;

pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<PlanView>>, StorefrontError> {
    let plans = state.catalog.list_plans().await?;
    Ok(Json(plans.into_iter().map(PlanView::from).collect()))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<PlanView>, StorefrontError> {
    let plan_id = PlanId::from(plan_id);
    let plan = state
        .catalog
        .get_plan(&plan_id)
        .await?
        .ok_or(StorefrontError::PlanNotFound(plan_id))?;
    Ok(Json(plan.into()))
}
