//! Session cart endpoints.

use axum::{
    extract::{Path, State},
    Extension, Form, Json,
};
use validator::Validate;

use crate::dtos::{AddToCartForm, CartLineView, CartView};
use crate::error::StorefrontError;
use crate::middleware::session::SessionKey;
use crate::models::PlanId;
use crate::services::cart::Cart;
use crate::startup::AppState;

async fn render_cart(state: &AppState, cart: &Cart) -> Result<CartView, StorefrontError> {
    let plans = state.catalog.plans_by_ids(&cart.plan_ids()).await?;
    let lines = cart.lines(&plans).map(CartLineView::from).collect();
    Ok(CartView::new(cart, lines))
}

pub async fn view_cart(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
) -> Result<Json<CartView>, StorefrontError> {
    let cart = state.carts.load(&session).await?;
    Ok(Json(render_cart(&state, &cart).await?))
}

/// Add a plan, or set its quantity when `update=true`. The form body is optional.
pub async fn add_to_cart(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    Path(plan_id): Path<String>,
    form: Option<Form<AddToCartForm>>,
) -> Result<Json<CartView>, StorefrontError> {
    let form = form.map(|Form(f)| f).unwrap_or(AddToCartForm {
        quantity: 1,
        update: false,
    });
    form.validate()?;

    let plan_id = PlanId::from(plan_id);
    let plan = state
        .catalog
        .get_plan(&plan_id)
        .await?
        .ok_or(StorefrontError::PlanNotFound(plan_id))?;

    let mut cart = state.carts.load(&session).await?;
    cart.add(&plan, form.quantity, form.update);
    if cart.is_dirty() {
        state.carts.save(&session, &cart).await?;
    }

    tracing::debug!(session = %session, plan_id = %plan.id, count = cart.count(), "Cart updated");
    Ok(Json(render_cart(&state, &cart).await?))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    Path(plan_id): Path<String>,
) -> Result<Json<CartView>, StorefrontError> {
    let mut cart = state.carts.load(&session).await?;
    cart.remove(&PlanId::from(plan_id));
    if cart.is_dirty() {
        state.carts.save(&session, &cart).await?;
    }
    Ok(Json(render_cart(&state, &cart).await?))
}
