use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    Extension, Form, Json,
};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dtos::OrderForm;
use crate::error::StorefrontError;
use crate::middleware::session::SessionKey;
use crate::services::checkout::CheckoutIntent;
use crate::startup::AppState;

/// Validate the checkout form, create the order and open a gateway intent.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    form: Result<Form<OrderForm>, FormRejection>,
) -> Result<(StatusCode, Json<CheckoutIntent>), StorefrontError> {
    let Form(form) = form.map_err(|rejection| {
        let mut error = ValidationError::new("malformed");
        error.message = Some(Cow::Owned(rejection.body_text()));
        let mut errors = ValidationErrors::new();
        errors.add("form", error);
        StorefrontError::Validation(errors)
    })?;
    form.validate()?;

    let intent = state.checkout.begin(&session, form.into()).await?;
    Ok((StatusCode::CREATED, Json(intent)))
}
