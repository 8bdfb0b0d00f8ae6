use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use roadbuddy_booking::NewPaymentMethod;
use roadbuddy_core::identity::CurrentUser;
use roadbuddy_core::{PaymentMethod, PaymentMethodType};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// A stored method as shown to its owner. The provider token stays server-side.
#[derive(Debug, Serialize)]
pub struct PaymentMethodResponse {
    pub id: Uuid,
    pub method_type: PaymentMethodType,
    pub masked_identifier: String,
    pub expiry: Option<NaiveDate>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentMethod> for PaymentMethodResponse {
    fn from(m: PaymentMethod) -> Self {
        Self {
            id: m.id,
            method_type: m.method_type,
            masked_identifier: m.masked_identifier,
            expiry: m.expiry,
            is_default: m.is_default,
            created_at: m.created_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payment-methods", get(list_methods).post(add_method))
        .route("/v1/payment-methods/{id}/default", post(set_default))
        .route("/v1/payment-methods/{id}", delete(remove_method))
}

async fn list_methods(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<PaymentMethodResponse>>, AppError> {
    let methods = state.engine.wallet.list_methods(&user.id).await?;
    Ok(Json(methods.into_iter().map(Into::into).collect()))
}

async fn add_method(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<NewPaymentMethod>,
) -> Result<(StatusCode, Json<PaymentMethodResponse>), AppError> {
    let method = state.engine.wallet.add_method(&user.id, req).await?;
    Ok((StatusCode::CREATED, Json(method.into())))
}

async fn set_default(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentMethodResponse>, AppError> {
    Ok(Json(state.engine.wallet.set_default(&user.id, id).await?.into()))
}

async fn remove_method(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.engine.wallet.remove_method(&user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
