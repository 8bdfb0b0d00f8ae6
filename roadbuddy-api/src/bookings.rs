use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use roadbuddy_booking::BookingView;
use roadbuddy_core::identity::CurrentUser;
use roadbuddy_core::Booking;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/users/me/bookings", get(my_bookings))
}

/// The rider and the trip's driver are the only parties to a booking.
fn ensure_party(view: &BookingView, user: &CurrentUser) -> Result<(), AppError> {
    let is_rider = view.booking.rider_id == user.id;
    let is_driver = view.trip.as_ref().is_some_and(|t| t.driver_id == user.id);
    if is_rider || is_driver {
        Ok(())
    } else {
        Err(AppError::AuthorizationError(format!(
            "Booking {} belongs to another rider",
            view.booking.id
        )))
    }
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, AppError> {
    let view = state.engine.queries.get_booking(id).await?;
    ensure_party(&view, &user)?;
    Ok(Json(view))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let view = state.engine.queries.get_booking(id).await?;
    ensure_party(&view, &user)?;

    let result = state.engine.cancellations.cancel(id).await;
    state.metrics.record_cancellation(&result);
    Ok(Json(result?))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    Ok(Json(state.engine.queries.bookings_for_rider(&user.id).await?))
}
