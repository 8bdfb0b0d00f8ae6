use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::{Stream, StreamExt};
use roadbuddy_booking::ReserveRequest;
use roadbuddy_core::identity::CurrentUser;
use roadbuddy_core::trip::{NewTrip, TripQuery};
use roadbuddy_core::{Booking, Trip, TripStatus};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: TripStatus,
}

#[derive(Debug, Serialize)]
pub struct CascadeOutcome {
    pub booking_id: Uuid,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusChangeResponse {
    pub trip: Trip,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cancelled_bookings: Vec<CascadeOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub seat_count: u32,
    #[serde(default)]
    pub pickup: Option<String>,
    #[serde(default)]
    pub dropoff: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<Uuid>,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips", get(list_trips))
        .route("/v1/trips/search", get(search_trips))
        .route("/v1/trips/{id}", get(get_trip))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips", post(create_trip))
        .route("/v1/trips/{id}/status", post(change_status))
        .route("/v1/trips/{id}/book", post(book_trip))
        .route("/v1/trips/{id}/events", get(trip_events))
}

async fn list_trips(State(state): State<AppState>) -> Result<Json<Vec<Trip>>, AppError> {
    Ok(Json(state.engine.catalog.list_trips().await?))
}

async fn search_trips(
    State(state): State<AppState>,
    Query(query): Query<TripQuery>,
) -> Result<Json<Vec<Trip>>, AppError> {
    Ok(Json(state.engine.catalog.search_trips(&query).await?))
}

async fn get_trip(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.engine.catalog.get_trip(id).await?))
}

async fn create_trip(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(details): Json<NewTrip>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let trip = state.engine.catalog.post_trip(&user.id, details).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

/// Cancelling a trip cascades to its confirmed bookings.
async fn change_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChangeRequest>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    let trip = state.engine.catalog.change_status(id, &user.id, req.status).await?;

    let mut cancelled_bookings = Vec::new();
    if trip.status == TripStatus::Cancelled {
        let outcomes = state.engine.cancellations.cancel_trip_bookings(trip.id).await?;
        for (booking_id, result) in outcomes {
            state.metrics.record_cancellation(&result);
            cancelled_bookings.push(match result {
                Ok(_) => CascadeOutcome {
                    booking_id,
                    cancelled: true,
                    error: None,
                },
                Err(e) => CascadeOutcome {
                    booking_id,
                    cancelled: false,
                    error: Some(e.to_string()),
                },
            });
        }
    }

    Ok(Json(StatusChangeResponse { trip, cancelled_bookings }))
}

async fn book_trip(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<BookRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let result = state
        .engine
        .reservations
        .reserve(ReserveRequest {
            trip_id: id,
            rider_id: user.id,
            seat_count: req.seat_count,
            pickup: req.pickup,
            dropoff: req.dropoff,
            payment_method_id: req.payment_method_id,
        })
        .await;
    state.metrics.record_reservation(&result);

    Ok((StatusCode::CREATED, Json(result?)))
}

/// Live lifecycle events for one trip.
async fn trip_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state.engine.catalog.get_trip(id).await?;

    let stream = BroadcastStream::new(state.live.subscribe()).filter_map(move |result| async move {
        match result {
            Ok(event) if event.trip_id() == id => Event::default()
                .event(event.topic())
                .json_data(&event)
                .ok()
                .map(Ok),
            Ok(_) => None,
            Err(lagged) => {
                tracing::warn!("SSE subscriber for trip {} fell behind: {}", id, lagged);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
