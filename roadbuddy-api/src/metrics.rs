use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use roadbuddy_booking::{CancellationError, ReservationError};

use crate::error::AppError;
use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    reservations: IntCounterVec,
    cancellations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let reservations = IntCounterVec::new(
            Opts::new("roadbuddy_reservations_total", "Reservation attempts by outcome"),
            &["outcome"],
        )?;
        let cancellations = IntCounterVec::new(
            Opts::new("roadbuddy_cancellations_total", "Cancellation attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(reservations.clone()))?;
        registry.register(Box::new(cancellations.clone()))?;

        Ok(Self {
            registry,
            reservations,
            cancellations,
        })
    }

    pub fn record_reservation<T>(&self, result: &Result<T, ReservationError>) {
        let outcome = match result {
            Ok(_) => "confirmed",
            Err(ReservationError::InvalidRequest(_)) => "invalid_request",
            Err(ReservationError::TripNotFound(_)) => "trip_not_found",
            Err(ReservationError::TripNotActive { .. }) => "trip_not_active",
            Err(ReservationError::InsufficientSeats { .. }) => "insufficient_seats",
            Err(ReservationError::PaymentDeclined(_)) => "payment_declined",
            Err(ReservationError::PaymentMethodInvalid(_)) => "payment_method_invalid",
            Err(ReservationError::PaymentUnavailable(_)) => "payment_unavailable",
            Err(ReservationError::Internal(_)) => "internal",
        };
        self.reservations.with_label_values(&[outcome]).inc();
    }

    pub fn record_cancellation<T>(&self, result: &Result<T, CancellationError>) {
        let outcome = match result {
            Ok(_) => "cancelled",
            Err(CancellationError::BookingNotFound(_)) => "not_found",
            Err(CancellationError::AlreadyCancelled(_)) => "already_cancelled",
            Err(CancellationError::RefundFailed { .. }) => "refund_failed",
            Err(CancellationError::Internal(_)) => "internal",
        };
        self.cancellations.with_label_values(&[outcome]).inc();
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(export))
}

async fn export(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::InternalServerError(format!("Metrics encoding failed: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
