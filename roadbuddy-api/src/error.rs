use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roadbuddy_booking::{CancellationError, QueryError, ReservationError, WalletError};
use roadbuddy_catalog::CatalogError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    PaymentRequired(String),
    BadGateway(String),
    ServiceUnavailable(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        let msg = err.to_string();
        match err {
            ReservationError::InvalidRequest(_) => AppError::ValidationError(msg),
            ReservationError::TripNotFound(_) => AppError::NotFoundError(msg),
            ReservationError::TripNotActive { .. } | ReservationError::InsufficientSeats { .. } => {
                AppError::ConflictError(msg)
            }
            ReservationError::PaymentDeclined(_) | ReservationError::PaymentMethodInvalid(_) => {
                AppError::PaymentRequired(msg)
            }
            ReservationError::PaymentUnavailable(_) => AppError::ServiceUnavailable(msg),
            ReservationError::Internal(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<CancellationError> for AppError {
    fn from(err: CancellationError) -> Self {
        let msg = err.to_string();
        match err {
            CancellationError::BookingNotFound(_) => AppError::NotFoundError(msg),
            CancellationError::AlreadyCancelled(_) => AppError::ConflictError(msg),
            CancellationError::RefundFailed { .. } => AppError::BadGateway(msg),
            CancellationError::Internal(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        let msg = err.to_string();
        match err {
            CatalogError::InvalidTrip(_) => AppError::ValidationError(msg),
            CatalogError::NotFound(_) => AppError::NotFoundError(msg),
            CatalogError::NotOwner(_) => AppError::AuthorizationError(msg),
            CatalogError::InvalidTransition { .. } => AppError::ConflictError(msg),
            CatalogError::Store(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        let msg = err.to_string();
        match err {
            WalletError::NotFound(_) => AppError::NotFoundError(msg),
            WalletError::InvalidIdentifier | WalletError::MissingToken | WalletError::Expired(_) => {
                AppError::ValidationError(msg)
            }
            WalletError::Store(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let msg = err.to_string();
        match err {
            QueryError::NotFound(_) => AppError::NotFoundError(msg),
            QueryError::Store(_) => AppError::InternalServerError(msg),
        }
    }
}
