use roadbuddy_catalog::{FareError, InventoryError};
use roadbuddy_core::TripStatus;
use uuid::Uuid;

use crate::authorizer::PaymentError;
use crate::wallet::WalletError;

/// Failures of `reserve`. Every variant leaves inventory and payment as
/// they were before the call.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error("Trip {trip_id} is not active (status: {status})")]
    TripNotActive { trip_id: Uuid, status: TripStatus },

    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: u32, available: u32 },

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment method invalid: {0}")]
    PaymentMethodInvalid(String),

    #[error("Payment provider unavailable: {0}")]
    PaymentUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FareError> for ReservationError {
    fn from(err: FareError) -> Self {
        ReservationError::InvalidRequest(err.to_string())
    }
}

impl From<InventoryError> for ReservationError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::TripNotFound(id) => ReservationError::TripNotFound(id),
            InventoryError::TripNotActive { trip_id, status } => ReservationError::TripNotActive { trip_id, status },
            InventoryError::InsufficientSeats { requested, available } => {
                ReservationError::InsufficientSeats { requested, available }
            }
            InventoryError::InvalidCount => ReservationError::InvalidRequest(err.to_string()),
            other => ReservationError::Internal(other.to_string()),
        }
    }
}

impl From<PaymentError> for ReservationError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Declined(reason) => ReservationError::PaymentDeclined(reason),
            PaymentError::MethodInvalid(reason) => ReservationError::PaymentMethodInvalid(reason),
            PaymentError::Unavailable(reason) => ReservationError::PaymentUnavailable(reason),
            other => ReservationError::Internal(other.to_string()),
        }
    }
}

impl From<WalletError> for ReservationError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Store(reason) => ReservationError::Internal(reason),
            other => ReservationError::PaymentMethodInvalid(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CancellationError {
    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Booking already cancelled: {0}")]
    AlreadyCancelled(Uuid),

    /// Seats were returned but the refund is still owed; it has been queued.
    #[error("Refund failed for booking {booking_id}: {reason}")]
    RefundFailed { booking_id: Uuid, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}
