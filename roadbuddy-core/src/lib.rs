pub mod booking;
pub mod events;
pub mod identity;
pub mod locks;
pub mod obligation;
pub mod payment;
pub mod repository;
pub mod trip;

pub use booking::{Booking, BookingStatus};
pub use events::EventSink;
pub use locks::KeyedLocks;
pub use obligation::{Obligation, ObligationKind};
pub use payment::{PaymentMethod, PaymentMethodType, PaymentTransaction, TransactionStatus};
pub use trip::{SeatHold, Trip, TripStatus};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    #[error("Unknown {entity} status: {value}")]
    UnknownStatus { entity: &'static str, value: String },
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
