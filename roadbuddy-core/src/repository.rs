use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::Booking;
use crate::obligation::Obligation;
use crate::payment::{PaymentMethod, PaymentTransaction};
use crate::trip::{SeatHold, Trip, TripStatus};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Repository trait for trip data access
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn create_trip(&self, trip: &Trip) -> StoreResult<()>;

    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>>;

    async fn list_trips(&self) -> StoreResult<Vec<Trip>>;

    async fn update_trip_status(&self, id: Uuid, status: TripStatus) -> StoreResult<()>;

    /// Write the new seat count and record the hold as one atomic change.
    async fn apply_hold(&self, trip_id: Uuid, available_seats: u32, hold: &SeatHold) -> StoreResult<()>;

    /// Write the new seat count and mark the hold released as one atomic change.
    async fn apply_release(
        &self,
        trip_id: Uuid,
        available_seats: u32,
        booking_id: Uuid,
        released_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn get_hold(&self, booking_id: Uuid) -> StoreResult<Option<SeatHold>>;
}

/// Repository trait for booking data access
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create_booking(&self, booking: &Booking) -> StoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn update_booking(&self, booking: &Booking) -> StoreResult<()>;

    async fn list_bookings_for_rider(&self, rider_id: &str) -> StoreResult<Vec<Booking>>;

    async fn list_bookings_for_trip(&self, trip_id: Uuid) -> StoreResult<Vec<Booking>>;
}

/// Repository trait for payment transaction records
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create_transaction(&self, tx: &PaymentTransaction) -> StoreResult<()>;

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<PaymentTransaction>>;

    async fn update_transaction(&self, tx: &PaymentTransaction) -> StoreResult<()>;
}

/// Repository trait for stored payment instruments
#[async_trait]
pub trait PaymentMethodRepository: Send + Sync {
    async fn get_method(&self, id: Uuid) -> StoreResult<Option<PaymentMethod>>;

    async fn list_methods(&self, user_id: &str) -> StoreResult<Vec<PaymentMethod>>;

    /// Replace the user's whole set in one write.
    async fn replace_methods(&self, user_id: &str, methods: &[PaymentMethod]) -> StoreResult<()>;
}

/// Repository trait for unresolved compensation and refund work
#[async_trait]
pub trait ObligationRepository: Send + Sync {
    async fn record_obligation(&self, obligation: &Obligation) -> StoreResult<()>;

    async fn list_open_obligations(&self) -> StoreResult<Vec<Obligation>>;

    async fn update_obligation(&self, obligation: &Obligation) -> StoreResult<()>;
}
