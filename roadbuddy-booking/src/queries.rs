use roadbuddy_core::repository::{BookingRepository, TripRepository};
use roadbuddy_core::{Booking, Trip};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A booking together with the trip it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub trip: Option<Trip>,
}

/// Read side for bookings.
pub struct BookingQueries {
    bookings: Arc<dyn BookingRepository>,
    trips: Arc<dyn TripRepository>,
}

impl BookingQueries {
    pub fn new(bookings: Arc<dyn BookingRepository>, trips: Arc<dyn TripRepository>) -> Self {
        Self { bookings, trips }
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<BookingView, QueryError> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await
            .map_err(store_err)?
            .ok_or(QueryError::NotFound(booking_id))?;
        let trip = self.trips.get_trip(booking.trip_id).await.map_err(store_err)?;
        Ok(BookingView { booking, trip })
    }

    /// All of a rider's bookings, newest first.
    pub async fn bookings_for_rider(&self, rider_id: &str) -> Result<Vec<BookingView>, QueryError> {
        let bookings = self.bookings.list_bookings_for_rider(rider_id).await.map_err(store_err)?;

        let mut trips: HashMap<Uuid, Option<Trip>> = HashMap::new();
        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings.into_iter().rev() {
            if !trips.contains_key(&booking.trip_id) {
                let trip = self.trips.get_trip(booking.trip_id).await.map_err(store_err)?;
                trips.insert(booking.trip_id, trip);
            }
            let trip = trips.get(&booking.trip_id).cloned().flatten();
            views.push(BookingView { booking, trip });
        }
        Ok(views)
    }

    pub async fn bookings_for_trip(&self, trip_id: Uuid) -> Result<Vec<Booking>, QueryError> {
        self.bookings.list_bookings_for_trip(trip_id).await.map_err(store_err)
    }
}

fn store_err(e: roadbuddy_core::repository::StoreError) -> QueryError {
    QueryError::Store(e.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Store failure: {0}")]
    Store(String),
}
