use chrono::Utc;
use roadbuddy_core::repository::TripRepository;
use roadbuddy_core::{KeyedLocks, SeatHold, TripStatus};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};
use uuid::Uuid;

/// Seat inventory per trip.
///
/// Every check-and-mutate runs under the trip's lock, so seat changes on one
/// trip are linearizable while different trips proceed independently.
pub struct InventoryManager {
    trips: Arc<dyn TripRepository>,
    locks: KeyedLocks<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { seats: u32 },
    AlreadyReleased,
}

impl InventoryManager {
    pub fn new(trips: Arc<dyn TripRepository>) -> Self {
        Self {
            trips,
            locks: KeyedLocks::new(),
        }
    }

    /// Exclusive access to a trip's inventory, for callers that change
    /// trip state that reservations depend on.
    pub async fn lock_trip(&self, trip_id: Uuid) -> OwnedMutexGuard<()> {
        self.locks.lock(&trip_id).await
    }

    /// Hold `count` seats on the trip for `booking_id`.
    ///
    /// Reserving again for a booking that already holds seats returns the
    /// existing hold.
    pub async fn reserve_seats(&self, trip_id: Uuid, count: u32, booking_id: Uuid) -> Result<SeatHold, InventoryError> {
        if count == 0 {
            return Err(InventoryError::InvalidCount);
        }

        let _guard = self.locks.lock(&trip_id).await;

        if let Some(existing) = self.trips.get_hold(booking_id).await.map_err(store_err)? {
            if existing.trip_id == trip_id && !existing.is_released() {
                debug!("Booking {} already holds {} seats on trip {}", booking_id, existing.seat_count, trip_id);
                return Ok(existing);
            }
            return Err(InventoryError::HoldMismatch { booking_id, trip_id });
        }

        let trip = self
            .trips
            .get_trip(trip_id)
            .await
            .map_err(store_err)?
            .ok_or(InventoryError::TripNotFound(trip_id))?;

        if trip.status != TripStatus::Active {
            return Err(InventoryError::TripNotActive {
                trip_id,
                status: trip.status,
            });
        }

        if trip.available_seats < count {
            return Err(InventoryError::InsufficientSeats {
                requested: count,
                available: trip.available_seats,
            });
        }

        let hold = SeatHold::new(booking_id, trip_id, count);
        let remaining = trip.available_seats - count;
        self.trips
            .apply_hold(trip_id, remaining, &hold)
            .await
            .map_err(store_err)?;

        info!("Reserved {} seats on trip {} for booking {} ({} left)", count, trip_id, booking_id, remaining);
        Ok(hold)
    }

    /// Return the seats held for `booking_id`, capped at the trip's capacity.
    ///
    /// Idempotent per booking: a hold is credited back at most once.
    pub async fn release_seats(&self, trip_id: Uuid, booking_id: Uuid) -> Result<ReleaseOutcome, InventoryError> {
        let _guard = self.locks.lock(&trip_id).await;

        let hold = self
            .trips
            .get_hold(booking_id)
            .await
            .map_err(store_err)?
            .ok_or(InventoryError::HoldNotFound(booking_id))?;

        if hold.trip_id != trip_id {
            return Err(InventoryError::HoldMismatch { booking_id, trip_id });
        }

        if hold.is_released() {
            debug!("Seats for booking {} already released", booking_id);
            return Ok(ReleaseOutcome::AlreadyReleased);
        }

        let trip = self
            .trips
            .get_trip(trip_id)
            .await
            .map_err(store_err)?
            .ok_or(InventoryError::TripNotFound(trip_id))?;

        let available = trip
            .available_seats
            .saturating_add(hold.seat_count)
            .min(trip.total_seats);
        self.trips
            .apply_release(trip_id, available, booking_id, Utc::now())
            .await
            .map_err(store_err)?;

        info!("Released {} seats on trip {} for booking {} ({} available)", hold.seat_count, trip_id, booking_id, available);
        Ok(ReleaseOutcome::Released {
            seats: hold.seat_count,
        })
    }
}

fn store_err(e: roadbuddy_core::repository::StoreError) -> InventoryError {
    InventoryError::Store(e.to_string())
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum InventoryError {
    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error("Trip {trip_id} is not accepting reservations (status: {status})")]
    TripNotActive { trip_id: Uuid, status: TripStatus },

    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: u32, available: u32 },

    #[error("Seat count must be at least 1")]
    InvalidCount,

    #[error("No seat hold recorded for booking {0}")]
    HoldNotFound(Uuid),

    #[error("Seat hold for booking {booking_id} does not belong to trip {trip_id}")]
    HoldMismatch { booking_id: Uuid, trip_id: Uuid },

    #[error("Inventory store failure: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadbuddy_core::trip::NewTrip;
    use roadbuddy_core::Trip;
    use roadbuddy_store::memory::InMemoryTripRepository;
    use rust_decimal_macros::dec;

    async fn setup(seats: u32) -> (Arc<InMemoryTripRepository>, InventoryManager, Uuid) {
        let repo = Arc::new(InMemoryTripRepository::new());
        let trip = Trip::new(
            "driver-1".into(),
            NewTrip {
                driver_name: "Mike R.".into(),
                departure_city: "New York".into(),
                destination_city: "Philadelphia".into(),
                departure_time: Utc::now(),
                price_per_seat: dec!(35),
                seats,
                estimated_duration: None,
                car_model: None,
                amenities: vec![],
                pickup_points: vec![],
                description: None,
            },
        );
        repo.create_trip(&trip).await.unwrap();
        let manager = InventoryManager::new(repo.clone());
        (repo, manager, trip.id)
    }

    async fn available(repo: &InMemoryTripRepository, trip_id: Uuid) -> u32 {
        repo.get_trip(trip_id).await.unwrap().unwrap().available_seats
    }

    #[tokio::test]
    async fn test_inventory_lifecycle() {
        let (repo, manager, trip_id) = setup(4).await;
        let booking = Uuid::new_v4();

        let hold = manager.reserve_seats(trip_id, 3, booking).await.unwrap();
        assert_eq!(hold.seat_count, 3);
        assert_eq!(available(&repo, trip_id).await, 1);

        let outcome = manager.release_seats(trip_id, booking).await.unwrap();
        assert_eq!(outcome, ReleaseOutcome::Released { seats: 3 });
        assert_eq!(available(&repo, trip_id).await, 4);
    }

    #[tokio::test]
    async fn test_release_is_idempotent_per_booking() {
        let (repo, manager, trip_id) = setup(2).await;
        let booking = Uuid::new_v4();

        manager.reserve_seats(trip_id, 1, booking).await.unwrap();
        manager.release_seats(trip_id, booking).await.unwrap();
        let second = manager.release_seats(trip_id, booking).await.unwrap();

        assert_eq!(second, ReleaseOutcome::AlreadyReleased);
        assert_eq!(available(&repo, trip_id).await, 2);
    }

    #[tokio::test]
    async fn test_rejects_when_seats_run_out() {
        let (_repo, manager, trip_id) = setup(2).await;

        manager.reserve_seats(trip_id, 2, Uuid::new_v4()).await.unwrap();
        let err = manager.reserve_seats(trip_id, 1, Uuid::new_v4()).await.unwrap_err();

        assert_eq!(err, InventoryError::InsufficientSeats { requested: 1, available: 0 });
    }

    #[tokio::test]
    async fn test_rejects_inactive_and_unknown_trips() {
        let (repo, manager, trip_id) = setup(2).await;

        let missing = Uuid::new_v4();
        assert_eq!(
            manager.reserve_seats(missing, 1, Uuid::new_v4()).await.unwrap_err(),
            InventoryError::TripNotFound(missing)
        );

        repo.update_trip_status(trip_id, TripStatus::Cancelled).await.unwrap();
        assert!(matches!(
            manager.reserve_seats(trip_id, 1, Uuid::new_v4()).await,
            Err(InventoryError::TripNotActive { status: TripStatus::Cancelled, .. })
        ));
    }

    #[tokio::test]
    async fn test_release_unknown_hold_fails() {
        let (_repo, manager, trip_id) = setup(2).await;
        let booking = Uuid::new_v4();

        assert_eq!(
            manager.release_seats(trip_id, booking).await.unwrap_err(),
            InventoryError::HoldNotFound(booking)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_reservations_never_overbook() {
        let (repo, manager, trip_id) = setup(3).await;
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.reserve_seats(trip_id, 1, Uuid::new_v4()).await
            }));
        }

        let mut granted = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => granted += 1,
                Err(InventoryError::InsufficientSeats { .. }) => refused += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(granted, 3);
        assert_eq!(refused, 17);
        assert_eq!(available(&repo, trip_id).await, 0);
    }
}
