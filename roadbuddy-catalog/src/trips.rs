use chrono::Utc;
use roadbuddy_core::repository::TripRepository;
use roadbuddy_core::trip::{NewTrip, TripQuery};
use roadbuddy_core::{EventSink, Trip, TripStatus};
use roadbuddy_shared::LifecycleEvent;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::inventory::InventoryManager;

/// Driver-facing trip operations: posting, browsing, and status changes.
pub struct TripCatalog {
    trips: Arc<dyn TripRepository>,
    inventory: Arc<InventoryManager>,
    events: Arc<dyn EventSink>,
}

impl TripCatalog {
    pub fn new(trips: Arc<dyn TripRepository>, inventory: Arc<InventoryManager>, events: Arc<dyn EventSink>) -> Self {
        Self { trips, inventory, events }
    }

    pub async fn post_trip(&self, driver_id: &str, mut details: NewTrip) -> Result<Trip, CatalogError> {
        if details.seats < 1 {
            return Err(CatalogError::InvalidTrip("a trip needs at least one seat".to_string()));
        }
        if details.price_per_seat.is_sign_negative() && !details.price_per_seat.is_zero() {
            return Err(CatalogError::InvalidTrip("price per seat must not be negative".to_string()));
        }
        if details.departure_city.trim().is_empty() || details.destination_city.trim().is_empty() {
            return Err(CatalogError::InvalidTrip("departure and destination are required".to_string()));
        }
        if details.driver_name.trim().is_empty() {
            details.driver_name = "Anonymous".to_string();
        }

        let trip = Trip::new(driver_id.to_string(), details);
        self.trips.create_trip(&trip).await.map_err(store_err)?;

        info!("Trip {} posted by {}: {} with {} seats", trip.id, driver_id, trip.route(), trip.total_seats);
        Ok(trip)
    }

    pub async fn get_trip(&self, trip_id: Uuid) -> Result<Trip, CatalogError> {
        self.trips
            .get_trip(trip_id)
            .await
            .map_err(store_err)?
            .ok_or(CatalogError::NotFound(trip_id))
    }

    pub async fn list_trips(&self) -> Result<Vec<Trip>, CatalogError> {
        self.trips.list_trips().await.map_err(store_err)
    }

    pub async fn search_trips(&self, query: &TripQuery) -> Result<Vec<Trip>, CatalogError> {
        let trips = self.trips.list_trips().await.map_err(store_err)?;
        Ok(trips.into_iter().filter(|t| query.matches(t)).collect())
    }

    /// Owner-only status change. Serialized with seat reservations on the
    /// same trip, so no reservation observes a half-applied change.
    pub async fn change_status(&self, trip_id: Uuid, actor_id: &str, next: TripStatus) -> Result<Trip, CatalogError> {
        let _guard = self.inventory.lock_trip(trip_id).await;

        let mut trip = self.get_trip(trip_id).await?;
        if trip.driver_id != actor_id {
            return Err(CatalogError::NotOwner(trip_id));
        }
        if !trip.status.can_transition_to(next) {
            return Err(CatalogError::InvalidTransition {
                from: trip.status,
                to: next,
            });
        }

        self.trips
            .update_trip_status(trip_id, next)
            .await
            .map_err(store_err)?;

        let previous = trip.status;
        trip.status = next;
        trip.updated_at = Utc::now();

        info!("Trip {} status {} -> {}", trip_id, previous, next);
        self.events.emit(LifecycleEvent::StatusChanged {
            trip_id,
            from: previous.to_string(),
            to: next.to_string(),
            at: trip.updated_at,
        });

        Ok(trip)
    }
}

fn store_err(e: roadbuddy_core::repository::StoreError) -> CatalogError {
    CatalogError::Store(e.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid trip: {0}")]
    InvalidTrip(String),

    #[error("Trip not found: {0}")]
    NotFound(Uuid),

    #[error("Only the driver may change trip {0}")]
    NotOwner(Uuid),

    #[error("Invalid trip transition from {from} to {to}")]
    InvalidTransition { from: TripStatus, to: TripStatus },

    #[error("Catalog store failure: {0}")]
    Store(String),
}
