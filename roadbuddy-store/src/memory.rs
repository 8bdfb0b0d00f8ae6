use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roadbuddy_core::repository::{
    BookingRepository, ObligationRepository, PaymentMethodRepository, StoreResult, TransactionRepository,
    TripRepository,
};
use roadbuddy_core::{Booking, Obligation, PaymentMethod, PaymentTransaction, SeatHold, Trip, TripStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory trip store. Seat counts and holds share one lock so
/// `apply_hold`/`apply_release` are atomic.
#[derive(Default)]
pub struct InMemoryTripRepository {
    inner: RwLock<TripTables>,
}

#[derive(Default)]
struct TripTables {
    trips: HashMap<Uuid, Trip>,
    holds: HashMap<Uuid, SeatHold>,
}

impl InMemoryTripRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TripRepository for InMemoryTripRepository {
    async fn create_trip(&self, trip: &Trip) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        if tables.trips.contains_key(&trip.id) {
            return Err(format!("Trip {} already exists", trip.id).into());
        }
        tables.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>> {
        Ok(self.inner.read().await.trips.get(&id).cloned())
    }

    async fn list_trips(&self) -> StoreResult<Vec<Trip>> {
        let mut trips: Vec<Trip> = self.inner.read().await.trips.values().cloned().collect();
        trips.sort_by_key(|t| t.departure_time);
        Ok(trips)
    }

    async fn update_trip_status(&self, id: Uuid, status: TripStatus) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        let trip = tables
            .trips
            .get_mut(&id)
            .ok_or_else(|| format!("Trip not found: {}", id))?;
        trip.status = status;
        trip.updated_at = Utc::now();
        Ok(())
    }

    async fn apply_hold(&self, trip_id: Uuid, available_seats: u32, hold: &SeatHold) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        if tables.holds.contains_key(&hold.booking_id) {
            return Err(format!("Hold for booking {} already exists", hold.booking_id).into());
        }
        let trip = tables
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| format!("Trip not found: {}", trip_id))?;
        trip.available_seats = available_seats;
        trip.updated_at = Utc::now();
        tables.holds.insert(hold.booking_id, hold.clone());
        Ok(())
    }

    async fn apply_release(
        &self,
        trip_id: Uuid,
        available_seats: u32,
        booking_id: Uuid,
        released_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        if !tables.trips.contains_key(&trip_id) {
            return Err(format!("Trip not found: {}", trip_id).into());
        }
        let hold = tables
            .holds
            .get_mut(&booking_id)
            .ok_or_else(|| format!("Hold not found for booking {}", booking_id))?;
        hold.released_at = Some(released_at);
        let trip = tables
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| format!("Trip not found: {}", trip_id))?;
        trip.available_seats = available_seats;
        trip.updated_at = Utc::now();
        Ok(())
    }

    async fn get_hold(&self, booking_id: Uuid) -> StoreResult<Option<SeatHold>> {
        Ok(self.inner.read().await.holds.get(&booking_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn create_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(format!("Booking {} already exists", booking.id).into());
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn update_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&booking.id) {
            Some(existing) => {
                *existing = booking.clone();
                Ok(())
            }
            None => Err(format!("Booking not found: {}", booking.id).into()),
        }
    }

    async fn list_bookings_for_rider(&self, rider_id: &str) -> StoreResult<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.rider_id == rider_id)
            .cloned()
            .collect();
        found.sort_by_key(|b| b.created_at);
        Ok(found)
    }

    async fn list_bookings_for_trip(&self, trip_id: Uuid) -> StoreResult<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.trip_id == trip_id)
            .cloned()
            .collect();
        found.sort_by_key(|b| b.created_at);
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<HashMap<Uuid, PaymentTransaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded attempt, including failed ones.
    pub async fn all(&self) -> Vec<PaymentTransaction> {
        self.transactions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn create_transaction(&self, tx: &PaymentTransaction) -> StoreResult<()> {
        self.transactions.write().await.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<PaymentTransaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn update_transaction(&self, tx: &PaymentTransaction) -> StoreResult<()> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&tx.id) {
            Some(existing) => {
                *existing = tx.clone();
                Ok(())
            }
            None => Err(format!("Transaction not found: {}", tx.id).into()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPaymentMethodRepository {
    methods: RwLock<HashMap<String, Vec<PaymentMethod>>>,
}

impl InMemoryPaymentMethodRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentMethodRepository for InMemoryPaymentMethodRepository {
    async fn get_method(&self, id: Uuid) -> StoreResult<Option<PaymentMethod>> {
        Ok(self
            .methods
            .read()
            .await
            .values()
            .flatten()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn list_methods(&self, user_id: &str) -> StoreResult<Vec<PaymentMethod>> {
        Ok(self.methods.read().await.get(user_id).cloned().unwrap_or_default())
    }

    async fn replace_methods(&self, user_id: &str, methods: &[PaymentMethod]) -> StoreResult<()> {
        self.methods
            .write()
            .await
            .insert(user_id.to_string(), methods.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryObligationRepository {
    obligations: RwLock<HashMap<Uuid, Obligation>>,
}

impl InMemoryObligationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Obligation> {
        self.obligations.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ObligationRepository for InMemoryObligationRepository {
    async fn record_obligation(&self, obligation: &Obligation) -> StoreResult<()> {
        self.obligations
            .write()
            .await
            .insert(obligation.id, obligation.clone());
        Ok(())
    }

    async fn list_open_obligations(&self) -> StoreResult<Vec<Obligation>> {
        let mut open: Vec<Obligation> = self
            .obligations
            .read()
            .await
            .values()
            .filter(|o| o.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|o| o.created_at);
        Ok(open)
    }

    async fn update_obligation(&self, obligation: &Obligation) -> StoreResult<()> {
        self.obligations
            .write()
            .await
            .insert(obligation.id, obligation.clone());
        Ok(())
    }
}
