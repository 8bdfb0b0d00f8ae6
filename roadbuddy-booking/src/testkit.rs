use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use roadbuddy_core::events::RecordingEventSink;
use roadbuddy_core::repository::{
    BookingRepository, PaymentMethodRepository, StoreResult, TransactionRepository, TripRepository,
};
use roadbuddy_core::trip::NewTrip;
use roadbuddy_core::{Booking, PaymentMethod, PaymentMethodType, PaymentTransaction, SeatHold, Trip, TripStatus};
use roadbuddy_shared::Masked;
use roadbuddy_store::memory::{
    InMemoryBookingRepository, InMemoryObligationRepository, InMemoryPaymentMethodRepository,
    InMemoryTransactionRepository, InMemoryTripRepository,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::authorizer::AuthorizerConfig;
use crate::engine::{Engine, EngineConfig, Stores};
use crate::gateway::SimulatedGateway;
use crate::reservation::ReserveRequest;
use crate::retry::RetryPolicy;

pub fn card(user: &str, token: &str) -> PaymentMethod {
    PaymentMethod {
        id: Uuid::new_v4(),
        user_id: user.to_string(),
        method_type: PaymentMethodType::Card,
        masked_identifier: "•••• 4242".to_string(),
        expiry: None,
        is_default: true,
        token: Masked(token.to_string()),
        created_at: Utc::now(),
    }
}

pub fn expired_card(user: &str) -> PaymentMethod {
    PaymentMethod {
        expiry: NaiveDate::from_ymd_opt(2020, 1, 31),
        ..card(user, "tok_visa")
    }
}

/// Consume one scheduled failure, if any.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Trip store whose seat releases can be made to fail.
#[derive(Default)]
pub struct FlakyTrips {
    pub inner: InMemoryTripRepository,
    pub failing_releases: AtomicUsize,
}

#[async_trait]
impl TripRepository for FlakyTrips {
    async fn create_trip(&self, trip: &Trip) -> StoreResult<()> {
        self.inner.create_trip(trip).await
    }

    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>> {
        self.inner.get_trip(id).await
    }

    async fn list_trips(&self) -> StoreResult<Vec<Trip>> {
        self.inner.list_trips().await
    }

    async fn update_trip_status(&self, id: Uuid, status: TripStatus) -> StoreResult<()> {
        self.inner.update_trip_status(id, status).await
    }

    async fn apply_hold(&self, trip_id: Uuid, available_seats: u32, hold: &SeatHold) -> StoreResult<()> {
        self.inner.apply_hold(trip_id, available_seats, hold).await
    }

    async fn apply_release(
        &self,
        trip_id: Uuid,
        available_seats: u32,
        booking_id: Uuid,
        released_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if take_failure(&self.failing_releases) {
            return Err("trip store offline".into());
        }
        self.inner
            .apply_release(trip_id, available_seats, booking_id, released_at)
            .await
    }

    async fn get_hold(&self, booking_id: Uuid) -> StoreResult<Option<SeatHold>> {
        self.inner.get_hold(booking_id).await
    }
}

/// Booking store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyBookings {
    pub inner: InMemoryBookingRepository,
    pub failing_creates: AtomicUsize,
    pub failing_updates: AtomicUsize,
}

#[async_trait]
impl BookingRepository for FlakyBookings {
    async fn create_booking(&self, booking: &Booking) -> StoreResult<()> {
        if take_failure(&self.failing_creates) {
            return Err("booking store offline".into());
        }
        self.inner.create_booking(booking).await
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.inner.get_booking(id).await
    }

    async fn update_booking(&self, booking: &Booking) -> StoreResult<()> {
        if take_failure(&self.failing_updates) {
            return Err("booking store offline".into());
        }
        self.inner.update_booking(booking).await
    }

    async fn list_bookings_for_rider(&self, rider_id: &str) -> StoreResult<Vec<Booking>> {
        self.inner.list_bookings_for_rider(rider_id).await
    }

    async fn list_bookings_for_trip(&self, trip_id: Uuid) -> StoreResult<Vec<Booking>> {
        self.inner.list_bookings_for_trip(trip_id).await
    }
}

/// Transaction store whose updates can be made to fail.
#[derive(Default)]
pub struct FlakyTransactions {
    pub inner: InMemoryTransactionRepository,
    pub failing_updates: AtomicUsize,
}

impl FlakyTransactions {
    pub async fn all(&self) -> Vec<PaymentTransaction> {
        self.inner.all().await
    }
}

#[async_trait]
impl TransactionRepository for FlakyTransactions {
    async fn create_transaction(&self, tx: &PaymentTransaction) -> StoreResult<()> {
        self.inner.create_transaction(tx).await
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<PaymentTransaction>> {
        self.inner.get_transaction(id).await
    }

    async fn update_transaction(&self, tx: &PaymentTransaction) -> StoreResult<()> {
        if take_failure(&self.failing_updates) {
            return Err("transaction store offline".into());
        }
        self.inner.update_transaction(tx).await
    }
}

/// A fully wired engine on in-memory stores.
pub struct Harness {
    pub engine: Engine,
    pub gateway: Arc<SimulatedGateway>,
    pub trips: Arc<FlakyTrips>,
    pub bookings: Arc<FlakyBookings>,
    pub transactions: Arc<FlakyTransactions>,
    pub methods: Arc<InMemoryPaymentMethodRepository>,
    pub obligations: Arc<InMemoryObligationRepository>,
    pub events: Arc<RecordingEventSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(SimulatedGateway::new())
    }

    pub fn with_gateway(gateway: SimulatedGateway) -> Self {
        Self::build(gateway, AuthorizerConfig::default())
    }

    pub fn with_authorizer(config: AuthorizerConfig) -> Self {
        Self::build(SimulatedGateway::new(), config)
    }

    fn build(gateway: SimulatedGateway, authorizer: AuthorizerConfig) -> Self {
        let gateway = Arc::new(gateway);
        let trips = Arc::new(FlakyTrips::default());
        let bookings = Arc::new(FlakyBookings::default());
        let transactions = Arc::new(FlakyTransactions::default());
        let methods = Arc::new(InMemoryPaymentMethodRepository::new());
        let obligations = Arc::new(InMemoryObligationRepository::new());
        let events = Arc::new(RecordingEventSink::new());

        let stores = Stores {
            trips: trips.clone(),
            bookings: bookings.clone(),
            transactions: transactions.clone(),
            methods: methods.clone(),
            obligations: obligations.clone(),
        };
        let config = EngineConfig {
            retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
            authorizer,
            ..EngineConfig::default()
        };
        let engine = Engine::new(stores, gateway.clone(), events.clone(), config);

        Self {
            engine,
            gateway,
            trips,
            bookings,
            transactions,
            methods,
            obligations,
            events,
        }
    }

    pub async fn trip(&self, seats: u32, price: Decimal) -> Trip {
        self.engine
            .catalog
            .post_trip(
                "driver-1",
                NewTrip {
                    driver_name: "Sarah M.".into(),
                    departure_city: "New York".into(),
                    destination_city: "Boston".into(),
                    departure_time: Utc::now(),
                    price_per_seat: price,
                    seats,
                    estimated_duration: Some("4h 15m".into()),
                    car_model: None,
                    amenities: vec![],
                    pickup_points: vec![],
                    description: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn rider(&self, rider: &str, token: &str) -> PaymentMethod {
        let method = card(rider, token);
        self.methods.replace_methods(rider, &[method.clone()]).await.unwrap();
        method
    }

    pub async fn available(&self, trip_id: Uuid) -> u32 {
        self.trips.get_trip(trip_id).await.unwrap().unwrap().available_seats
    }

    pub fn request(&self, trip_id: Uuid, rider: &str, seats: u32) -> ReserveRequest {
        ReserveRequest {
            trip_id,
            rider_id: rider.to_string(),
            seat_count: seats,
            pickup: None,
            dropoff: None,
            payment_method_id: None,
        }
    }
}
