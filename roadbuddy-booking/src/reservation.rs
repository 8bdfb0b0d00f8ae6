use roadbuddy_catalog::{FareCalculator, InventoryError, InventoryManager};
use roadbuddy_core::payment::PaymentContext;
use roadbuddy_core::repository::{BookingRepository, TripRepository};
use roadbuddy_core::{Booking, EventSink, Obligation, ObligationKind, PaymentTransaction, TripStatus};
use roadbuddy_shared::LifecycleEvent;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::authorizer::{PaymentAuthorizer, PaymentError};
use crate::error::ReservationError;
use crate::obligations::ObligationLedger;
use crate::retry::{retry_with_backoff, retry_with_predicate, RetryPolicy};
use crate::wallet::Wallet;

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveRequest {
    pub trip_id: Uuid,
    pub rider_id: String,
    pub seat_count: u32,
    #[serde(default)]
    pub pickup: Option<String>,
    #[serde(default)]
    pub dropoff: Option<String>,
    /// Falls back to the rider's default method.
    #[serde(default)]
    pub payment_method_id: Option<Uuid>,
}

/// Where a reservation attempt is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Requested,
    SeatsReserved,
    PaymentAuthorized,
    Confirmed,
    Compensating,
    Failed,
}

impl Phase {
    fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Requested, SeatsReserved)
                | (Requested, Failed)
                | (SeatsReserved, PaymentAuthorized)
                | (SeatsReserved, Compensating)
                | (PaymentAuthorized, Confirmed)
                | (PaymentAuthorized, Compensating)
                | (Compensating, Failed)
        )
    }
}

struct Progress {
    booking_id: Uuid,
    phase: Phase,
}

impl Progress {
    fn advance(&mut self, next: Phase) {
        debug_assert!(self.phase.can_advance_to(next), "{:?} -> {:?}", self.phase, next);
        debug!("Reservation {}: {:?} -> {:?}", self.booking_id, self.phase, next);
        self.phase = next;
    }
}

/// Books seats on a trip and takes payment, all or nothing.
///
/// Seats are held before the charge. If the charge fails the seats go
/// back; if the booking cannot be recorded after the charge, the charge is
/// refunded and the seats go back.
pub struct ReservationCoordinator {
    fare: FareCalculator,
    inventory: Arc<InventoryManager>,
    authorizer: Arc<PaymentAuthorizer>,
    wallet: Arc<Wallet>,
    trips: Arc<dyn TripRepository>,
    bookings: Arc<dyn BookingRepository>,
    ledger: Arc<ObligationLedger>,
    events: Arc<dyn EventSink>,
    retry: RetryPolicy,
    currency: String,
}

impl ReservationCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fare: FareCalculator,
        inventory: Arc<InventoryManager>,
        authorizer: Arc<PaymentAuthorizer>,
        wallet: Arc<Wallet>,
        trips: Arc<dyn TripRepository>,
        bookings: Arc<dyn BookingRepository>,
        ledger: Arc<ObligationLedger>,
        events: Arc<dyn EventSink>,
        retry: RetryPolicy,
        currency: String,
    ) -> Self {
        Self {
            fare,
            inventory,
            authorizer,
            wallet,
            trips,
            bookings,
            ledger,
            events,
            retry,
            currency,
        }
    }

    /// Reserve and pay. Runs to completion even if the caller goes away.
    pub async fn reserve(self: &Arc<Self>, request: ReserveRequest) -> Result<Booking, ReservationError> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(request).await })
            .await
            .map_err(|e| ReservationError::Internal(format!("reservation task failed: {}", e)))?
    }

    async fn run(&self, request: ReserveRequest) -> Result<Booking, ReservationError> {
        if request.seat_count < 1 {
            return Err(ReservationError::InvalidRequest("seat_count must be at least 1".to_string()));
        }
        if request.rider_id.trim().is_empty() {
            return Err(ReservationError::InvalidRequest("rider is required".to_string()));
        }

        let trip = self
            .trips
            .get_trip(request.trip_id)
            .await
            .map_err(|e| ReservationError::Internal(e.to_string()))?
            .ok_or(ReservationError::TripNotFound(request.trip_id))?;
        let total = self.fare.compute_total(trip.price_per_seat, request.seat_count)?;

        let method_id = match request.payment_method_id {
            Some(id) => id,
            None => {
                self.wallet
                    .default_method(&request.rider_id)
                    .await?
                    .ok_or_else(|| ReservationError::PaymentMethodInvalid("no default payment method".to_string()))?
                    .id
            }
        };

        let mut progress = Progress {
            booking_id: Uuid::new_v4(),
            phase: Phase::Requested,
        };
        let booking_id = progress.booking_id;

        if let Err(e) = self
            .inventory
            .reserve_seats(trip.id, request.seat_count, booking_id)
            .await
        {
            progress.advance(Phase::Failed);
            return Err(e.into());
        }
        progress.advance(Phase::SeatsReserved);

        let ctx = PaymentContext {
            booking_id,
            trip_id: trip.id,
            rider_id: request.rider_id.clone(),
            currency: self.currency.clone(),
        };
        let tx = match self.authorizer.authorize(method_id, total, &ctx).await {
            Ok(tx) => tx,
            Err(e) => {
                progress.advance(Phase::Compensating);
                self.release_held_seats(trip.id, booking_id).await;
                progress.advance(Phase::Failed);
                return Err(e.into());
            }
        };
        progress.advance(Phase::PaymentAuthorized);

        let mut booking = Booking::new(booking_id, trip.id, request.rider_id.clone(), request.seat_count, total, self.currency.clone())
            .with_stops(request.pickup, request.dropoff);
        booking
            .confirm(tx.id)
            .map_err(|e| ReservationError::Internal(e.to_string()))?;

        // Status changes take the same lock, so a trip cancelled while the
        // charge was in flight is seen here or its cascade sees this booking.
        let trip_guard = self.inventory.lock_trip(trip.id).await;
        let current = match self.trips.get_trip(trip.id).await {
            Ok(Some(current)) => Ok(current.status),
            Ok(None) => Err(ReservationError::TripNotFound(trip.id)),
            Err(e) => Err(ReservationError::Internal(e.to_string())),
        };
        let still_open = match current {
            Ok(TripStatus::Active) | Ok(TripStatus::Full) => Ok(()),
            Ok(status) => Err(ReservationError::TripNotActive {
                trip_id: trip.id,
                status,
            }),
            Err(e) => Err(e),
        };
        if let Err(e) = still_open {
            drop(trip_guard);
            progress.advance(Phase::Compensating);
            warn!("Trip {} changed while booking {} was being paid, unwinding: {}", trip.id, booking_id, e);
            self.unwind_charge(&tx).await;
            self.release_held_seats(trip.id, booking_id).await;
            progress.advance(Phase::Failed);
            return Err(e);
        }

        let saved = retry_with_backoff("persist booking", &self.retry, || self.bookings.create_booking(&booking)).await;
        drop(trip_guard);
        if let Err(e) = saved {
            progress.advance(Phase::Compensating);
            error!(
                target: "reconciliation",
                booking_id = %booking_id,
                transaction_id = %tx.id,
                "Booking could not be recorded after payment, unwinding: {}", e
            );
            self.unwind_charge(&tx).await;
            self.release_held_seats(trip.id, booking_id).await;
            progress.advance(Phase::Failed);
            return Err(ReservationError::Internal(format!("booking could not be recorded: {}", e)));
        }
        progress.advance(Phase::Confirmed);

        info!(
            "Booking {} confirmed: {} seats on trip {} for {} ({} {})",
            booking_id, booking.seat_count, trip.id, booking.rider_id, total, booking.currency
        );
        self.events.emit(LifecycleEvent::BookingConfirmed {
            booking_id,
            trip_id: trip.id,
            rider_id: booking.rider_id.clone(),
            seat_count: booking.seat_count,
            total,
            currency: booking.currency.clone(),
            at: booking.updated_at,
        });
        Ok(booking)
    }

    async fn release_held_seats(&self, trip_id: Uuid, booking_id: Uuid) {
        let released = retry_with_predicate(
            "release held seats",
            &self.retry,
            || self.inventory.release_seats(trip_id, booking_id),
            |e| matches!(e, InventoryError::Store(_)),
        )
        .await;
        match released {
            Ok(_) => warn!("Released seats held by failed reservation {}", booking_id),
            Err(e) => {
                self.ledger
                    .record(Obligation::seat_release(booking_id, trip_id, e.to_string()))
                    .await
            }
        }
    }

    async fn unwind_charge(&self, tx: &PaymentTransaction) {
        let refunded = retry_with_predicate(
            "refund unrecorded booking",
            &self.retry,
            || self.authorizer.refund(tx.id, tx.amount),
            |e| e.is_transient(),
        )
        .await;
        match refunded {
            Ok(_) | Err(PaymentError::RefundUnrecorded { .. }) => {}
            Err(e) => self.ledger
                .record(Obligation::refund(
                    ObligationKind::Refund,
                    tx.booking_id,
                    tx.trip_id,
                    tx.id,
                    tx.amount,
                    e.to_string(),
                ))
                .await,
        }
    }
}
