use roadbuddy_catalog::{InventoryError, InventoryManager};
use roadbuddy_core::repository::BookingRepository;
use roadbuddy_core::{Booking, BookingStatus, EventSink, KeyedLocks, Obligation, ObligationKind};
use roadbuddy_shared::LifecycleEvent;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::authorizer::{PaymentAuthorizer, PaymentError};
use crate::error::CancellationError;
use crate::obligations::ObligationLedger;
use crate::retry::{retry_with_backoff, retry_with_predicate, RetryPolicy};

/// Cancels bookings: seats first, then the refund.
///
/// Seats go back even if the refund fails. In that case the booking stays
/// confirmed and a refund obligation is queued; retrying completes it.
pub struct CancellationCoordinator {
    inventory: Arc<InventoryManager>,
    authorizer: Arc<PaymentAuthorizer>,
    bookings: Arc<dyn BookingRepository>,
    ledger: Arc<ObligationLedger>,
    events: Arc<dyn EventSink>,
    retry: RetryPolicy,
    locks: KeyedLocks<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefundFailure {
    Record,
    Report,
}

impl CancellationCoordinator {
    pub fn new(
        inventory: Arc<InventoryManager>,
        authorizer: Arc<PaymentAuthorizer>,
        bookings: Arc<dyn BookingRepository>,
        ledger: Arc<ObligationLedger>,
        events: Arc<dyn EventSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inventory,
            authorizer,
            bookings,
            ledger,
            events,
            retry,
            locks: KeyedLocks::new(),
        }
    }

    /// Cancel a booking. Runs to completion even if the caller goes away.
    pub async fn cancel(self: &Arc<Self>, booking_id: Uuid) -> Result<Booking, CancellationError> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(booking_id, RefundFailure::Record).await })
            .await
            .map_err(|e| CancellationError::Internal(format!("cancellation task failed: {}", e)))?
    }

    /// Cancel every live booking on a trip, e.g. when the driver cancels it.
    pub async fn cancel_trip_bookings(self: &Arc<Self>, trip_id: Uuid) -> Result<Vec<(Uuid, Result<Booking, CancellationError>)>, CancellationError> {
        let bookings = self
            .bookings
            .list_bookings_for_trip(trip_id)
            .await
            .map_err(|e| CancellationError::Internal(e.to_string()))?;

        let mut outcomes = Vec::new();
        for booking in bookings.into_iter().filter(|b| !b.is_cancelled()) {
            let outcome = self.cancel(booking.id).await;
            if let Err(e) = &outcome {
                warn!("Cascade cancel of booking {} on trip {} failed: {}", booking.id, trip_id, e);
            }
            outcomes.push((booking.id, outcome));
        }
        info!("Cancelled {} bookings on trip {}", outcomes.iter().filter(|(_, r)| r.is_ok()).count(), trip_id);
        Ok(outcomes)
    }

    /// Re-run a cancellation whose refund failed earlier. Does not queue a
    /// new obligation; the caller owns the existing one.
    pub(crate) async fn retry_cancellation(&self, booking_id: Uuid) -> Result<Booking, CancellationError> {
        self.run(booking_id, RefundFailure::Report).await
    }

    async fn run(&self, booking_id: Uuid, on_refund_failure: RefundFailure) -> Result<Booking, CancellationError> {
        let _guard = self.locks.lock(&booking_id).await;

        let mut booking = self
            .bookings
            .get_booking(booking_id)
            .await
            .map_err(|e| CancellationError::Internal(e.to_string()))?
            .ok_or(CancellationError::BookingNotFound(booking_id))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(CancellationError::AlreadyCancelled(booking_id));
        }

        let released = retry_with_predicate(
            "release seats",
            &self.retry,
            || self.inventory.release_seats(booking.trip_id, booking_id),
            |e| matches!(e, InventoryError::Store(_)),
        )
        .await;
        match released {
            Ok(_) => {}
            Err(InventoryError::HoldNotFound(_)) => warn!("Booking {} had no seat hold to release", booking_id),
            Err(e) => return Err(CancellationError::Internal(format!("could not release seats: {}", e))),
        }

        let refunded = self.refund(&booking, on_refund_failure).await?;

        booking
            .cancel()
            .map_err(|e| CancellationError::Internal(e.to_string()))?;
        let saved = retry_with_backoff("persist cancelled booking", &self.retry, || {
            self.bookings.update_booking(&booking)
        })
        .await;
        if let Err(e) = saved {
            error!(
                target: "reconciliation",
                booking_id = %booking_id,
                refunded = ?refunded,
                "Seats released and refund settled but booking not marked cancelled: {}", e
            );
            return Err(CancellationError::Internal(format!("could not record cancellation, retry: {}", e)));
        }

        info!("Booking {} cancelled ({} seats, refunded {:?})", booking_id, booking.seat_count, refunded);
        self.events.emit(LifecycleEvent::BookingCancelled {
            booking_id,
            trip_id: booking.trip_id,
            rider_id: booking.rider_id.clone(),
            seat_count: booking.seat_count,
            refunded,
            at: booking.updated_at,
        });
        Ok(booking)
    }

    /// Refund whatever is still refundable on the booking's charge.
    async fn refund(&self, booking: &Booking, on_failure: RefundFailure) -> Result<Option<Decimal>, CancellationError> {
        let Some(tx_id) = booking.transaction_id else {
            return Ok(None);
        };
        let tx = self
            .authorizer
            .get_transaction(tx_id)
            .await
            .map_err(|e| CancellationError::Internal(e.to_string()))?
            .ok_or_else(|| CancellationError::Internal(format!("transaction {} missing", tx_id)))?;

        let amount = tx.refundable_amount();
        if amount <= Decimal::ZERO {
            return Ok(None);
        }

        match retry_with_predicate(
            "cancellation refund",
            &self.retry,
            || self.authorizer.refund(tx_id, amount),
            |e| e.is_transient(),
        )
        .await
        {
            Ok(_) => Ok(Some(amount)),
            // Paid out at the provider; already routed to reconciliation.
            Err(PaymentError::RefundUnrecorded { amount, .. }) => Ok(Some(amount)),
            Err(e) => {
                if on_failure == RefundFailure::Record {
                    self.ledger
                        .record(Obligation::refund(
                            ObligationKind::CancellationRefund,
                            booking.id,
                            booking.trip_id,
                            tx_id,
                            amount,
                            e.to_string(),
                        ))
                        .await;
                }
                Err(CancellationError::RefundFailed {
                    booking_id: booking.id,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Scripted;
    use crate::obligations::SweepReport;
    use crate::testkit::Harness;
    use roadbuddy_core::repository::TransactionRepository;
    use roadbuddy_core::{TransactionStatus, TripStatus};
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;

    async fn booked(h: &Harness, seats: u32) -> (Uuid, Booking) {
        let trip = h.trip(3, dec!(45)).await;
        h.rider("rider-1", "tok_visa").await;
        let booking = h
            .engine
            .reservations
            .reserve(h.request(trip.id, "rider-1", seats))
            .await
            .unwrap();
        (trip.id, booking)
    }

    #[tokio::test]
    async fn test_cancel_releases_seats_and_refunds() {
        let h = Harness::new();
        let (trip_id, booking) = booked(&h, 2).await;
        assert_eq!(h.available(trip_id).await, 1);

        let cancelled = h.engine.cancellations.cancel(booking.id).await.unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(h.available(trip_id).await, 3);
        let tx = h
            .transactions
            .get_transaction(booking.transaction_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.refunded_amount, Some(dec!(90)));

        let events = h.events.events();
        assert!(matches!(
            events.last(),
            Some(LifecycleEvent::BookingCancelled { refunded: Some(amount), .. }) if *amount == dec!(90)
        ));
    }

    #[tokio::test]
    async fn test_second_cancel_is_rejected_without_side_effects() {
        let h = Harness::new();
        let (trip_id, booking) = booked(&h, 2).await;

        h.engine.cancellations.cancel(booking.id).await.unwrap();
        let again = h.engine.cancellations.cancel(booking.id).await;

        assert!(matches!(again, Err(CancellationError::AlreadyCancelled(id)) if id == booking.id));
        assert_eq!(h.available(trip_id).await, 3);
        assert_eq!(h.gateway.refund_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_booking() {
        let h = Harness::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            h.engine.cancellations.cancel(missing).await,
            Err(CancellationError::BookingNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_refund_failure_keeps_booking_and_queues_refund() {
        let h = Harness::new();
        let (trip_id, booking) = booked(&h, 2).await;
        for _ in 0..3 {
            h.gateway.script_refund(Scripted::Unavailable("processor maintenance".into()));
        }

        let err = h.engine.cancellations.cancel(booking.id).await.unwrap_err();

        assert!(matches!(err, CancellationError::RefundFailed { booking_id, .. } if booking_id == booking.id));
        assert_eq!(h.available(trip_id).await, 3);
        let stored = h.engine.queries.get_booking(booking.id).await.unwrap();
        assert_eq!(stored.booking.status, BookingStatus::Confirmed);

        let open = h.obligations.all().await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, ObligationKind::CancellationRefund);
        assert_eq!(open[0].amount, Some(dec!(90)));

        let report = h.engine.sweeper.sweep_once().await;
        assert_eq!(report.resolved, 1);

        let stored = h.engine.queries.get_booking(booking.id).await.unwrap();
        assert_eq!(stored.booking.status, BookingStatus::Cancelled);
        assert_eq!(h.available(trip_id).await, 3);
        let tx = h
            .transactions
            .get_transaction(booking.transaction_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert!(h.obligations.all().await.iter().all(|o| !o.is_open()));
    }

    #[tokio::test]
    async fn test_repeated_refund_failures_share_one_obligation() {
        let h = Harness::new();
        let (_, booking) = booked(&h, 1).await;
        for _ in 0..6 {
            h.gateway.script_refund(Scripted::Decline("account closed".into()));
        }

        assert!(h.engine.cancellations.cancel(booking.id).await.is_err());
        assert!(h.engine.cancellations.cancel(booking.id).await.is_err());

        let open = h.obligations.all().await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_driver_cancelling_trip_cancels_its_bookings() {
        let h = Harness::new();
        let trip = h.trip(4, dec!(30)).await;
        h.rider("rider-1", "tok_visa").await;
        h.rider("rider-2", "tok_visa").await;
        h.engine.reservations.reserve(h.request(trip.id, "rider-1", 1)).await.unwrap();
        h.engine.reservations.reserve(h.request(trip.id, "rider-2", 2)).await.unwrap();

        h.engine
            .catalog
            .change_status(trip.id, "driver-1", TripStatus::Cancelled)
            .await
            .unwrap();
        let outcomes = h.engine.cancellations.cancel_trip_bookings(trip.id).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(h.available(trip.id).await, 4);
        assert_eq!(h.gateway.refund_count(), 2);
    }

    #[tokio::test]
    async fn test_unrecorded_refund_is_paid_once() {
        let h = Harness::new();
        let (trip_id, booking) = booked(&h, 2).await;
        h.transactions.failing_updates.store(10, Ordering::SeqCst);

        let cancelled = h.engine.cancellations.cancel(booking.id).await.unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(h.available(trip_id).await, 3);
        assert_eq!(h.gateway.refund_count(), 1);
        assert!(h.obligations.all().await.is_empty());

        let report = h.engine.sweeper.sweep_once().await;
        assert_eq!(report, SweepReport::default());
        assert!(matches!(
            h.engine.cancellations.cancel(booking.id).await,
            Err(CancellationError::AlreadyCancelled(_))
        ));
        assert_eq!(h.gateway.refund_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cancels_settle_once() {
        let h = Harness::new();
        let (trip_id, booking) = booked(&h, 2).await;

        let booking_id = booking.id;
        let mut handles = Vec::new();
        for _ in 0..5 {
            let cancellations = h.engine.cancellations.clone();
            handles.push(tokio::spawn(async move { cancellations.cancel(booking_id).await }));
        }

        let mut cancelled = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => cancelled += 1,
                Err(CancellationError::AlreadyCancelled(_)) => already += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(cancelled, 1);
        assert_eq!(already, 4);
        assert_eq!(h.available(trip_id).await, 3);
        assert_eq!(h.gateway.refund_count(), 1);
    }
}
