use roadbuddy_catalog::{InventoryError, InventoryManager};
use roadbuddy_core::repository::ObligationRepository;
use roadbuddy_core::{Obligation, ObligationKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::authorizer::{PaymentAuthorizer, PaymentError};
use crate::cancellation::CancellationCoordinator;
use crate::error::CancellationError;

/// Durable record of compensation work that could not be completed inline.
pub struct ObligationLedger {
    repo: Arc<dyn ObligationRepository>,
}

impl ObligationLedger {
    pub fn new(repo: Arc<dyn ObligationRepository>) -> Self {
        Self { repo }
    }

    /// Record an obligation, folding it into an open one of the same kind
    /// for the same booking.
    pub async fn record(&self, obligation: Obligation) {
        error!(
            target: "reconciliation",
            kind = %obligation.kind,
            booking_id = %obligation.booking_id,
            trip_id = %obligation.trip_id,
            transaction_id = ?obligation.transaction_id,
            amount = ?obligation.amount,
            "Compensation pending: {}",
            obligation.last_error.as_deref().unwrap_or("unknown failure")
        );

        let existing = match self.repo.list_open_obligations().await {
            Ok(open) => open
                .into_iter()
                .find(|o| o.kind == obligation.kind && o.booking_id == obligation.booking_id),
            Err(e) => {
                warn!("Could not read open obligations: {}", e);
                None
            }
        };

        let stored = match existing {
            Some(mut open) => {
                open.record_attempt(obligation.last_error.clone());
                self.repo.update_obligation(&open).await
            }
            None => self.repo.record_obligation(&obligation).await,
        };
        if let Err(e) = stored {
            error!(
                target: "reconciliation",
                obligation = ?obligation,
                "Obligation could not be stored: {}", e
            );
        }
    }

    pub async fn open(&self) -> Result<Vec<Obligation>, String> {
        self.repo.list_open_obligations().await.map_err(|e| e.to_string())
    }

    async fn update(&self, obligation: &Obligation) {
        if let Err(e) = self.repo.update_obligation(obligation).await {
            warn!("Could not update obligation {}: {}", obligation.id, e);
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub resolved: usize,
    pub still_open: usize,
}

/// Periodically retries open obligations until they succeed.
pub struct ObligationSweeper {
    ledger: Arc<ObligationLedger>,
    inventory: Arc<InventoryManager>,
    authorizer: Arc<PaymentAuthorizer>,
    cancellations: Arc<CancellationCoordinator>,
    interval: Duration,
}

impl ObligationSweeper {
    pub fn new(
        ledger: Arc<ObligationLedger>,
        inventory: Arc<InventoryManager>,
        authorizer: Arc<PaymentAuthorizer>,
        cancellations: Arc<CancellationCoordinator>,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            inventory,
            authorizer,
            cancellations,
            interval,
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Obligation sweeper started (every {:?})", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.sweep_once().await;
                if report.resolved > 0 || report.still_open > 0 {
                    info!("Obligation sweep: {} resolved, {} still open", report.resolved, report.still_open);
                }
            }
        })
    }

    pub async fn sweep_once(&self) -> SweepReport {
        let open = match self.ledger.open().await {
            Ok(open) => open,
            Err(e) => {
                warn!("Obligation sweep skipped: {}", e);
                return SweepReport::default();
            }
        };

        let mut report = SweepReport::default();
        for mut obligation in open {
            let outcome = self.attempt(&obligation).await;
            let resolved = outcome.is_ok();
            obligation.record_attempt(outcome.err());
            self.ledger.update(&obligation).await;

            if resolved {
                info!(
                    "Obligation {} ({}) for booking {} resolved after {} attempts",
                    obligation.id, obligation.kind, obligation.booking_id, obligation.attempts
                );
                report.resolved += 1;
            } else {
                report.still_open += 1;
            }
        }
        report
    }

    async fn attempt(&self, obligation: &Obligation) -> Result<(), String> {
        match obligation.kind {
            ObligationKind::SeatRelease => {
                match self
                    .inventory
                    .release_seats(obligation.trip_id, obligation.booking_id)
                    .await
                {
                    Ok(_) | Err(InventoryError::HoldNotFound(_)) => Ok(()),
                    Err(e) => Err(e.to_string()),
                }
            }
            ObligationKind::Refund => {
                let (Some(tx_id), Some(amount)) = (obligation.transaction_id, obligation.amount) else {
                    return Err("refund obligation without transaction".to_string());
                };
                match self.authorizer.refund(tx_id, amount).await {
                    Ok(_) | Err(PaymentError::RefundUnrecorded { .. }) => Ok(()),
                    // Already refunded by someone else.
                    Err(PaymentError::TransactionNotRefundable { .. }) | Err(PaymentError::RefundExceedsOriginal { .. }) => {
                        warn!("Refund obligation {} found nothing left to refund", obligation.id);
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
            ObligationKind::CancellationRefund => {
                match self.cancellations.retry_cancellation(obligation.booking_id).await {
                    Ok(_) | Err(CancellationError::AlreadyCancelled(_)) => Ok(()),
                    Err(e) => Err(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Harness;
    use roadbuddy_core::repository::TransactionRepository;
    use roadbuddy_core::TransactionStatus;
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_refund_obligation_is_retried_until_paid() {
        let h = Harness::new();
        let trip = h.trip(2, dec!(40)).await;
        h.rider("rider-1", "tok_visa").await;
        let booking = h.engine.reservations.reserve(h.request(trip.id, "rider-1", 1)).await.unwrap();
        let tx_id = booking.transaction_id.unwrap();

        h.engine
            .ledger
            .record(Obligation::refund(ObligationKind::Refund, booking.id, trip.id, tx_id, dec!(40), "provider offline"))
            .await;
        h.gateway.script_refund(crate::gateway::Scripted::Unavailable("still offline".into()));

        let first = h.engine.sweeper.sweep_once().await;
        assert_eq!(first, SweepReport { resolved: 0, still_open: 1 });

        let second = h.engine.sweeper.sweep_once().await;
        assert_eq!(second, SweepReport { resolved: 1, still_open: 0 });

        let tx = h.transactions.get_transaction(tx_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Refunded);

        let obligation = h.obligations.all().await.remove(0);
        assert_eq!(obligation.attempts, 3);
        assert!(!obligation.is_open());
    }

    #[tokio::test]
    async fn test_unrecorded_refund_obligation_is_paid_once() {
        let h = Harness::new();
        let trip = h.trip(2, dec!(40)).await;
        h.rider("rider-1", "tok_visa").await;
        let booking = h.engine.reservations.reserve(h.request(trip.id, "rider-1", 1)).await.unwrap();
        let tx_id = booking.transaction_id.unwrap();
        h.transactions.failing_updates.store(10, Ordering::SeqCst);

        h.engine
            .ledger
            .record(Obligation::refund(ObligationKind::Refund, booking.id, trip.id, tx_id, dec!(40), "provider offline"))
            .await;

        let first = h.engine.sweeper.sweep_once().await;
        assert_eq!(first, SweepReport { resolved: 1, still_open: 0 });
        let second = h.engine.sweeper.sweep_once().await;
        assert_eq!(second, SweepReport::default());
        assert_eq!(h.gateway.refund_count(), 1);
    }

    #[tokio::test]
    async fn test_refund_obligation_closes_when_nothing_is_owed() {
        let h = Harness::new();
        let trip = h.trip(2, dec!(40)).await;
        h.rider("rider-1", "tok_visa").await;
        let booking = h.engine.reservations.reserve(h.request(trip.id, "rider-1", 1)).await.unwrap();
        let tx_id = booking.transaction_id.unwrap();

        h.engine.authorizer.refund(tx_id, dec!(40)).await.unwrap();
        h.engine
            .ledger
            .record(Obligation::refund(ObligationKind::Refund, booking.id, trip.id, tx_id, dec!(40), "timeout"))
            .await;

        let report = h.engine.sweeper.sweep_once().await;
        assert_eq!(report.resolved, 1);
        assert_eq!(h.gateway.refund_count(), 1);
    }
}
