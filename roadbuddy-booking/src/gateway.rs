use async_trait::async_trait;
use roadbuddy_core::payment::{ChargeRequest, GatewayError, GatewayReceipt, PaymentGateway};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Canned gateway answer, consumed before the default rules apply.
#[derive(Debug, Clone)]
pub enum Scripted {
    Approve,
    Decline(String),
    Unavailable(String),
    /// Approve after a delay.
    Slow(Duration),
    /// Sleep past any sensible timeout.
    Hang,
}

/// In-process stand-in for a card processor.
///
/// Without a script it approves everything except tokens prefixed
/// `tok_decline`, tokens prefixed `tok_unavailable`, and charges above
/// `decline_over`.
#[derive(Default)]
pub struct SimulatedGateway {
    decline_over: Option<Decimal>,
    charge_script: Mutex<VecDeque<Scripted>>,
    refund_script: Mutex<VecDeque<Scripted>>,
    charges: AtomicUsize,
    refunds: AtomicUsize,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decline_over(mut self, limit: Option<Decimal>) -> Self {
        self.decline_over = limit;
        self
    }

    pub fn script_charge(&self, outcome: Scripted) {
        self.charge_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    pub fn script_refund(&self, outcome: Scripted) {
        self.refund_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    /// Charge attempts that reached the gateway.
    pub fn charge_count(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.load(Ordering::SeqCst)
    }

    fn next(script: &Mutex<VecDeque<Scripted>>) -> Option<Scripted> {
        script.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    async fn play(&self, scripted: Scripted, prefix: &str) -> Result<GatewayReceipt, GatewayError> {
        match scripted {
            Scripted::Approve => Ok(receipt(prefix)),
            Scripted::Decline(reason) => Err(GatewayError::Declined(reason)),
            Scripted::Unavailable(reason) => Err(GatewayError::Unavailable(reason)),
            Scripted::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(receipt(prefix))
            }
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::Unavailable("hung".to_string()))
            }
        }
    }
}

fn receipt(prefix: &str) -> GatewayReceipt {
    GatewayReceipt {
        reference: format!("{}_{}", prefix, Uuid::new_v4().simple()),
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayReceipt, GatewayError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = Self::next(&self.charge_script) {
            return self.play(scripted, "sim_ch").await;
        }

        let token = request.token.expose();
        if token.starts_with("tok_decline") {
            return Err(GatewayError::Declined("card declined".to_string()));
        }
        if token.starts_with("tok_unavailable") {
            return Err(GatewayError::Unavailable("processor offline".to_string()));
        }
        if let Some(limit) = self.decline_over {
            if request.amount > limit {
                return Err(GatewayError::Declined(format!("amount exceeds limit of {}", limit)));
            }
        }

        debug!("Simulated charge of {} {} for transaction {}", request.amount, request.currency, request.transaction_id);
        Ok(receipt("sim_ch"))
    }

    async fn refund(&self, reference: &str, amount: Decimal) -> Result<GatewayReceipt, GatewayError> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = Self::next(&self.refund_script) {
            return self.play(scripted, "sim_re").await;
        }
        debug!("Simulated refund of {} against {}", amount, reference);
        Ok(receipt("sim_re"))
    }
}
