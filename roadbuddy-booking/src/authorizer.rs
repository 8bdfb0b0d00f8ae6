use chrono::Utc;
use roadbuddy_core::payment::{ChargeRequest, GatewayError, PaymentContext, PaymentGateway};
use roadbuddy_core::repository::{PaymentMethodRepository, TransactionRepository};
use roadbuddy_core::{KeyedLocks, PaymentTransaction, TransactionStatus};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::retry::{retry_with_backoff, retry_with_predicate, RetryPolicy};

#[derive(Debug, Clone)]
pub struct AuthorizerConfig {
    pub timeout: Duration,
    pub breaker_failure_threshold: usize,
    pub breaker_reset: Duration,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            breaker_failure_threshold: 5,
            breaker_reset: Duration::from_secs(30),
        }
    }
}

/// Charges and refunds against stored payment methods.
///
/// Every charge attempt is persisted as a `PaymentTransaction`, successful
/// or not. Refunds on one transaction are serialized so the refunded total
/// never exceeds the original amount.
pub struct PaymentAuthorizer {
    gateway: Arc<dyn PaymentGateway>,
    methods: Arc<dyn PaymentMethodRepository>,
    transactions: Arc<dyn TransactionRepository>,
    breaker: CircuitBreaker,
    timeout: Duration,
    retry: RetryPolicy,
    refund_locks: KeyedLocks<Uuid>,
}

impl PaymentAuthorizer {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        methods: Arc<dyn PaymentMethodRepository>,
        transactions: Arc<dyn TransactionRepository>,
        config: AuthorizerConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            methods,
            transactions,
            breaker: CircuitBreaker::new("payment-gateway", config.breaker_failure_threshold, config.breaker_reset),
            timeout: config.timeout,
            retry,
            refund_locks: KeyedLocks::new(),
        }
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Option<PaymentTransaction>, PaymentError> {
        self.transactions
            .get_transaction(id)
            .await
            .map_err(|e| PaymentError::Store(e.to_string()))
    }

    /// Capture `amount` from the rider's method. Returns the completed
    /// transaction; on any error no money has been taken.
    pub async fn authorize(
        &self,
        method_id: Uuid,
        amount: Decimal,
        ctx: &PaymentContext,
    ) -> Result<PaymentTransaction, PaymentError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PaymentError::InvalidAmount(amount));
        }

        let mut tx = PaymentTransaction::pending(ctx.booking_id, ctx.trip_id, amount, ctx.currency.clone(), Some(method_id));
        self.transactions
            .create_transaction(&tx)
            .await
            .map_err(|e| PaymentError::Store(e.to_string()))?;

        let method = match self.methods.get_method(method_id).await {
            Ok(Some(method)) => method,
            Ok(None) => {
                return Err(self.fail(tx, PaymentError::MethodInvalid(format!("payment method {} not found", method_id))).await)
            }
            Err(e) => return Err(self.fail(tx, PaymentError::Store(e.to_string())).await),
        };
        if method.user_id != ctx.rider_id {
            return Err(self
                .fail(tx, PaymentError::MethodInvalid("payment method belongs to another user".to_string()))
                .await);
        }
        if method.is_expired(Utc::now().date_naive()) {
            return Err(self.fail(tx, PaymentError::MethodInvalid("payment method has expired".to_string())).await);
        }

        if !self.breaker.check().await {
            return Err(self
                .fail(tx, PaymentError::Unavailable("payment provider circuit is open".to_string()))
                .await);
        }

        let request = ChargeRequest {
            transaction_id: tx.id,
            token: method.token.clone(),
            amount,
            currency: ctx.currency.clone(),
        };
        let receipt = match tokio::time::timeout(self.timeout, self.gateway.charge(&request)).await {
            Ok(Ok(receipt)) => {
                self.breaker.record_success().await;
                receipt
            }
            Ok(Err(GatewayError::Declined(reason))) => {
                // A decline is a healthy answer from the provider.
                self.breaker.record_success().await;
                return Err(self.fail(tx, PaymentError::Declined(reason)).await);
            }
            Ok(Err(GatewayError::Unavailable(reason))) => {
                self.breaker.record_failure().await;
                return Err(self.fail(tx, PaymentError::Unavailable(reason)).await);
            }
            Err(_) => {
                self.breaker.record_failure().await;
                let reason = format!("no response within {} ms", self.timeout.as_millis());
                return Err(self.fail(tx, PaymentError::Unavailable(reason)).await);
            }
        };

        tx.provider_reference = Some(receipt.reference.clone());
        tx.transition(TransactionStatus::Completed)
            .map_err(|e| PaymentError::Store(e.to_string()))?;

        let saved = retry_with_backoff("persist completed transaction", &self.retry, || {
            self.transactions.update_transaction(&tx)
        })
        .await;
        if let Err(e) = saved {
            self.void_unrecorded_capture(&tx, &receipt.reference).await;
            return Err(PaymentError::Store(e.to_string()));
        }

        info!(
            "Captured {} {} for booking {} (transaction {}, reference {})",
            amount, tx.currency, ctx.booking_id, tx.id, receipt.reference
        );
        Ok(tx)
    }

    /// Refund `amount` against a completed transaction.
    ///
    /// Cumulative refunds are capped at the original amount; a refund that
    /// reaches it moves the transaction to `Refunded`.
    pub async fn refund(&self, transaction_id: Uuid, amount: Decimal) -> Result<PaymentTransaction, PaymentError> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(amount));
        }

        let _guard = self.refund_locks.lock(&transaction_id).await;

        let mut tx = self
            .get_transaction(transaction_id)
            .await?
            .ok_or(PaymentError::TransactionNotFound(transaction_id))?;

        if !tx.status.is_refundable() {
            return Err(PaymentError::TransactionNotRefundable {
                transaction_id,
                status: tx.status,
            });
        }
        let refundable = tx.refundable_amount();
        if amount > refundable {
            return Err(PaymentError::RefundExceedsOriginal {
                requested: amount,
                refundable,
            });
        }
        let reference = tx
            .provider_reference
            .clone()
            .ok_or(PaymentError::TransactionNotRefundable {
                transaction_id,
                status: tx.status,
            })?;

        if !self.breaker.check().await {
            return Err(PaymentError::Unavailable("payment provider circuit is open".to_string()));
        }
        match tokio::time::timeout(self.timeout, self.gateway.refund(&reference, amount)).await {
            Ok(Ok(_)) => self.breaker.record_success().await,
            Ok(Err(GatewayError::Declined(reason))) => {
                self.breaker.record_success().await;
                return Err(PaymentError::RefundRejected(reason));
            }
            Ok(Err(GatewayError::Unavailable(reason))) => {
                self.breaker.record_failure().await;
                return Err(PaymentError::Unavailable(reason));
            }
            Err(_) => {
                self.breaker.record_failure().await;
                return Err(PaymentError::Unavailable(format!(
                    "no response within {} ms",
                    self.timeout.as_millis()
                )));
            }
        }

        let refunded_total = tx.refunded_amount.unwrap_or(Decimal::ZERO) + amount;
        let next = if refunded_total == tx.amount {
            TransactionStatus::Refunded
        } else {
            TransactionStatus::PartialRefund
        };
        tx.transition(next).map_err(|e| PaymentError::Store(e.to_string()))?;
        tx.refunded_amount = Some(refunded_total);

        let saved = retry_with_backoff("persist refund", &self.retry, || self.transactions.update_transaction(&tx)).await;
        if let Err(e) = saved {
            error!(
                target: "reconciliation",
                transaction_id = %tx.id,
                booking_id = %tx.booking_id,
                refunded = %amount,
                "Refund issued at provider but not recorded: {}", e
            );
            return Err(PaymentError::RefundUnrecorded {
                transaction_id: tx.id,
                amount,
                reason: e.to_string(),
            });
        }

        info!("Refunded {} {} on transaction {} (now {})", amount, tx.currency, tx.id, tx.status);
        Ok(tx)
    }

    /// Persist the failed attempt and hand back the error for the caller.
    async fn fail(&self, mut tx: PaymentTransaction, err: PaymentError) -> PaymentError {
        tx.failure_reason = Some(err.to_string());
        if tx.transition(TransactionStatus::Failed).is_ok() {
            if let Err(e) = self.transactions.update_transaction(&tx).await {
                warn!("Could not record failed payment attempt {}: {}", tx.id, e);
            }
        }
        warn!("Payment for booking {} failed: {}", tx.booking_id, err);
        err
    }

    async fn void_unrecorded_capture(&self, tx: &PaymentTransaction, reference: &str) {
        let voided = retry_with_predicate(
            "void unrecorded capture",
            &self.retry,
            || self.gateway.refund(reference, tx.amount),
            |e| matches!(e, GatewayError::Unavailable(_)),
        )
        .await;
        match voided {
            Ok(_) => warn!("Voided capture {} for booking {} after store failure", reference, tx.booking_id),
            Err(e) => error!(
                target: "reconciliation",
                transaction_id = %tx.id,
                booking_id = %tx.booking_id,
                reference = %reference,
                amount = %tx.amount,
                "Capture could neither be recorded nor voided: {}", e
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaymentError {
    #[error("declined: {0}")]
    Declined(String),

    #[error("invalid payment method: {0}")]
    MethodInvalid(String),

    #[error("payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsOriginal { requested: Decimal, refundable: Decimal },

    #[error("transaction {transaction_id} is not refundable (status: {status})")]
    TransactionNotRefundable {
        transaction_id: Uuid,
        status: TransactionStatus,
    },

    #[error("transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("refund rejected by provider: {0}")]
    RefundRejected(String),

    /// The provider paid the refund but the transaction still reads as
    /// unrefunded. Settled as far as the provider is concerned; never retry.
    #[error("refund of {amount} on transaction {transaction_id} issued but not recorded: {reason}")]
    RefundUnrecorded {
        transaction_id: Uuid,
        amount: Decimal,
        reason: String,
    },

    #[error("payment store failure: {0}")]
    Store(String),
}

impl PaymentError {
    /// Failures worth retrying without a change of input.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Unavailable(_) | PaymentError::Store(_))
    }
}
