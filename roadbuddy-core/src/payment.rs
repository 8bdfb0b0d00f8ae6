use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use roadbuddy_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    PartialRefund,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::PartialRefund => "partial_refund",
        }
    }

    /// Forward-only, except that refund states are entered from a completed
    /// charge and a partial refund may be topped up.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed)
                | (Pending, Failed)
                | (Completed, Refunded)
                | (Completed, PartialRefund)
                | (PartialRefund, PartialRefund)
                | (PartialRefund, Refunded)
        )
    }

    pub fn is_refundable(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::PartialRefund)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "refunded" => Ok(TransactionStatus::Refunded),
            "partial_refund" => Ok(TransactionStatus::PartialRefund),
            other => Err(CoreError::UnknownStatus {
                entity: "transaction",
                value: other.to_string(),
            }),
        }
    }
}

/// One charge attempt and any refunds applied against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_method_id: Option<Uuid>,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub refunded_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn pending(
        booking_id: Uuid,
        trip_id: Uuid,
        amount: Decimal,
        currency: String,
        payment_method_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id,
            trip_id,
            amount,
            currency,
            status: TransactionStatus::Pending,
            payment_method_id,
            provider_reference: None,
            failure_reason: None,
            refunded_amount: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Amount still available to refund.
    pub fn refundable_amount(&self) -> Decimal {
        if !self.status.is_refundable() {
            return Decimal::ZERO;
        }
        self.amount - self.refunded_amount.unwrap_or(Decimal::ZERO)
    }

    pub fn transition(&mut self, next: TransactionStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                entity: "transaction",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Card,
    Wallet,
    BankAccount,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodType::Card => "card",
            PaymentMethodType::Wallet => "wallet",
            PaymentMethodType::BankAccount => "bank_account",
        }
    }
}

impl FromStr for PaymentMethodType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethodType::Card),
            "wallet" => Ok(PaymentMethodType::Wallet),
            "bank_account" => Ok(PaymentMethodType::BankAccount),
            other => Err(CoreError::UnknownStatus {
                entity: "payment method type",
                value: other.to_string(),
            }),
        }
    }
}

/// A stored payment instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub user_id: String,
    pub method_type: PaymentMethodType,
    pub masked_identifier: String,
    /// Last valid day; `None` for instruments that do not expire.
    pub expiry: Option<NaiveDate>,
    pub is_default: bool,
    pub token: Masked<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentMethod {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry.map(|expiry| expiry < today).unwrap_or(false)
    }
}

/// Context handed to the authorizer alongside the amount.
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub rider_id: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub transaction_id: Uuid,
    pub token: Masked<String>,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub reference: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Terminal for this attempt; the payer has to act.
    #[error("declined: {0}")]
    Declined(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Remote payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture `amount` against the tokenized instrument.
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayReceipt, GatewayError>;

    /// Refund part or all of a previous capture.
    async fn refund(&self, reference: &str, amount: Decimal) -> Result<GatewayReceipt, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_refund_states_only_follow_completed() {
        assert!(TransactionStatus::Completed.can_transition_to(TransactionStatus::Refunded));
        assert!(TransactionStatus::Completed.can_transition_to(TransactionStatus::PartialRefund));
        assert!(TransactionStatus::PartialRefund.can_transition_to(TransactionStatus::Refunded));
        assert!(!TransactionStatus::Pending.can_transition_to(TransactionStatus::Refunded));
        assert!(!TransactionStatus::Failed.can_transition_to(TransactionStatus::PartialRefund));
        assert!(!TransactionStatus::Refunded.can_transition_to(TransactionStatus::Completed));
    }

    #[test]
    fn test_refundable_amount() {
        let mut tx = PaymentTransaction::pending(Uuid::new_v4(), Uuid::new_v4(), dec!(100), "USD".into(), None);
        assert_eq!(tx.refundable_amount(), Decimal::ZERO);

        tx.transition(TransactionStatus::Completed).unwrap();
        assert_eq!(tx.refundable_amount(), dec!(100));

        tx.transition(TransactionStatus::PartialRefund).unwrap();
        tx.refunded_amount = Some(dec!(30));
        assert_eq!(tx.refundable_amount(), dec!(70));
    }

    #[test]
    fn test_payment_method_expiry() {
        let method = PaymentMethod {
            id: Uuid::new_v4(),
            user_id: "demo-user".into(),
            method_type: PaymentMethodType::Card,
            masked_identifier: "•••• 4242".into(),
            expiry: NaiveDate::from_ymd_opt(2025, 6, 30),
            is_default: true,
            token: Masked("tok_4242".into()),
            created_at: Utc::now(),
        };

        assert!(!method.is_expired(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));
        assert!(method.is_expired(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
    }
}
