use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Work that a coordinator could not finish and that must not be forgotten.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObligationKind {
    /// Seats still held for a booking that never materialised.
    SeatRelease,
    /// Money captured for a booking that was rolled back.
    Refund,
    /// Refund owed to a cancelling rider; success completes the cancellation.
    CancellationRefund,
}

impl ObligationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObligationKind::SeatRelease => "seat_release",
            ObligationKind::Refund => "refund",
            ObligationKind::CancellationRefund => "cancellation_refund",
        }
    }
}

impl fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObligationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seat_release" => Ok(ObligationKind::SeatRelease),
            "refund" => Ok(ObligationKind::Refund),
            "cancellation_refund" => Ok(ObligationKind::CancellationRefund),
            other => Err(CoreError::UnknownStatus {
                entity: "obligation",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    pub id: Uuid,
    pub kind: ObligationKind,
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Obligation {
    pub fn seat_release(booking_id: Uuid, trip_id: Uuid, error: impl Into<String>) -> Self {
        Self::new(ObligationKind::SeatRelease, booking_id, trip_id, None, None, error.into())
    }

    pub fn refund(kind: ObligationKind, booking_id: Uuid, trip_id: Uuid, transaction_id: Uuid, amount: Decimal, error: impl Into<String>) -> Self {
        Self::new(kind, booking_id, trip_id, Some(transaction_id), Some(amount), error.into())
    }

    fn new(
        kind: ObligationKind,
        booking_id: Uuid,
        trip_id: Uuid,
        transaction_id: Option<Uuid>,
        amount: Option<Decimal>,
        error: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            booking_id,
            trip_id,
            transaction_id,
            amount,
            attempts: 1,
            last_error: Some(error),
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    pub fn record_attempt(&mut self, error: Option<String>) {
        self.attempts += 1;
        match error {
            Some(e) => self.last_error = Some(e),
            None => self.resolved_at = Some(Utc::now()),
        }
    }
}
