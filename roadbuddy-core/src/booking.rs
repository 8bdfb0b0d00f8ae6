use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::UnknownStatus {
                entity: "booking",
                value: other.to_string(),
            }),
        }
    }
}

/// A rider's reservation of seats on one trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub rider_id: String,
    pub seat_count: u32,
    pub total_price: Decimal,
    pub currency: String,
    pub status: BookingStatus,
    pub transaction_id: Option<Uuid>,
    pub pickup: Option<String>,
    pub dropoff: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(id: Uuid, trip_id: Uuid, rider_id: String, seat_count: u32, total_price: Decimal, currency: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            trip_id,
            rider_id,
            seat_count,
            total_price,
            currency,
            status: BookingStatus::Pending,
            transaction_id: None,
            pickup: None,
            dropoff: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_stops(mut self, pickup: Option<String>, dropoff: Option<String>) -> Self {
        self.pickup = pickup;
        self.dropoff = dropoff;
        self
    }

    /// Pending → Confirmed, linking the completed charge.
    pub fn confirm(&mut self, transaction_id: Uuid) -> CoreResult<()> {
        self.transition(BookingStatus::Confirmed)?;
        self.transaction_id = Some(transaction_id);
        Ok(())
    }

    pub fn cancel(&mut self) -> CoreResult<()> {
        self.transition(BookingStatus::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }

    fn transition(&mut self, next: BookingStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                entity: "booking",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
