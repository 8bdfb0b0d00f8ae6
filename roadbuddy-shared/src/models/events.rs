use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notifications emitted by the reservation engine.
///
/// Delivery is fire-and-forget: emitters never wait on a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    BookingConfirmed {
        booking_id: Uuid,
        trip_id: Uuid,
        rider_id: String,
        seat_count: u32,
        total: Decimal,
        currency: String,
        at: DateTime<Utc>,
    },
    BookingCancelled {
        booking_id: Uuid,
        trip_id: Uuid,
        rider_id: String,
        seat_count: u32,
        refunded: Option<Decimal>,
        at: DateTime<Utc>,
    },
    StatusChanged {
        trip_id: Uuid,
        from: String,
        to: String,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn trip_id(&self) -> Uuid {
        match self {
            LifecycleEvent::BookingConfirmed { trip_id, .. }
            | LifecycleEvent::BookingCancelled { trip_id, .. }
            | LifecycleEvent::StatusChanged { trip_id, .. } => *trip_id,
        }
    }

    /// Topic name used by message-bus sinks.
    pub fn topic(&self) -> &'static str {
        match self {
            LifecycleEvent::BookingConfirmed { .. } => "booking.confirmed",
            LifecycleEvent::BookingCancelled { .. } => "booking.cancelled",
            LifecycleEvent::StatusChanged { .. } => "trip.status_changed",
        }
    }
}
