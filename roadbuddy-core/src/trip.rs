use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Trip status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Active,
    Full,
    Cancelled,
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Active => "active",
            TripStatus::Full => "full",
            TripStatus::Cancelled => "cancelled",
            TripStatus::Completed => "completed",
        }
    }

    /// Owner-driven transitions. Cancelled and completed are terminal.
    pub fn can_transition_to(&self, next: TripStatus) -> bool {
        use TripStatus::*;
        matches!(
            (self, next),
            (Active, Full)
                | (Full, Active)
                | (Active, Cancelled)
                | (Full, Cancelled)
                | (Active, Completed)
                | (Full, Completed)
        )
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TripStatus::Active),
            "full" => Ok(TripStatus::Full),
            "cancelled" => Ok(TripStatus::Cancelled),
            "completed" => Ok(TripStatus::Completed),
            other => Err(CoreError::UnknownStatus {
                entity: "trip",
                value: other.to_string(),
            }),
        }
    }
}

/// An offered ride with a fixed number of seats at a per-seat price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub driver_id: String,
    pub driver_name: String,
    pub departure_city: String,
    pub destination_city: String,
    pub departure_time: DateTime<Utc>,
    pub price_per_seat: Decimal,
    pub total_seats: u32,
    pub available_seats: u32,
    pub status: TripStatus,
    pub estimated_duration: Option<String>,
    pub car_model: Option<String>,
    pub amenities: Vec<String>,
    pub pickup_points: Vec<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(driver_id: String, details: NewTrip) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            driver_id,
            driver_name: details.driver_name,
            departure_city: details.departure_city,
            destination_city: details.destination_city,
            departure_time: details.departure_time,
            price_per_seat: details.price_per_seat,
            total_seats: details.seats,
            available_seats: details.seats,
            status: TripStatus::Active,
            estimated_duration: details.estimated_duration,
            car_model: details.car_model,
            amenities: details.amenities,
            pickup_points: details.pickup_points,
            description: details.description,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn route(&self) -> String {
        format!("{} → {}", self.departure_city, self.destination_city)
    }

    pub fn booked_seats(&self) -> u32 {
        self.total_seats.saturating_sub(self.available_seats)
    }
}

/// Driver-supplied fields for posting a trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrip {
    pub driver_name: String,
    pub departure_city: String,
    pub destination_city: String,
    pub departure_time: DateTime<Utc>,
    pub price_per_seat: Decimal,
    pub seats: u32,
    #[serde(default)]
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub car_model: Option<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub pickup_points: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Free-text trip search. Empty fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl TripQuery {
    pub fn matches(&self, trip: &Trip) -> bool {
        let needle = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
        };

        if let Some(q) = needle(&self.q) {
            let hit = trip.route().to_lowercase().contains(&q)
                || trip.departure_city.to_lowercase().contains(&q)
                || trip.destination_city.to_lowercase().contains(&q);
            if !hit {
                return false;
            }
        }
        if let Some(from) = needle(&self.from) {
            if !trip.departure_city.to_lowercase().contains(&from) {
                return false;
            }
        }
        if let Some(to) = needle(&self.to) {
            if !trip.destination_city.to_lowercase().contains(&to) {
                return false;
            }
        }
        true
    }
}

/// Seats held on a trip on behalf of one booking.
///
/// Releases are tracked against the booking id so a second release of the
/// same hold is a no-op rather than a double credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatHold {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub seat_count: u32,
    pub held_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl SeatHold {
    pub fn new(booking_id: Uuid, trip_id: Uuid, seat_count: u32) -> Self {
        Self {
            booking_id,
            trip_id,
            seat_count,
            held_at: Utc::now(),
            released_at: None,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_trip() -> Trip {
        Trip::new(
            "driver-1".to_string(),
            NewTrip {
                driver_name: "Sarah M.".to_string(),
                departure_city: "New York".to_string(),
                destination_city: "Boston".to_string(),
                departure_time: Utc::now(),
                price_per_seat: dec!(45.00),
                seats: 4,
                estimated_duration: Some("4h 30m".to_string()),
                car_model: Some("Honda Accord".to_string()),
                amenities: vec!["WiFi".to_string()],
                pickup_points: vec!["Penn Station".to_string()],
                description: None,
            },
        )
    }

    #[test]
    fn test_status_transitions() {
        assert!(TripStatus::Active.can_transition_to(TripStatus::Full));
        assert!(TripStatus::Full.can_transition_to(TripStatus::Active));
        assert!(TripStatus::Full.can_transition_to(TripStatus::Cancelled));
        assert!(!TripStatus::Cancelled.can_transition_to(TripStatus::Active));
        assert!(!TripStatus::Completed.can_transition_to(TripStatus::Cancelled));
        assert!(!TripStatus::Active.can_transition_to(TripStatus::Active));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            TripStatus::Active,
            TripStatus::Full,
            TripStatus::Cancelled,
            TripStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<TripStatus>().unwrap(), status);
        }
        assert!("boarding".parse::<TripStatus>().is_err());
    }

    #[test]
    fn test_new_trip_starts_active_with_all_seats() {
        let trip = sample_trip();
        assert_eq!(trip.status, TripStatus::Active);
        assert_eq!(trip.available_seats, 4);
        assert_eq!(trip.booked_seats(), 0);
        assert_eq!(trip.route(), "New York → Boston");
    }

    #[test]
    fn test_query_matching_is_case_insensitive() {
        let trip = sample_trip();

        assert!(TripQuery::default().matches(&trip));
        assert!(TripQuery { q: Some("boston".into()), ..Default::default() }.matches(&trip));
        assert!(TripQuery { from: Some("NEW".into()), ..Default::default() }.matches(&trip));
        assert!(!TripQuery { to: Some("new york".into()), ..Default::default() }.matches(&trip));
        assert!(TripQuery { q: Some("  ".into()), ..Default::default() }.matches(&trip));
    }
}
