use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roadbuddy_core::repository::{StoreResult, TripRepository};
use roadbuddy_core::{SeatHold, Trip, TripStatus};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

pub struct StoreTripRepository {
    pool: PgPool,
}

impl StoreTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    driver_id: String,
    driver_name: String,
    departure_city: String,
    destination_city: String,
    departure_time: DateTime<Utc>,
    price_per_seat: Decimal,
    total_seats: i32,
    available_seats: i32,
    status: String,
    estimated_duration: Option<String>,
    car_model: Option<String>,
    amenities: Vec<String>,
    pickup_points: Vec<String>,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = roadbuddy_core::repository::StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        Ok(Trip {
            id: row.id,
            driver_id: row.driver_id,
            driver_name: row.driver_name,
            departure_city: row.departure_city,
            destination_city: row.destination_city,
            departure_time: row.departure_time,
            price_per_seat: row.price_per_seat,
            total_seats: u32::try_from(row.total_seats)?,
            available_seats: u32::try_from(row.available_seats)?,
            status: row.status.parse::<TripStatus>()?,
            estimated_duration: row.estimated_duration,
            car_model: row.car_model,
            amenities: row.amenities,
            pickup_points: row.pickup_points,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    booking_id: Uuid,
    trip_id: Uuid,
    seat_count: i32,
    held_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
}

impl TryFrom<HoldRow> for SeatHold {
    type Error = roadbuddy_core::repository::StoreError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        Ok(SeatHold {
            booking_id: row.booking_id,
            trip_id: row.trip_id,
            seat_count: u32::try_from(row.seat_count)?,
            held_at: row.held_at,
            released_at: row.released_at,
        })
    }
}

const TRIP_COLUMNS: &str = "id, driver_id, driver_name, departure_city, destination_city, departure_time, \
     price_per_seat, total_seats, available_seats, status, estimated_duration, car_model, amenities, \
     pickup_points, description, created_at, updated_at";

#[async_trait]
impl TripRepository for StoreTripRepository {
    async fn create_trip(&self, trip: &Trip) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trips (id, driver_id, driver_name, departure_city, destination_city, departure_time,
                               price_per_seat, total_seats, available_seats, status, estimated_duration, car_model,
                               amenities, pickup_points, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(trip.id)
        .bind(&trip.driver_id)
        .bind(&trip.driver_name)
        .bind(&trip.departure_city)
        .bind(&trip.destination_city)
        .bind(trip.departure_time)
        .bind(trip.price_per_seat)
        .bind(i32::try_from(trip.total_seats)?)
        .bind(i32::try_from(trip.available_seats)?)
        .bind(trip.status.as_str())
        .bind(&trip.estimated_duration)
        .bind(&trip.car_model)
        .bind(&trip.amenities)
        .bind(&trip.pickup_points)
        .bind(&trip.description)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Trip::try_from).transpose()
    }

    async fn list_trips(&self) -> StoreResult<Vec<Trip>> {
        let rows = sqlx::query_as::<_, TripRow>(&format!("SELECT {} FROM trips ORDER BY departure_time", TRIP_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Trip::try_from).collect()
    }

    async fn update_trip_status(&self, id: Uuid, status: TripStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE trips SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(format!("Trip not found: {}", id).into());
        }
        Ok(())
    }

    async fn apply_hold(&self, trip_id: Uuid, available_seats: u32, hold: &SeatHold) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO seat_holds (booking_id, trip_id, seat_count, held_at, released_at) VALUES ($1, $2, $3, $4, NULL)",
        )
        .bind(hold.booking_id)
        .bind(trip_id)
        .bind(i32::try_from(hold.seat_count)?)
        .bind(hold.held_at)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("UPDATE trips SET available_seats = $2, updated_at = NOW() WHERE id = $1")
            .bind(trip_id)
            .bind(i32::try_from(available_seats)?)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(format!("Trip not found: {}", trip_id).into());
        }

        tx.commit().await?;
        Ok(())
    }

    async fn apply_release(
        &self,
        trip_id: Uuid,
        available_seats: u32,
        booking_id: Uuid,
        released_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let released = sqlx::query(
            "UPDATE seat_holds SET released_at = $3 WHERE booking_id = $1 AND trip_id = $2 AND released_at IS NULL",
        )
        .bind(booking_id)
        .bind(trip_id)
        .bind(released_at)
        .execute(&mut *tx)
        .await?;
        if released.rows_affected() == 0 {
            return Err(format!("No open hold for booking {}", booking_id).into());
        }

        sqlx::query("UPDATE trips SET available_seats = $2, updated_at = NOW() WHERE id = $1")
            .bind(trip_id)
            .bind(i32::try_from(available_seats)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_hold(&self, booking_id: Uuid) -> StoreResult<Option<SeatHold>> {
        let row = sqlx::query_as::<_, HoldRow>(
            "SELECT booking_id, trip_id, seat_count, held_at, released_at FROM seat_holds WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SeatHold::try_from).transpose()
    }
}
