use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roadbuddy_core::repository::{BookingRepository, StoreResult};
use roadbuddy_core::{Booking, BookingStatus};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    trip_id: Uuid,
    rider_id: String,
    seat_count: i32,
    total_price: Decimal,
    currency: String,
    status: String,
    transaction_id: Option<Uuid>,
    pickup: Option<String>,
    dropoff: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = roadbuddy_core::repository::StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            trip_id: row.trip_id,
            rider_id: row.rider_id,
            seat_count: u32::try_from(row.seat_count)?,
            total_price: row.total_price,
            currency: row.currency,
            status: row.status.parse::<BookingStatus>()?,
            transaction_id: row.transaction_id,
            pickup: row.pickup,
            dropoff: row.dropoff,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, trip_id, rider_id, seat_count, total_price, currency, status, transaction_id, \
     pickup, dropoff, created_at, updated_at";

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn create_booking(&self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, trip_id, rider_id, seat_count, total_price, currency, status, transaction_id,
                                  pickup, dropoff, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(booking.id)
        .bind(booking.trip_id)
        .bind(&booking.rider_id)
        .bind(i32::try_from(booking.seat_count)?)
        .bind(booking.total_price)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.transaction_id)
        .bind(&booking.pickup)
        .bind(&booking.dropoff)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn update_booking(&self, booking: &Booking) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE bookings SET status = $2, transaction_id = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(booking.transaction_id)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(format!("Booking not found: {}", booking.id).into());
        }
        Ok(())
    }

    async fn list_bookings_for_rider(&self, rider_id: &str) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE rider_id = $1 ORDER BY created_at",
            BOOKING_COLUMNS
        ))
        .bind(rider_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn list_bookings_for_trip(&self, trip_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE trip_id = $1 ORDER BY created_at",
            BOOKING_COLUMNS
        ))
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}
