use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roadbuddy_core::repository::{ObligationRepository, StoreResult};
use roadbuddy_core::{Obligation, ObligationKind};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

pub struct StoreObligationRepository {
    pool: PgPool,
}

impl StoreObligationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ObligationRow {
    id: Uuid,
    kind: String,
    booking_id: Uuid,
    trip_id: Uuid,
    transaction_id: Option<Uuid>,
    amount: Option<Decimal>,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<ObligationRow> for Obligation {
    type Error = roadbuddy_core::repository::StoreError;

    fn try_from(row: ObligationRow) -> Result<Self, Self::Error> {
        Ok(Obligation {
            id: row.id,
            kind: row.kind.parse::<ObligationKind>()?,
            booking_id: row.booking_id,
            trip_id: row.trip_id,
            transaction_id: row.transaction_id,
            amount: row.amount,
            attempts: u32::try_from(row.attempts)?,
            last_error: row.last_error,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

#[async_trait]
impl ObligationRepository for StoreObligationRepository {
    async fn record_obligation(&self, obligation: &Obligation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO obligations (id, kind, booking_id, trip_id, transaction_id, amount, attempts, last_error,
                                     created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(obligation.id)
        .bind(obligation.kind.as_str())
        .bind(obligation.booking_id)
        .bind(obligation.trip_id)
        .bind(obligation.transaction_id)
        .bind(obligation.amount)
        .bind(i32::try_from(obligation.attempts)?)
        .bind(&obligation.last_error)
        .bind(obligation.created_at)
        .bind(obligation.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_open_obligations(&self) -> StoreResult<Vec<Obligation>> {
        let rows = sqlx::query_as::<_, ObligationRow>(
            r#"
            SELECT id, kind, booking_id, trip_id, transaction_id, amount, attempts, last_error, created_at, resolved_at
            FROM obligations WHERE resolved_at IS NULL ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Obligation::try_from).collect()
    }

    async fn update_obligation(&self, obligation: &Obligation) -> StoreResult<()> {
        sqlx::query("UPDATE obligations SET attempts = $2, last_error = $3, resolved_at = $4 WHERE id = $1")
            .bind(obligation.id)
            .bind(i32::try_from(obligation.attempts)?)
            .bind(&obligation.last_error)
            .bind(obligation.resolved_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
