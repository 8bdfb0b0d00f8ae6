use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use roadbuddy_core::payment::PaymentMethodType;
use roadbuddy_core::repository::{PaymentMethodRepository, StoreResult, TransactionRepository};
use roadbuddy_core::{PaymentMethod, PaymentTransaction, TransactionStatus};
use roadbuddy_shared::Masked;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

pub struct StoreTransactionRepository {
    pool: PgPool,
}

impl StoreTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    booking_id: Uuid,
    trip_id: Uuid,
    amount: Decimal,
    currency: String,
    status: String,
    payment_method_id: Option<Uuid>,
    provider_reference: Option<String>,
    failure_reason: Option<String>,
    refunded_amount: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = roadbuddy_core::repository::StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(PaymentTransaction {
            id: row.id,
            booking_id: row.booking_id,
            trip_id: row.trip_id,
            amount: row.amount,
            currency: row.currency,
            status: row.status.parse::<TransactionStatus>()?,
            payment_method_id: row.payment_method_id,
            provider_reference: row.provider_reference,
            failure_reason: row.failure_reason,
            refunded_amount: row.refunded_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl TransactionRepository for StoreTransactionRepository {
    async fn create_transaction(&self, tx: &PaymentTransaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (id, booking_id, trip_id, amount, currency, status, payment_method_id,
                                              provider_reference, failure_reason, refunded_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(tx.id)
        .bind(tx.booking_id)
        .bind(tx.trip_id)
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(tx.status.as_str())
        .bind(tx.payment_method_id)
        .bind(&tx.provider_reference)
        .bind(&tx.failure_reason)
        .bind(tx.refunded_amount)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, booking_id, trip_id, amount, currency, status, payment_method_id, provider_reference,
                   failure_reason, refunded_amount, created_at, updated_at
            FROM payment_transactions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn update_transaction(&self, tx: &PaymentTransaction) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = $2, provider_reference = $3, failure_reason = $4, refunded_amount = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(tx.id)
        .bind(tx.status.as_str())
        .bind(&tx.provider_reference)
        .bind(&tx.failure_reason)
        .bind(tx.refunded_amount)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(format!("Transaction not found: {}", tx.id).into());
        }
        Ok(())
    }
}

pub struct StorePaymentMethodRepository {
    pool: PgPool,
}

impl StorePaymentMethodRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MethodRow {
    id: Uuid,
    user_id: String,
    method_type: String,
    masked_identifier: String,
    expiry: Option<NaiveDate>,
    is_default: bool,
    token: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MethodRow> for PaymentMethod {
    type Error = roadbuddy_core::repository::StoreError;

    fn try_from(row: MethodRow) -> Result<Self, Self::Error> {
        Ok(PaymentMethod {
            id: row.id,
            user_id: row.user_id,
            method_type: row.method_type.parse::<PaymentMethodType>()?,
            masked_identifier: row.masked_identifier,
            expiry: row.expiry,
            is_default: row.is_default,
            token: Masked(row.token),
            created_at: row.created_at,
        })
    }
}

const METHOD_COLUMNS: &str = "id, user_id, method_type, masked_identifier, expiry, is_default, token, created_at";

#[async_trait]
impl PaymentMethodRepository for StorePaymentMethodRepository {
    async fn get_method(&self, id: Uuid) -> StoreResult<Option<PaymentMethod>> {
        let row = sqlx::query_as::<_, MethodRow>(&format!("SELECT {} FROM payment_methods WHERE id = $1", METHOD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PaymentMethod::try_from).transpose()
    }

    async fn list_methods(&self, user_id: &str) -> StoreResult<Vec<PaymentMethod>> {
        let rows = sqlx::query_as::<_, MethodRow>(&format!(
            "SELECT {} FROM payment_methods WHERE user_id = $1 ORDER BY created_at",
            METHOD_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PaymentMethod::try_from).collect()
    }

    async fn replace_methods(&self, user_id: &str, methods: &[PaymentMethod]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM payment_methods WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for method in methods {
            sqlx::query(
                r#"
                INSERT INTO payment_methods (id, user_id, method_type, masked_identifier, expiry, is_default, token, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(method.id)
            .bind(user_id)
            .bind(method.method_type.as_str())
            .bind(&method.masked_identifier)
            .bind(method.expiry)
            .bind(method.is_default)
            .bind(method.token.expose())
            .bind(method.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
