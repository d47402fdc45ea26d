use async_trait::async_trait;
use chrono::{DateTime, Utc};
use railseat_core::models::{Booking, BookingId, BookingSummary, TrainId, UserId};
use railseat_core::repository::{BookingLedger, StoreError};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::inventory_repo::{store_error, PostgresStore};

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    train_id: i64,
    user_id: i64,
    seats: i32,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: BookingId(row.id),
            train_id: TrainId(row.train_id),
            user_id: UserId(row.user_id),
            seats: row.seats,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingSummaryRow {
    booking_id: Uuid,
    seats: i32,
    train_number: String,
    source: String,
    destination: String,
}

pub(crate) async fn insert(
    tx: &mut Transaction<'static, Postgres>,
    booking: &Booking,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO bookings (id, train_id, user_id, seats, idempotency_key, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(booking.id.0)
    .bind(booking.train_id.0)
    .bind(booking.user_id.0)
    .bind(booking.seats)
    .bind(booking.idempotency_key.as_deref())
    .bind(booking.created_at)
    .execute(&mut **tx)
    .await
    .map_err(store_error)?;

    Ok(())
}

pub(crate) async fn find_by_key(
    tx: &mut Transaction<'static, Postgres>,
    user_id: UserId,
    idempotency_key: &str,
) -> Result<Option<Booking>, StoreError> {
    let row = sqlx::query_as::<_, BookingRow>(
        r#"
        SELECT id, train_id, user_id, seats, idempotency_key, created_at
        FROM bookings
        WHERE user_id = $1 AND idempotency_key = $2
        "#,
    )
    .bind(user_id.0)
    .bind(idempotency_key)
    .fetch_optional(&mut **tx)
    .await
    .map_err(store_error)?;

    Ok(row.map(Booking::from))
}

#[async_trait]
impl BookingLedger for PostgresStore {
    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<BookingSummary>, StoreError> {
        let rows = sqlx::query_as::<_, BookingSummaryRow>(
            r#"
            SELECT
                b.id AS booking_id,
                b.seats,
                t.train_number,
                t.source,
                t.destination
            FROM bookings b
            JOIN trains t ON b.train_id = t.id
            WHERE b.user_id = $1
            ORDER BY b.created_at, b.id
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows
            .into_iter()
            .map(|row| BookingSummary {
                booking_id: BookingId(row.booking_id),
                seats: row.seats,
                train_number: row.train_number,
                source: row.source,
                destination: row.destination,
            })
            .collect())
    }
}
