use async_trait::async_trait;
use railseat_core::models::{Booking, Train, TrainId, TrainSeats, UserId};
use railseat_core::repository::{InventoryStore, StoreError, TransactionalStore, UnitOfWork};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::debug;

use crate::booking_repo;

const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Postgres-backed inventory and ledger.
#[derive(Clone)]
pub struct PostgresStore {
    pub pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new train with all of its seats available.
    pub async fn provision_train(
        &self,
        train_number: &str,
        source: &str,
        destination: &str,
        total_seats: i32,
    ) -> Result<Train, StoreError> {
        let row = sqlx::query_as::<_, TrainRow>(
            r#"
            INSERT INTO trains (train_number, source, destination, total_seats, available_seats)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, train_number, source, destination, total_seats, available_seats
            "#,
        )
        .bind(train_number)
        .bind(source)
        .bind(destination)
        .bind(total_seats)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.into())
    }

    pub async fn train(&self, train_id: TrainId) -> Result<Option<Train>, StoreError> {
        let row = sqlx::query_as::<_, TrainRow>(
            "SELECT id, train_number, source, destination, total_seats, available_seats FROM trains WHERE id = $1",
        )
        .bind(train_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(Train::from))
    }
}

#[derive(sqlx::FromRow)]
struct TrainRow {
    id: i64,
    train_number: String,
    source: String,
    destination: String,
    total_seats: i32,
    available_seats: i32,
}

impl From<TrainRow> for Train {
    fn from(row: TrainRow) -> Self {
        Train {
            id: TrainId(row.id),
            train_number: row.train_number,
            source: row.source,
            destination: row.destination,
            total_seats: row.total_seats,
            available_seats: row.available_seats,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LockedSeatsRow {
    total_seats: i32,
    available_seats: i32,
}

/// Map a driver error onto the storage taxonomy.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(
            db_err.kind(),
            sqlx::error::ErrorKind::CheckViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::NotNullViolation
        ) {
            return StoreError::Constraint(db_err.message().to_string());
        }
    }
    StoreError::backend(err)
}

fn lock_error(err: sqlx::Error, train_id: TrainId, waited: Duration) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE) {
            return StoreError::LockTimeout { train_id, waited };
        }
    }
    store_error(err)
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn trains_on_route(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Vec<Train>, StoreError> {
        // Plain MVCC read: never blocks on FOR UPDATE locks held by reservations.
        let rows = sqlx::query_as::<_, TrainRow>(
            r#"
            SELECT id, train_number, source, destination, total_seats, available_seats
            FROM trains
            WHERE source = $1 AND destination = $2
            ORDER BY id
            "#,
        )
        .bind(source)
        .bind(destination)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(Train::from).collect())
    }
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await.map_err(store_error)?;
        Ok(Box::new(PostgresUnitOfWork { tx, locked: None }))
    }
}

/// A database transaction. Dropping it without commit rolls it back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
    locked: Option<TrainId>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_train(
        &mut self,
        train_id: TrainId,
        timeout: Duration,
    ) -> Result<Option<TrainSeats>, StoreError> {
        if let Some(held) = self.locked {
            if held != train_id {
                return Err(StoreError::LockConflict { held, requested: train_id });
            }
        }

        // Scoped to this transaction only.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(lock_timeout_setting(timeout))
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

        let row = sqlx::query_as::<_, LockedSeatsRow>(
            "SELECT total_seats, available_seats FROM trains WHERE id = $1 FOR UPDATE",
        )
        .bind(train_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| lock_error(e, train_id, timeout))?;

        self.locked = Some(train_id);
        debug!("Locked train {} for update", train_id);

        Ok(row.map(|r| TrainSeats {
            train_id,
            total_seats: r.total_seats,
            available_seats: r.available_seats,
        }))
    }

    async fn find_booking_by_key(
        &mut self,
        user_id: UserId,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, StoreError> {
        booking_repo::find_by_key(&mut self.tx, user_id, idempotency_key).await
    }

    async fn decrement_available(&mut self, train_id: TrainId, seats: i32) -> Result<(), StoreError> {
        if self.locked != Some(train_id) {
            return Err(StoreError::Constraint(format!(
                "train {} must be locked before it is modified",
                train_id
            )));
        }

        let result = sqlx::query("UPDATE trains SET available_seats = available_seats - $1 WHERE id = $2")
            .bind(seats)
            .bind(train_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Constraint(format!("train {} does not exist", train_id)));
        }
        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        booking_repo::insert(&mut self.tx, booking).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(store_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(store_error)
    }
}

/// Postgres caps `lock_timeout` at `i32::MAX` milliseconds and treats 0 as
/// "wait forever", so the value is clamped into `1..=i32::MAX`.
fn lock_timeout_setting(timeout: Duration) -> String {
    let millis = timeout.as_millis().clamp(1, i32::MAX as u128);
    format!("{}ms", millis)
}
