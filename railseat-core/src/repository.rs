use async_trait::async_trait;
use std::time::Duration;

use crate::models::{Booking, BookingSummary, Train, TrainId, TrainSeats, UserId};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Lock on train {train_id} not acquired within {waited:?}")]
    LockTimeout {
        train_id: TrainId,
        waited: Duration,
    },
    #[error("Unit of work already holds the lock on train {held}, refusing to lock train {requested}")]
    LockConflict {
        held: TrainId,
        requested: TrainId,
    },
    #[error("Constraint violated: {0}")]
    Constraint(String),
    #[error("Storage backend error: {0}")]
    Backend(#[source] BoxError),
}

impl StoreError {
    pub fn backend<E: Into<BoxError>>(err: E) -> Self {
        StoreError::Backend(err.into())
    }
}

/// Read access to train inventory rows.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Snapshot read of every train on a route. Never waits on row locks.
    async fn trains_on_route(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Vec<Train>, StoreError>;
}

/// Read access to committed bookings.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<BookingSummary>, StoreError>;
}

/// Opens atomic units of work against the store.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// One atomic unit of work.
///
/// Writes become visible to other observers only on `commit`, all together.
/// Dropping a unit of work without committing discards its writes and
/// releases any lock it holds.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Acquire the exclusive lock on one train row, waiting at most `timeout`.
    ///
    /// The lock is held until the unit of work ends. Returns `None` if the
    /// train does not exist. A unit of work holds at most one train lock.
    async fn lock_train(
        &mut self,
        train_id: TrainId,
        timeout: Duration,
    ) -> Result<Option<TrainSeats>, StoreError>;

    async fn find_booking_by_key(
        &mut self,
        user_id: UserId,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, StoreError>;

    /// Requires the lock on `train_id` to be held by this unit of work.
    async fn decrement_available(&mut self, train_id: TrainId, seats: i32) -> Result<(), StoreError>;

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// A backend that provides every storage capability the core needs.
pub trait Storage: InventoryStore + BookingLedger + TransactionalStore {}

impl<T> Storage for T where T: InventoryStore + BookingLedger + TransactionalStore {}
