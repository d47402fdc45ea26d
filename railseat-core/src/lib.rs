pub mod models;
pub mod repository;
pub mod reservation;
pub mod availability;
pub mod ledger;
pub mod memory;

use std::time::Duration;

use models::TrainId;
use repository::StoreError;

pub use availability::AvailabilityQuery;
pub use ledger::LedgerQuery;
pub use memory::MemoryStore;
pub use reservation::ReservationCoordinator;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Train not found: {0}")]
    NotFound(TrainId),
    #[error("Not enough seats available on train {train_id}: requested {requested}, available {available}")]
    InsufficientSeats {
        train_id: TrainId,
        requested: i32,
        available: i32,
    },
    #[error("Timed out after {waited:?} waiting for the inventory lock on train {train_id}")]
    Timeout {
        train_id: TrainId,
        waited: Duration,
    },
    #[error("Storage failure: {0}")]
    StorageFailure(#[source] StoreError),
}

impl CoreError {
    /// Stable machine-readable name of the error class, surfaced to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::ValidationError(_) => "validation",
            CoreError::NotFound(_) => "not_found",
            CoreError::InsufficientSeats { .. } => "insufficient_seats",
            CoreError::Timeout { .. } => "timeout",
            CoreError::StorageFailure(_) => "storage_failure",
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout { train_id, waited } => CoreError::Timeout { train_id, waited },
            other => CoreError::StorageFailure(other),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
