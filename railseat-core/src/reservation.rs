use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::models::{Booking, Reservation, ReservationOutcome, SeatRequest, TrainSeats};
use crate::repository::{TransactionalStore, UnitOfWork};
use crate::{CoreError, CoreResult};

const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Runs reservation transactions against a train's seat inventory.
///
/// Every attempt for the same train is serialized by that train's exclusive
/// lock; attempts for different trains never contend.
#[derive(Clone)]
pub struct ReservationCoordinator {
    store: Arc<dyn TransactionalStore>,
    lock_timeout: Duration,
}

impl ReservationCoordinator {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(store: Arc<dyn TransactionalStore>, lock_timeout: Duration) -> Self {
        Self { store, lock_timeout }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Reserve seats on one train for one user.
    ///
    /// Dropping the returned future before it resolves drops the unit of
    /// work with it, so an abandoned request commits nothing.
    pub async fn reserve_seats(&self, request: SeatRequest) -> CoreResult<Reservation> {
        validate(&request)?;
        self.run_transaction(request).await
    }

    #[instrument(
        name = "reservation",
        skip(self, request),
        fields(train_id = %request.train_id, user_id = %request.user_id, seats = request.seats)
    )]
    async fn run_transaction(&self, request: SeatRequest) -> CoreResult<Reservation> {
        let mut unit = self.store.begin().await?;

        match apply(unit.as_mut(), &request, self.lock_timeout).await {
            Ok(reservation) => {
                unit.commit().await.map_err(|e| {
                    error!("Commit failed, transaction rolled back: {}", e);
                    CoreError::from(e)
                })?;

                match reservation.outcome {
                    ReservationOutcome::Created => info!(
                        booking_id = %reservation.booking.id,
                        "Booking confirmed"
                    ),
                    ReservationOutcome::Replayed => info!(
                        booking_id = %reservation.booking.id,
                        "Idempotent retry, returning existing booking"
                    ),
                }
                Ok(reservation)
            }
            Err(err) => {
                if let Err(rollback_err) = unit.rollback().await {
                    error!("Rollback failed after {}: {}", err, rollback_err);
                }

                match &err {
                    CoreError::InsufficientSeats { .. } | CoreError::NotFound(_) => {
                        warn!("Reservation rejected: {}", err)
                    }
                    CoreError::Timeout { .. } => warn!("Reservation timed out: {}", err),
                    CoreError::StorageFailure(_) => error!("Reservation aborted: {}", err),
                    CoreError::ValidationError(_) => warn!("Reservation refused: {}", err),
                }
                Err(err)
            }
        }
    }
}

/// The locked read-decide-write sequence. Anything returned as `Err` is
/// rolled back by the caller.
async fn apply(
    unit: &mut dyn UnitOfWork,
    request: &SeatRequest,
    lock_timeout: Duration,
) -> CoreResult<Reservation> {
    // 1. Exclusive lock on the train row, held until the unit of work ends
    let seats = unit
        .lock_train(request.train_id, lock_timeout)
        .await?
        .ok_or(CoreError::NotFound(request.train_id))?;

    // 2. A retried request returns what the first attempt committed
    if let Some(key) = request.idempotency_key.as_deref() {
        if let Some(existing) = unit.find_booking_by_key(request.user_id, key).await? {
            return replay(existing, request);
        }
    }

    // 3. Capacity check under the lock
    check_capacity(&seats, request.seats)?;

    // 4. Decrement and ledger entry, committed together
    let booking = Booking::new(
        request.train_id,
        request.user_id,
        request.seats,
        request.idempotency_key.clone(),
    );
    unit.decrement_available(request.train_id, request.seats).await?;
    unit.insert_booking(&booking).await?;

    Ok(Reservation {
        booking,
        outcome: ReservationOutcome::Created,
    })
}

fn check_capacity(seats: &TrainSeats, requested: i32) -> CoreResult<()> {
    if seats.available_seats < requested {
        return Err(CoreError::InsufficientSeats {
            train_id: seats.train_id,
            requested,
            available: seats.available_seats,
        });
    }
    Ok(())
}

fn replay(existing: Booking, request: &SeatRequest) -> CoreResult<Reservation> {
    if existing.train_id != request.train_id || existing.seats != request.seats {
        return Err(CoreError::ValidationError(format!(
            "Idempotency key was already used for booking {} with a different request",
            existing.id
        )));
    }

    Ok(Reservation {
        booking: existing,
        outcome: ReservationOutcome::Replayed,
    })
}

fn validate(request: &SeatRequest) -> CoreResult<()> {
    if request.seats <= 0 {
        return Err(CoreError::ValidationError(format!(
            "Seats to book must be a positive integer, got {}",
            request.seats
        )));
    }
    if request.train_id.0 <= 0 {
        return Err(CoreError::ValidationError(format!(
            "Invalid train id {}",
            request.train_id
        )));
    }
    if request.user_id.0 <= 0 {
        return Err(CoreError::ValidationError(format!(
            "Invalid user id {}",
            request.user_id
        )));
    }
    if let Some(key) = request.idempotency_key.as_deref() {
        let well_formed = !key.is_empty()
            && key.len() <= MAX_IDEMPOTENCY_KEY_LEN
            && key.bytes().all(|b| b.is_ascii_graphic());
        if !well_formed {
            return Err(CoreError::ValidationError(format!(
                "Idempotency key must be 1 to {} visible ASCII characters",
                MAX_IDEMPOTENCY_KEY_LEN
            )));
        }
    }
    Ok(())
}
