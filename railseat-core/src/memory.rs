use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::models::{Booking, BookingSummary, Train, TrainId, TrainSeats, UserId};
use crate::repository::{BookingLedger, InventoryStore, StoreError, TransactionalStore, UnitOfWork};

/// In-process storage backend.
///
/// Each train has its own exclusive lock; committed state lives behind a
/// single `RwLock` that is only write-locked for the instant a unit of work
/// applies its staged writes, so readers never wait on an in-flight
/// reservation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: RwLock<MemoryState>,
    locks: DashMap<TrainId, Arc<Mutex<()>>>,
    next_train_id: AtomicI64,
}

#[derive(Default)]
struct MemoryState {
    trains: BTreeMap<TrainId, Train>,
    bookings: Vec<Booking>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new train with all of its seats available.
    pub async fn provision_train(
        &self,
        train_number: &str,
        source: &str,
        destination: &str,
        total_seats: i32,
    ) -> Result<Train, StoreError> {
        if total_seats < 0 {
            return Err(StoreError::Constraint(format!(
                "total_seats must not be negative, got {}",
                total_seats
            )));
        }

        let id = TrainId(self.inner.next_train_id.fetch_add(1, Ordering::SeqCst) + 1);
        let train = Train {
            id,
            train_number: train_number.to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            total_seats,
            available_seats: total_seats,
        };

        self.inner.locks.insert(id, Arc::new(Mutex::new(())));
        self.inner.state.write().await.trains.insert(id, train.clone());
        tracing::debug!("Provisioned train {} ({}) with {} seats", id, train_number, total_seats);
        Ok(train)
    }

    pub async fn train(&self, train_id: TrainId) -> Option<Train> {
        self.inner.state.read().await.trains.get(&train_id).cloned()
    }

    /// Committed bookings in commit order.
    pub async fn bookings(&self) -> Vec<Booking> {
        self.inner.state.read().await.bookings.clone()
    }
}

impl Inner {
    /// Lock entries exist only for provisioned trains.
    fn lock_for(&self, train_id: TrainId) -> Option<Arc<Mutex<()>>> {
        // Clone out of the map so no shard guard is held across an await.
        self.locks.get(&train_id).map(|lock| lock.clone())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn trains_on_route(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Vec<Train>, StoreError> {
        let state = self.inner.state.read().await;
        Ok(state
            .trains
            .values()
            .filter(|t| t.source == source && t.destination == destination)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BookingLedger for MemoryStore {
    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<BookingSummary>, StoreError> {
        let state = self.inner.state.read().await;
        let mut summaries = Vec::new();

        for booking in state.bookings.iter().filter(|b| b.user_id == user_id) {
            let train = state.trains.get(&booking.train_id).ok_or_else(|| {
                StoreError::Constraint(format!(
                    "booking {} references missing train {}",
                    booking.id, booking.train_id
                ))
            })?;

            summaries.push(BookingSummary {
                booking_id: booking.id,
                seats: booking.seats,
                train_number: train.train_number.clone(),
                source: train.source.clone(),
                destination: train.destination.clone(),
            });
        }

        Ok(summaries)
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnit {
            inner: self.inner.clone(),
            held: None,
            decrements: Vec::new(),
            inserts: Vec::new(),
        }))
    }
}

struct MemoryUnit {
    inner: Arc<Inner>,
    held: Option<(TrainId, OwnedMutexGuard<()>)>,
    decrements: Vec<(TrainId, i32)>,
    inserts: Vec<Booking>,
}

impl MemoryUnit {
    fn pending_decrement(&self, train_id: TrainId) -> i32 {
        self.decrements
            .iter()
            .filter(|(id, _)| *id == train_id)
            .map(|(_, seats)| seats)
            .sum()
    }

    /// Committed row plus this unit's own staged writes.
    async fn view(&self, train_id: TrainId) -> Option<TrainSeats> {
        let state = self.inner.state.read().await;
        state.trains.get(&train_id).map(|t| TrainSeats {
            train_id,
            total_seats: t.total_seats,
            available_seats: t.available_seats - self.pending_decrement(train_id),
        })
    }
}

fn key_taken<'a>(
    mut bookings: impl Iterator<Item = &'a Booking>,
    user_id: UserId,
    key: &str,
) -> bool {
    bookings.any(|b| b.user_id == user_id && b.idempotency_key.as_deref() == Some(key))
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_train(
        &mut self,
        train_id: TrainId,
        timeout: Duration,
    ) -> Result<Option<TrainSeats>, StoreError> {
        if let Some((held, _)) = &self.held {
            if *held != train_id {
                return Err(StoreError::LockConflict { held: *held, requested: train_id });
            }
            return Ok(self.view(train_id).await);
        }

        let Some(lock) = self.inner.lock_for(train_id) else {
            return Ok(None);
        };
        let guard = tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout { train_id, waited: timeout })?;

        self.held = Some((train_id, guard));
        Ok(self.view(train_id).await)
    }

    async fn find_booking_by_key(
        &mut self,
        user_id: UserId,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, StoreError> {
        let matches = |b: &&Booking| {
            b.user_id == user_id && b.idempotency_key.as_deref() == Some(idempotency_key)
        };

        if let Some(staged) = self.inserts.iter().find(matches) {
            return Ok(Some(staged.clone()));
        }

        let state = self.inner.state.read().await;
        Ok(state.bookings.iter().find(matches).cloned())
    }

    async fn decrement_available(&mut self, train_id: TrainId, seats: i32) -> Result<(), StoreError> {
        match &self.held {
            Some((held, _)) if *held == train_id => {}
            _ => {
                return Err(StoreError::Constraint(format!(
                    "train {} must be locked before it is modified",
                    train_id
                )))
            }
        }

        let current = self
            .view(train_id)
            .await
            .ok_or_else(|| StoreError::Constraint(format!("train {} does not exist", train_id)))?;

        let remaining = current.available_seats - seats;
        if seats <= 0 || remaining < 0 || remaining > current.total_seats {
            return Err(StoreError::Constraint(format!(
                "available_seats of train {} must stay within 0..={}, got {}",
                train_id, current.total_seats, remaining
            )));
        }

        self.decrements.push((train_id, seats));
        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        if booking.seats <= 0 {
            return Err(StoreError::Constraint(format!(
                "booking seats must be positive, got {}",
                booking.seats
            )));
        }

        let state = self.inner.state.read().await;
        if !state.trains.contains_key(&booking.train_id) {
            return Err(StoreError::Constraint(format!(
                "booking references missing train {}",
                booking.train_id
            )));
        }

        if let Some(key) = booking.idempotency_key.as_deref() {
            if key_taken(state.bookings.iter().chain(self.inserts.iter()), booking.user_id, key) {
                return Err(StoreError::Constraint(format!(
                    "idempotency key already used by user {}",
                    booking.user_id
                )));
            }
        }
        drop(state);

        self.inserts.push(booking.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let unit = *self;
        let mut state = unit.inner.state.write().await;

        // Validate everything against committed state first so a failure
        // leaves nothing applied.
        let mut totals: HashMap<TrainId, i32> = HashMap::new();
        for (train_id, seats) in &unit.decrements {
            *totals.entry(*train_id).or_default() += seats;
        }
        for (train_id, seats) in &totals {
            let train = state.trains.get(train_id).ok_or_else(|| {
                StoreError::Constraint(format!("train {} does not exist", train_id))
            })?;
            if train.available_seats - seats < 0 {
                return Err(StoreError::Constraint(format!(
                    "available_seats of train {} would become negative",
                    train_id
                )));
            }
        }
        for (i, booking) in unit.inserts.iter().enumerate() {
            if !state.trains.contains_key(&booking.train_id) {
                return Err(StoreError::Constraint(format!(
                    "booking references missing train {}",
                    booking.train_id
                )));
            }
            if let Some(key) = booking.idempotency_key.as_deref() {
                if key_taken(state.bookings.iter().chain(unit.inserts[..i].iter()), booking.user_id, key) {
                    return Err(StoreError::Constraint(format!(
                        "idempotency key already used by user {}",
                        booking.user_id
                    )));
                }
            }
        }

        for (train_id, seats) in totals {
            if let Some(train) = state.trains.get_mut(&train_id) {
                train.available_seats -= seats;
            }
        }
        state.bookings.extend(unit.inserts);

        // Lock guard drops with `unit` after the state write lock is released.
        drop(state);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
