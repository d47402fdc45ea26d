use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainId(pub i64);

impl fmt::Display for TrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity resolved by the external identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub Uuid);

impl BookingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inventory row for one train.
///
/// `total_seats` is fixed at provisioning time; `available_seats` only ever
/// moves down, and only through a reservation transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Train {
    pub id: TrainId,
    pub train_number: String,
    pub source: String,
    pub destination: String,
    pub total_seats: i32,
    pub available_seats: i32,
}

/// Seat counts of a train as seen by the unit of work holding its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainSeats {
    pub train_id: TrainId,
    pub total_seats: i32,
    pub available_seats: i32,
}

/// A confirmed allocation of seats on one train to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub train_id: TrainId,
    pub user_id: UserId,
    pub seats: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(train_id: TrainId, user_id: UserId, seats: i32, idempotency_key: Option<String>) -> Self {
        Self {
            id: BookingId::new(),
            train_id,
            user_id,
            seats,
            idempotency_key,
            created_at: Utc::now(),
        }
    }
}

/// Ledger row joined with its train, as listed back to the booking user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub booking_id: BookingId,
    pub seats: i32,
    pub train_number: String,
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainAvailability {
    pub train_id: TrainId,
    pub train_number: String,
    pub available_seats: i32,
}

/// Every train on a route, with a derived count of those that still have seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub available: bool,
    pub available_train_count: usize,
    pub trains: Vec<TrainAvailability>,
}

impl AvailabilityReport {
    pub fn from_trains(trains: Vec<Train>) -> Self {
        let trains: Vec<TrainAvailability> = trains
            .into_iter()
            .map(|train| TrainAvailability {
                train_id: train.id,
                train_number: train.train_number,
                available_seats: train.available_seats,
            })
            .collect();

        let available_train_count = trains.iter().filter(|t| t.available_seats > 0).count();

        Self {
            available: available_train_count > 0,
            available_train_count,
            trains,
        }
    }
}

/// Input to a reservation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatRequest {
    pub train_id: TrainId,
    pub seats: i32,
    pub user_id: UserId,
    /// Caller-supplied key; retries carrying the same key return the original booking.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOutcome {
    Created,
    Replayed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub booking: Booking,
    pub outcome: ReservationOutcome,
}
