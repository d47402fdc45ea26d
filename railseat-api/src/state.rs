use std::sync::Arc;
use std::time::Duration;
use railseat_core::repository::Storage;
use railseat_core::{AvailabilityQuery, LedgerQuery, ReservationCoordinator};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: ReservationCoordinator,
    pub availability: AvailabilityQuery,
    pub ledger: LedgerQuery,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wire every core component to the same storage handle.
    pub fn from_store<S>(store: Arc<S>, lock_timeout: Duration, auth: AuthConfig) -> Self
    where
        S: Storage + 'static,
    {
        Self {
            reservations: ReservationCoordinator::new(store.clone(), lock_timeout),
            availability: AvailabilityQuery::new(store.clone()),
            ledger: LedgerQuery::new(store),
            auth,
        }
    }
}
