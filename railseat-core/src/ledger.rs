use std::sync::Arc;
use tracing::instrument;

use crate::models::{BookingSummary, UserId};
use crate::repository::BookingLedger;
use crate::{CoreError, CoreResult};

#[derive(Clone)]
pub struct LedgerQuery {
    ledger: Arc<dyn BookingLedger>,
}

impl LedgerQuery {
    pub fn new(ledger: Arc<dyn BookingLedger>) -> Self {
        Self { ledger }
    }

    /// Committed bookings of one user, joined with their trains.
    #[instrument(skip(self))]
    pub async fn list_bookings_for_user(&self, user_id: UserId) -> CoreResult<Vec<BookingSummary>> {
        if user_id.0 <= 0 {
            return Err(CoreError::ValidationError(format!("Invalid user id {}", user_id)));
        }
        Ok(self.ledger.bookings_for_user(user_id).await?)
    }
}
