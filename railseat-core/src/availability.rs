use std::sync::Arc;
use tracing::{debug, instrument};

use crate::models::AvailabilityReport;
use crate::repository::InventoryStore;
use crate::{CoreError, CoreResult};

/// Lock-free view of seat counts on a route.
///
/// Results are a snapshot; only a reservation transaction can confirm that
/// the seats are still there.
#[derive(Clone)]
pub struct AvailabilityQuery {
    store: Arc<dyn InventoryStore>,
}

impl AvailabilityQuery {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn get_availability(&self, source: &str, destination: &str) -> CoreResult<AvailabilityReport> {
        let source = source.trim();
        let destination = destination.trim();
        if source.is_empty() || destination.is_empty() {
            return Err(CoreError::ValidationError(
                "Source and destination are required".to_string(),
            ));
        }

        let mut trains = self.store.trains_on_route(source, destination).await?;
        trains.sort_by_key(|t| t.id);

        let report = AvailabilityReport::from_trains(trains);
        debug!(
            trains = report.trains.len(),
            with_seats = report.available_train_count,
            "Availability computed"
        );
        Ok(report)
    }
}
