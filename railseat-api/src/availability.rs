use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use railseat_core::models::AvailabilityReport;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/trains/availability", get(get_availability))
}

/// GET /v1/trains/availability?source=..&destination=..
/// Every train on the route with its current seat count. Does not lock.
async fn get_availability(
    State(state): State<AppState>,
    params: Result<Query<AvailabilityParams>, QueryRejection>,
) -> Result<Json<AvailabilityReport>, AppError> {
    let Query(params) = params.map_err(|e| AppError::ValidationError(e.body_text()))?;

    let report = state
        .availability
        .get_availability(&params.source, &params.destination)
        .await?;

    if report.trains.is_empty() {
        return Err(AppError::NotFoundError(
            "No trains available for the specified route".to_string(),
        ));
    }

    Ok(Json(report))
}
