use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Extension, Json, Router,
};
use railseat_core::models::{Booking, BookingSummary, ReservationOutcome, SeatRequest, TrainId};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, AuthenticatedUser};
use crate::state::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSeatsRequest {
    pub train_id: i64,
    pub seats_to_book: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub message: String,
    pub replayed: bool,
    pub booking: Booking,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(book_seats).get(list_bookings))
        .route_layer(axum::middleware::from_fn_with_state(state, customer_auth_middleware))
}

/// POST /v1/bookings
/// Reserve seats on a train for the authenticated user
async fn book_seats(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    payload: Result<Json<BookSeatsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;

    let idempotency_key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AppError::ValidationError("Idempotency-Key must be ASCII".to_string()))?
                .to_string(),
        ),
        None => None,
    };

    let reservation = state
        .reservations
        .reserve_seats(SeatRequest {
            train_id: TrainId(req.train_id),
            seats: req.seats_to_book,
            user_id,
            idempotency_key,
        })
        .await?;

    let (status, replayed) = match reservation.outcome {
        ReservationOutcome::Created => (StatusCode::CREATED, false),
        ReservationOutcome::Replayed => (StatusCode::OK, true),
    };

    Ok((
        status,
        Json(BookingResponse {
            message: "Seats booked successfully".to_string(),
            replayed,
            booking: reservation.booking,
        }),
    ))
}

/// GET /v1/bookings
/// Bookings of the authenticated user
async fn list_bookings(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<BookingSummary>>, AppError> {
    let bookings = state.ledger.list_bookings_for_user(user_id).await?;
    Ok(Json(bookings))
}
