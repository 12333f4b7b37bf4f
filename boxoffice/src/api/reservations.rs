//! Reservation hold endpoints.
//!
//! - POST /api/tickets/:id/reservations - Hold tickets
//! - GET /api/reservations/:id - Get a reservation
//! - POST /api/reservations/:id/cancel - Release a hold
//! - POST /api/reservations/:id/confirm - Move a hold to sold
//!
//! # State Machine
//!
//! ```text
//! active → confirmed
//!    ↓ ↘
//! expired cancelled
//! ```

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::server::{AppError, AppState, JsonBody};
use crate::types::{Reservation, ReservationId, ReservationStatus, TicketId};

/// Request to hold tickets.
#[derive(Debug, Deserialize)]
pub struct ReserveTicketsRequest {
    /// Holder
    pub user_id: String,
    /// Quantity to hold
    pub quantity: u32,
}

/// Response after placing a hold.
#[derive(Debug, Serialize)]
pub struct ReserveTicketsResponse {
    /// Created reservation
    pub reservation_id: ReservationId,
    /// End of the hold window
    pub expires_at: DateTime<Utc>,
    /// Always `active`
    pub status: ReservationStatus,
}

/// Hold tickets of a ticket type.
///
/// # Errors
///
/// 400 for invalid input, 404 for an unknown ticket, 409 if capacity is short.
pub async fn reserve_tickets(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<ReserveTicketsRequest>,
) -> Result<(StatusCode, Json<ReserveTicketsResponse>), AppError> {
    let ticket_id: TicketId = parse_id(&id)?;
    let reservation = state
        .reservations
        .create_reservation(ticket_id, &request.user_id, request.quantity)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ReserveTicketsResponse {
            reservation_id: reservation.id,
            expires_at: reservation.expires_at,
            status: reservation.status,
        }),
    ))
}

/// Get a reservation.
///
/// # Errors
///
/// 400 for a malformed id, 404 if unknown.
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Reservation>, AppError> {
    let id: ReservationId = parse_id(&id)?;
    Ok(Json(state.reservations.get_reservation(id).await?))
}

/// Release a hold.
///
/// # Errors
///
/// 404 if unknown, 409 if already confirmed or expired.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Reservation>, AppError> {
    let id: ReservationId = parse_id(&id)?;
    Ok(Json(state.reservations.cancel_reservation(id).await?))
}

/// Confirm a hold (reserved → sold).
///
/// # Errors
///
/// 404 if unknown, 409 if the hold lapsed or was released.
pub async fn confirm_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Reservation>, AppError> {
    let id: ReservationId = parse_id(&id)?;
    Ok(Json(state.reservations.confirm_reservation(id).await?))
}
