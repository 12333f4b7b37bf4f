//! Ticket catalog and availability endpoints.
//!
//! - POST /api/tickets - Define a ticket type with its inventory
//! - GET /api/tickets?event_id= - List ticket types
//! - GET /api/tickets/:id - Get a ticket type
//! - GET /api/tickets/:id/availability?quantity= - Check availability

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use super::parse_id;
use crate::catalog::NewTicket;
use crate::error::TicketingError;
use crate::ledger::Availability;
use crate::server::{AppError, AppState, JsonBody, QueryParams};
use crate::types::{Page, Ticket, TicketFilter, TicketId};

/// Query parameters for listing ticket types.
#[derive(Debug, Default, Deserialize)]
pub struct ListTicketsQuery {
    /// Event filter
    pub event_id: Option<String>,
    /// Catalog status filter
    pub status: Option<String>,
    /// Page number (1-based)
    pub page: Option<u32>,
    /// Page size
    pub page_size: Option<u32>,
}

/// Query parameters for an availability check.
#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQuery {
    /// Quantity wanted (defaults to 1)
    pub quantity: Option<u32>,
}

/// Define a ticket type.
///
/// # Errors
///
/// 400 for invalid fields.
pub async fn create_ticket(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<NewTicket>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let ticket = state.catalog.create_ticket(request).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// List ticket types, newest first.
///
/// # Errors
///
/// 400 for a malformed `event_id`.
pub async fn list_tickets(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListTicketsQuery>,
) -> Result<Json<Page<Ticket>>, AppError> {
    let event_id = query
        .event_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| {
            Uuid::parse_str(raw.trim()).map_err(|_| {
                TicketingError::InvalidArgument(format!("event_id '{raw}' is not a valid UUID"))
            })
        })
        .transpose()?;
    let filter = TicketFilter {
        event_id,
        status: query.status.filter(|s| !s.trim().is_empty()),
    };
    let page = state
        .catalog
        .list_tickets(filter, query.page, query.page_size)
        .await?;
    Ok(Json(page))
}

/// Get a ticket type.
///
/// # Errors
///
/// 400 for a malformed id, 404 if unknown.
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, AppError> {
    let ticket_id: TicketId = parse_id(&id)?;
    Ok(Json(state.catalog.get_ticket(ticket_id).await?))
}

/// Check whether `quantity` tickets are available right now.
///
/// # Errors
///
/// 400 for a malformed id or zero quantity, 404 if unknown.
pub async fn check_availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<AvailabilityQuery>,
) -> Result<Json<Availability>, AppError> {
    let ticket_id: TicketId = parse_id(&id)?;
    let availability = state
        .ledger
        .check_availability(ticket_id, query.quantity.unwrap_or(1))
        .await?;
    Ok(Json(availability))
}
