//! HTTP handlers.
//!
//! Thin adapters: parse the request, call one service operation, map the
//! result. Malformed identifiers, bodies and query strings are rejected as
//! invalid arguments before any service is called.

pub mod orders;
pub mod payments;
pub mod reservations;
pub mod tickets;

use std::str::FromStr;

use crate::error::TicketingError;
use crate::server::AppError;

/// Parse a path or body identifier.
fn parse_id<T>(raw: &str) -> Result<T, AppError>
where
    T: FromStr<Err = TicketingError>,
{
    raw.parse().map_err(AppError::from)
}
