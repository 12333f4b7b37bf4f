//! Pricing capability.
//!
//! The narrow interface the Order Orchestrator uses to obtain authoritative
//! unit prices. [`TicketCatalog`](crate::catalog::TicketCatalog) implements it
//! in production.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::types::{Price, TicketId};

/// Price lookup result
pub type PriceFuture<'a> = Pin<Box<dyn Future<Output = Result<Price>> + Send + 'a>>;

/// Pricing capability trait
///
/// Supplies the current unit price and currency for a ticket type.
pub trait PricingCapability: Send + Sync {
    /// Look up the price of one ticket of `ticket_id`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown ticket type, or any error of the
    /// underlying lookup
    fn get_price(&self, ticket_id: TicketId) -> PriceFuture<'_>;
}
