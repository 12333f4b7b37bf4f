//! Table-driven pricing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::lock;
use crate::error::TicketingError;
use crate::pricing::{PriceFuture, PricingCapability};
use crate::types::{Money, Price, TicketId};

/// Pricing capability backed by a fixed price table.
///
/// Unknown tickets are `NotFound`; tickets marked with [`Self::fail`] return a
/// storage error as if the lookup service were down.
#[derive(Debug, Clone, Default)]
pub struct StaticPricing {
    prices: Arc<Mutex<HashMap<TicketId, Price>>>,
    failing: Arc<Mutex<HashSet<TicketId>>>,
}

impl StaticPricing {
    /// Create an empty price table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a price.
    #[must_use]
    pub fn with_price(self, ticket_id: TicketId, cents: u64, currency: &str) -> Self {
        if let Ok(mut prices) = lock(&self.prices) {
            prices.insert(
                ticket_id,
                Price {
                    unit_price: Money::from_cents(cents),
                    currency: currency.to_string(),
                },
            );
        }
        self
    }

    /// Make lookups for `ticket_id` fail.
    pub fn fail(&self, ticket_id: TicketId) {
        if let Ok(mut failing) = lock(&self.failing) {
            failing.insert(ticket_id);
        }
    }
}

impl PricingCapability for StaticPricing {
    fn get_price(&self, ticket_id: TicketId) -> PriceFuture<'_> {
        let result = lock(&self.failing)
            .map(|failing| failing.contains(&ticket_id))
            .and_then(|failing| {
                if failing {
                    return Err(TicketingError::Storage(format!(
                        "price lookup for ticket {ticket_id} unavailable"
                    )));
                }
                lock(&self.prices)?
                    .get(&ticket_id)
                    .cloned()
                    .ok_or_else(|| TicketingError::not_found("ticket", ticket_id))
            });
        Box::pin(std::future::ready(result))
    }
}
