//! Ticket catalog.
//!
//! Record management for ticket types. Creating a ticket type also creates its
//! inventory row, and the catalog answers price lookups for orders.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::OrderConfig;
use crate::error::{Result, TicketingError};
use crate::pricing::{PriceFuture, PricingCapability};
use crate::store::InventoryStore;
use crate::types::{
    Money, Page, PageRequest, Price, Ticket, TicketFilter, TicketId, TicketInventory,
    normalize_currency,
};

/// Request to define a new ticket type.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewTicket {
    /// Event the ticket type admits to
    pub event_id: Uuid,
    /// External ticket type reference (defaults to the generated id)
    #[serde(default)]
    pub ticket_type_id: Option<String>,
    /// Display name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Unit price in cents
    pub price_cents: u64,
    /// Currency (defaults to the configured currency)
    #[serde(default)]
    pub currency: Option<String>,
    /// Capacity
    pub total_quantity: u32,
    /// Per-order cap (0 or absent = unlimited)
    #[serde(default)]
    pub max_tickets_per_order: Option<u32>,
    /// Whether tickets may be transferred
    #[serde(default)]
    pub is_transferable: bool,
    /// Whether tickets may be refunded
    #[serde(default)]
    pub is_refundable: bool,
    /// Sales window start
    #[serde(default)]
    pub sales_start_date: Option<DateTime<Utc>>,
    /// Sales window end
    #[serde(default)]
    pub sales_end_date: Option<DateTime<Utc>>,
}

/// Ticket type records and their inventory rows.
#[derive(Clone)]
pub struct TicketCatalog {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    config: OrderConfig,
}

impl TicketCatalog {
    /// Creates a catalog over the given store
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, config: OrderConfig) -> Self {
        Self { store, clock, config }
    }

    /// Defines a ticket type and its inventory (`available = total`) atomically.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank name, zero price or capacity, a
    /// malformed currency or an inverted sales window.
    #[tracing::instrument(skip(self, request), fields(event_id = %request.event_id))]
    pub async fn create_ticket(&self, request: NewTicket) -> Result<Ticket> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(TicketingError::InvalidArgument("name is required".to_string()));
        }
        if request.price_cents == 0 {
            return Err(TicketingError::InvalidArgument(
                "price must be greater than zero".to_string(),
            ));
        }
        if request.total_quantity == 0 {
            return Err(TicketingError::InvalidArgument(
                "total_quantity must be greater than zero".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (request.sales_start_date, request.sales_end_date) {
            if end <= start {
                return Err(TicketingError::InvalidArgument(
                    "sales_end_date must be after sales_start_date".to_string(),
                ));
            }
        }
        let currency = normalize_currency(
            request
                .currency
                .as_deref()
                .unwrap_or(&self.config.default_currency),
        )?;

        let id = TicketId::new();
        let now = self.clock.now();
        let ticket = Ticket {
            id,
            event_id: request.event_id,
            ticket_type_id: request
                .ticket_type_id
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| id.to_string()),
            name: name.to_string(),
            description: request.description.unwrap_or_default(),
            price: Money::from_cents(request.price_cents),
            currency,
            max_tickets_per_order: request.max_tickets_per_order.unwrap_or(0),
            is_transferable: request.is_transferable,
            is_refundable: request.is_refundable,
            sales_start_date: request.sales_start_date,
            sales_end_date: request.sales_end_date,
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        };
        let inventory = TicketInventory::new(id, request.total_quantity, now);

        let ticket = self.store.create_ticket(ticket, inventory).await?;
        info!(
            ticket_id = %ticket.id,
            price = %ticket.price,
            total_quantity = request.total_quantity,
            "Ticket type created"
        );
        Ok(ticket)
    }

    /// Loads a ticket type.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn get_ticket(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("ticket", ticket_id))
    }

    /// Lists ticket types with pagination.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn list_tickets(
        &self,
        filter: TicketFilter,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<Ticket>> {
        let page = PageRequest::resolve(
            page,
            page_size,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        self.store.list_tickets(filter, page).await
    }
}

impl PricingCapability for TicketCatalog {
    fn get_price(&self, ticket_id: TicketId) -> PriceFuture<'_> {
        Box::pin(async move {
            let ticket = self.get_ticket(ticket_id).await?;
            Ok(Price {
                unit_price: ticket.price,
                currency: ticket.currency,
            })
        })
    }
}
