//! Order Orchestrator.
//!
//! Prices caller-supplied line items through the [`PricingCapability`],
//! persists the order header and items atomically and drives order status.
//!
//! Orders do not hold or confirm inventory. Holding capacity is the separate
//! reservation call, and status changes here carry no ledger side effect.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::OrderConfig;
use crate::error::{Result, TicketingError};
use crate::metrics;
use crate::pricing::PricingCapability;
use crate::store::OrderStore;
use crate::types::{
    BillingInfo, Money, Order, OrderFilter, OrderId, OrderItem, OrderStatus, Page, PageRequest,
    StatusChange, TicketId,
};

/// One requested line of an order.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OrderLine {
    /// Ticket type
    pub ticket_id: TicketId,
    /// Quantity
    pub quantity: u32,
}

/// Request to place an order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewOrder {
    /// Customer placing the order
    pub customer_id: String,
    /// Requested lines
    pub items: Vec<OrderLine>,
    /// Billing snapshot
    pub billing: Option<BillingInfo>,
    /// Free text notes
    pub notes: Option<String>,
}

/// Outcome of checking a requested status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusPlan {
    /// Status flips
    Apply {
        /// A paid order is being cancelled; money must be returned out of band
        compensation: bool,
    },
    /// Order already has the requested status
    Unchanged,
}

/// Checks whether an order may move from `current` to `target`.
///
/// # Errors
///
/// Returns `FailedPrecondition` for any move out of `cancelled` and for
/// `paid → pending`.
pub fn plan_status_change(current: OrderStatus, target: OrderStatus) -> Result<StatusPlan> {
    use OrderStatus::{Cancelled, Paid, Pending};

    match (current, target) {
        (from, to) if from == to => Ok(StatusPlan::Unchanged),
        (Pending, Paid | Cancelled) => Ok(StatusPlan::Apply { compensation: false }),
        (Paid, Cancelled) => Ok(StatusPlan::Apply { compensation: true }),
        (from, to) => Err(TicketingError::FailedPrecondition(format!(
            "order cannot move from {from} to {to}"
        ))),
    }
}

/// Formats the audit line recorded for a status change.
#[must_use]
pub fn audit_line(from: OrderStatus, plan: StatusPlan, change: &StatusChange) -> String {
    let at = change.at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut line = match plan {
        StatusPlan::Unchanged => format!("[{at}] status {from} unchanged"),
        StatusPlan::Apply { .. } => format!("[{at}] status {from} -> {}", change.status),
    };
    if let Some(reason) = change.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        line.push_str(": ");
        line.push_str(reason);
    }
    if plan == (StatusPlan::Apply { compensation: true }) {
        line.push_str(" (compensation required: order was paid)");
    }
    line
}

/// Appends `line` to existing notes.
#[must_use]
pub fn append_note(existing: Option<&str>, line: &str) -> String {
    match existing.filter(|n| !n.is_empty()) {
        Some(notes) => format!("{notes}\n{line}"),
        None => line.to_string(),
    }
}

/// Parses an RFC 3339 timestamp supplied by a caller.
///
/// # Errors
///
/// Returns `InvalidArgument` naming `field` when the value does not parse.
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TicketingError::InvalidArgument(format!("{field} '{value}' is not RFC 3339: {e}")))
}

/// Creates, reads and transitions orders.
#[derive(Clone)]
pub struct OrderOrchestrator {
    store: Arc<dyn OrderStore>,
    pricing: Arc<dyn PricingCapability>,
    clock: Arc<dyn Clock>,
    config: OrderConfig,
}

impl OrderOrchestrator {
    /// Creates an orchestrator
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        pricing: Arc<dyn PricingCapability>,
        clock: Arc<dyn Clock>,
        config: OrderConfig,
    ) -> Self {
        Self {
            store,
            pricing,
            clock,
            config,
        }
    }

    /// Prices every line and persists the order with its items in one
    /// transaction.
    ///
    /// A failed price lookup aborts the whole order.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a blank customer, no items, a zero quantity,
    ///   mixed currencies or an overflowing total
    /// - `NotFound` (or the lookup's own error) when pricing fails
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id, items = request.items.len()))]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order> {
        let customer_id = request.customer_id.trim();
        if customer_id.is_empty() {
            return Err(TicketingError::InvalidArgument("customer_id is required".to_string()));
        }
        if request.items.is_empty() {
            return Err(TicketingError::InvalidArgument(
                "at least one item is required".to_string(),
            ));
        }
        if let Some(line) = request.items.iter().find(|line| line.quantity == 0) {
            return Err(TicketingError::InvalidArgument(format!(
                "quantity for ticket {} must be greater than zero",
                line.ticket_id
            )));
        }

        let now = self.clock.now();
        let mut currency: Option<String> = None;
        let mut subtotal = Money::ZERO;
        let mut items = Vec::with_capacity(request.items.len());

        for line in &request.items {
            let price = self.pricing.get_price(line.ticket_id).await.map_err(|e| {
                warn!(ticket_id = %line.ticket_id, error = %e, "Price lookup failed, order aborted");
                e
            })?;

            let order_currency = currency.get_or_insert_with(|| price.currency.clone());
            if *order_currency != price.currency {
                return Err(TicketingError::InvalidArgument(format!(
                    "ticket {} is priced in {}, order is in {order_currency}",
                    line.ticket_id, price.currency
                )));
            }

            let line_total = price
                .unit_price
                .checked_multiply(line.quantity)
                .ok_or_else(|| overflow(line.ticket_id))?;
            subtotal = subtotal
                .checked_add(line_total)
                .ok_or_else(|| overflow(line.ticket_id))?;

            items.push(OrderItem {
                id: 0,
                ticket_id: line.ticket_id,
                quantity: line.quantity,
                unit_price: price.unit_price,
                subtotal: line_total,
                discount_amount: Money::ZERO,
                tax_amount: Money::ZERO,
                fee_amount: Money::ZERO,
                total_amount: line_total,
                status: "active".to_string(),
                created_at: now,
                updated_at: now,
            });
        }

        let id = OrderId::new();
        let order = Order {
            id,
            order_number: order_number(id, now),
            customer_id: customer_id.to_string(),
            items,
            subtotal,
            discount_amount: Money::ZERO,
            tax_amount: Money::ZERO,
            fee_amount: Money::ZERO,
            total_amount: subtotal,
            currency: currency.unwrap_or_else(|| self.config.default_currency.clone()),
            status: OrderStatus::Pending,
            billing: request.billing,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            order_date: now,
            created_at: now,
            updated_at: now,
        };

        let order = self.store.insert_order(order).await?;
        metrics::record_order_status(order.status);
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            currency = %order.currency,
            "Order created"
        );
        Ok(order)
    }

    /// Loads an order with its items.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("order", order_id))
    }

    /// Moves an order to `status`, appending an audit line to its notes.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `FailedPrecondition` for a forbidden move.
    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id, status = %status))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        reason: Option<String>,
    ) -> Result<Order> {
        let change = StatusChange {
            status,
            reason,
            at: self.clock.now(),
        };
        let order = self.store.update_status(order_id, change).await?;
        metrics::record_order_status(order.status);
        info!(status = %order.status, "Order status updated");
        Ok(order)
    }

    /// Cancels an order.
    ///
    /// # Errors
    ///
    /// See [`Self::update_order_status`].
    pub async fn cancel_order(&self, order_id: OrderId, reason: Option<String>) -> Result<Order> {
        let reason = reason.or_else(|| Some("cancelled by request".to_string()));
        self.update_order_status(order_id, OrderStatus::Cancelled, reason).await
    }

    /// Lists a customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank customer or `from > to`.
    pub async fn list_orders(
        &self,
        mut filter: OrderFilter,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<Order>> {
        filter.customer_id = filter.customer_id.trim().to_string();
        if filter.customer_id.is_empty() {
            return Err(TicketingError::InvalidArgument("customer_id is required".to_string()));
        }
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(TicketingError::InvalidArgument(
                    "from must not be after to".to_string(),
                ));
            }
        }
        let page = PageRequest::resolve(
            page,
            page_size,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        self.store.list_orders(filter, page).await
    }
}

fn order_number(id: OrderId, at: DateTime<Utc>) -> String {
    let suffix: String = id
        .as_uuid()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    format!("ORD-{}-{}", at.format("%Y%m%d%H%M%S"), suffix.to_ascii_uppercase())
}

fn overflow(ticket_id: TicketId) -> TicketingError {
    TicketingError::InvalidArgument(format!("order total overflows at ticket {ticket_id}"))
}
