//! Inventory ledger.
//!
//! The counter arithmetic below is the only code that changes
//! `available`/`reserved`/`sold`. Stores call it while holding the inventory
//! row lock and persist the result in the same transaction as the
//! reservation row it belongs to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, TicketingError};
use crate::store::InventoryStore;
use crate::types::{TicketId, TicketInventory};

impl TicketInventory {
    /// Checks `total = available + reserved + sold`.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the counters do not add up.
    pub fn check_invariant(&self) -> Result<()> {
        let accounted = u64::from(self.available_quantity)
            + u64::from(self.reserved_quantity)
            + u64::from(self.sold_quantity);
        if accounted == u64::from(self.total_quantity) {
            Ok(())
        } else {
            Err(TicketingError::InvariantViolation(format!(
                "ticket {}: total {} != available {} + reserved {} + sold {}",
                self.ticket_id,
                self.total_quantity,
                self.available_quantity,
                self.reserved_quantity,
                self.sold_quantity
            )))
        }
    }

    /// Whether `quantity` tickets could be held right now.
    #[must_use]
    pub const fn can_hold(&self, quantity: u32) -> bool {
        self.available_quantity >= quantity
    }

    /// Moves `quantity` from available to reserved.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a zero quantity
    /// - `InsufficientInventory` if fewer than `quantity` are available; the
    ///   counters are left untouched
    pub fn reserve(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<()> {
        ensure_positive(quantity)?;
        self.check_invariant()?;
        if !self.can_hold(quantity) {
            return Err(TicketingError::InsufficientInventory {
                requested: quantity,
                available: self.available_quantity,
            });
        }
        self.available_quantity -= quantity;
        self.reserved_quantity += quantity;
        self.last_updated = now;
        Ok(())
    }

    /// Returns `quantity` from reserved to available (expiry, cancellation).
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if fewer than `quantity` are reserved.
    /// That means the hold was already released once, so nothing is clamped.
    pub fn release(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<()> {
        ensure_positive(quantity)?;
        self.check_invariant()?;
        self.reserved_quantity = self.take_reserved(quantity, "release")?;
        self.available_quantity += quantity;
        self.last_updated = now;
        Ok(())
    }

    /// Moves `quantity` from reserved to sold (settlement).
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if fewer than `quantity` are reserved.
    pub fn confirm(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<()> {
        ensure_positive(quantity)?;
        self.check_invariant()?;
        self.reserved_quantity = self.take_reserved(quantity, "confirm")?;
        self.sold_quantity += quantity;
        self.last_updated = now;
        Ok(())
    }

    fn take_reserved(&self, quantity: u32, op: &str) -> Result<u32> {
        self.reserved_quantity.checked_sub(quantity).ok_or_else(|| {
            TicketingError::InvariantViolation(format!(
                "{op} of {quantity} on ticket {} would drive reserved below zero (reserved {})",
                self.ticket_id, self.reserved_quantity
            ))
        })
    }
}

fn ensure_positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(TicketingError::InvalidArgument(
            "quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Result of an availability check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Availability {
    /// Ticket type checked
    pub ticket_id: TicketId,
    /// Quantity asked about
    pub requested: u32,
    /// `available_quantity >= requested`
    pub available: bool,
    /// Current free quantity
    pub available_quantity: u32,
    /// Total capacity
    pub total_quantity: u32,
    /// Held quantity
    pub reserved_quantity: u32,
    /// Settled quantity
    pub sold_quantity: u32,
}

/// Read side of the ledger.
///
/// Holds and their compensations go through
/// [`ReservationManager`](crate::reservation::ReservationManager) so they
/// always commit together with a reservation row.
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
}

impl InventoryLedger {
    /// Creates a ledger over the given store
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Reads the authoritative counters for a ticket type.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a zero quantity
    /// - `NotFound` if the ticket type has no inventory row
    #[tracing::instrument(skip(self), fields(ticket_id = %ticket_id))]
    pub async fn check_availability(&self, ticket_id: TicketId, quantity: u32) -> Result<Availability> {
        ensure_positive(quantity)?;
        let inventory = self
            .store
            .load_inventory(ticket_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("ticket", ticket_id))?;

        Ok(Availability {
            ticket_id,
            requested: quantity,
            available: inventory.can_hold(quantity),
            available_quantity: inventory.available_quantity,
            total_quantity: inventory.total_quantity,
            reserved_quantity: inventory.reserved_quantity,
            sold_quantity: inventory.sold_quantity,
        })
    }
}
