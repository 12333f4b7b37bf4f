//! Storage seam.
//!
//! Services depend on these traits only. [`postgres`] holds the production
//! implementation; the `mocks` module provides in-memory ones for tests.
//!
//! Every method that mutates more than one row does so atomically: either all
//! rows change or none do.

pub mod postgres;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::reservation::ReservationTransition;
use crate::settlement::NewPayment;
use crate::types::{
    Order, OrderFilter, OrderId, Page, PageRequest, Payment, Reservation, ReservationId,
    StatusChange, Ticket, TicketFilter, TicketId, TicketInventory,
};

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Position in the due-reservation scan, ordered by `(expires_at, id)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DueCursor {
    /// End of the hold window
    pub expires_at: DateTime<Utc>,
    /// Reservation at this position
    pub id: ReservationId,
}

/// Outcome of a reservation state transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Status flipped and the compensating ledger mutation was applied
    Applied {
        /// Reservation after the transition
        reservation: Reservation,
        /// Inventory after the ledger mutation
        inventory: TicketInventory,
    },
    /// Reservation was already in the target state; nothing changed
    Unchanged(Reservation),
}

impl TransitionOutcome {
    /// The reservation as it is after the call
    #[must_use]
    pub const fn reservation(&self) -> &Reservation {
        match self {
            Self::Applied { reservation, .. } | Self::Unchanged(reservation) => reservation,
        }
    }

    /// Whether the ledger was mutated
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Ticket catalog, inventory counters and reservation holds.
pub trait InventoryStore: Send + Sync {
    /// Checks that storage is reachable.
    fn ping(&self) -> StoreFuture<'_, ()>;

    /// Inserts a ticket type together with its inventory row.
    fn create_ticket(&self, ticket: Ticket, inventory: TicketInventory) -> StoreFuture<'_, Ticket>;

    /// Loads a ticket type.
    fn get_ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<Ticket>>;

    /// Lists ticket types matching `filter`, newest first.
    fn list_tickets(&self, filter: TicketFilter, page: PageRequest) -> StoreFuture<'_, Page<Ticket>>;

    /// Reads the inventory counters without caching.
    fn load_inventory(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<TicketInventory>>;

    /// Locks the inventory row, reserves `reservation.quantity` and inserts
    /// the reservation, all in one transaction.
    fn hold(&self, reservation: Reservation) -> StoreFuture<'_, (Reservation, TicketInventory)>;

    /// Loads a reservation.
    fn get_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Active reservations whose hold window has elapsed at `now`, ordered by
    /// `(expires_at, id)` and starting strictly after `after`.
    fn due_reservations(
        &self,
        now: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: u32,
    ) -> StoreFuture<'_, Vec<DueCursor>>;

    /// Applies `transition` to one reservation.
    ///
    /// The status flip is guarded by `status = 'active'`; the matching ledger
    /// mutation runs only when that guarded update changed the row, inside the
    /// same transaction.
    fn transition_reservation(
        &self,
        id: ReservationId,
        transition: ReservationTransition,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TransitionOutcome>;
}

/// Orders, their items and payments.
pub trait OrderStore: Send + Sync {
    /// Checks that storage is reachable.
    fn ping(&self) -> StoreFuture<'_, ()>;

    /// Inserts the header and all items in one transaction and returns the
    /// order as re-read from storage.
    fn insert_order(&self, order: Order) -> StoreFuture<'_, Order>;

    /// Loads an order with its items.
    fn get_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<Order>>;

    /// Lists orders matching `filter`, newest first, with a total count over
    /// the same filter.
    fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> StoreFuture<'_, Page<Order>>;

    /// Locks the order and applies a status change with its audit note.
    fn update_status(&self, order_id: OrderId, change: StatusChange) -> StoreFuture<'_, Order>;

    /// Locks the order, inserts the payment and marks the order paid in one
    /// transaction.
    fn record_payment(&self, order_id: OrderId, payment: NewPayment) -> StoreFuture<'_, (Payment, Order)>;
}
