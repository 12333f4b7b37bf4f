//! In-memory inventory store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::{lock, ready};
use crate::error::{Result, TicketingError};
use crate::reservation::ReservationTransition;
use crate::store::{DueCursor, InventoryStore, StoreFuture, TransitionOutcome};
use crate::types::{
    Page, PageRequest, Reservation, ReservationId, ReservationStatus, Ticket, TicketFilter,
    TicketId, TicketInventory,
};

#[derive(Debug, Default)]
struct InventoryState {
    tickets: HashMap<TicketId, Ticket>,
    inventory: HashMap<TicketId, TicketInventory>,
    reservations: HashMap<ReservationId, Reservation>,
    failing: HashSet<ReservationId>,
}

/// In-memory ticket, inventory and reservation storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<Mutex<InventoryState>>,
}

impl InMemoryInventoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counters for a ticket type.
    #[must_use]
    pub fn inventory(&self, ticket_id: TicketId) -> Option<TicketInventory> {
        lock(&self.state)
            .ok()
            .and_then(|state| state.inventory.get(&ticket_id).cloned())
    }

    /// All reservations with the given status.
    #[must_use]
    pub fn reservations_with_status(&self, status: ReservationStatus) -> Vec<Reservation> {
        lock(&self.state)
            .map(|state| {
                state
                    .reservations
                    .values()
                    .filter(|r| r.status == status)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make every transition of `id` fail with a storage error until
    /// [`Self::heal`] is called.
    pub fn fail_transitions_for(&self, id: ReservationId) {
        if let Ok(mut state) = lock(&self.state) {
            state.failing.insert(id);
        }
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        if let Ok(mut state) = lock(&self.state) {
            state.failing.clear();
        }
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        ready(lock(&self.state).map(|_| ()))
    }

    fn create_ticket(&self, ticket: Ticket, inventory: TicketInventory) -> StoreFuture<'_, Ticket> {
        let result = lock(&self.state).and_then(|mut state| {
            if state.tickets.contains_key(&ticket.id) {
                return Err(TicketingError::AlreadyExists(format!("ticket {}", ticket.id)));
            }
            inventory.check_invariant()?;
            state.inventory.insert(ticket.id, inventory);
            state.tickets.insert(ticket.id, ticket.clone());
            Ok(ticket)
        });
        ready(result)
    }

    fn get_ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        ready(lock(&self.state).map(|state| state.tickets.get(&ticket_id).cloned()))
    }

    fn list_tickets(&self, filter: TicketFilter, page: PageRequest) -> StoreFuture<'_, Page<Ticket>> {
        let result = lock(&self.state).map(|state| {
            let mut matching: Vec<Ticket> = state
                .tickets
                .values()
                .filter(|t| filter.matches(t))
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            paginate(matching, page)
        });
        ready(result)
    }

    fn load_inventory(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<TicketInventory>> {
        ready(lock(&self.state).map(|state| state.inventory.get(&ticket_id).cloned()))
    }

    fn hold(&self, reservation: Reservation) -> StoreFuture<'_, (Reservation, TicketInventory)> {
        let result = lock(&self.state).and_then(|mut state| {
            let mut inventory = state
                .inventory
                .get(&reservation.ticket_id)
                .cloned()
                .ok_or_else(|| TicketingError::not_found("ticket", reservation.ticket_id))?;
            inventory.reserve(reservation.quantity, reservation.created_at)?;

            state.inventory.insert(inventory.ticket_id, inventory.clone());
            state.reservations.insert(reservation.id, reservation.clone());
            Ok((reservation, inventory))
        });
        ready(result)
    }

    fn get_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        ready(lock(&self.state).map(|state| state.reservations.get(&id).cloned()))
    }

    fn due_reservations(
        &self,
        now: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: u32,
    ) -> StoreFuture<'_, Vec<DueCursor>> {
        let key = |c: &DueCursor| (c.expires_at, *c.id.as_uuid());
        let result = lock(&self.state).map(|state| {
            let mut due: Vec<DueCursor> = state
                .reservations
                .values()
                .filter(|r| r.status == ReservationStatus::Active && r.is_due(now))
                .map(|r| DueCursor {
                    expires_at: r.expires_at,
                    id: r.id,
                })
                .filter(|c| after.is_none_or(|a| key(c) > key(&a)))
                .collect();
            due.sort_by_key(key);
            due.truncate(limit as usize);
            due
        });
        ready(result)
    }

    fn transition_reservation(
        &self,
        id: ReservationId,
        transition: ReservationTransition,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TransitionOutcome> {
        let result = lock(&self.state).and_then(|mut state| {
            if state.failing.contains(&id) {
                return Err(TicketingError::Storage(format!(
                    "injected failure for reservation {id}"
                )));
            }
            let mut reservation = state
                .reservations
                .get(&id)
                .cloned()
                .ok_or_else(|| TicketingError::not_found("reservation", id))?;
            if !transition.plan(&reservation, now)? {
                return Ok(TransitionOutcome::Unchanged(reservation));
            }

            let mut inventory = state
                .inventory
                .get(&reservation.ticket_id)
                .cloned()
                .ok_or_else(|| {
                    TicketingError::InvariantViolation(format!(
                        "reservation {id} references missing inventory {}",
                        reservation.ticket_id
                    ))
                })?;
            transition.apply_to_ledger(&mut inventory, reservation.quantity, now)?;
            reservation.status = transition.target();

            state.inventory.insert(inventory.ticket_id, inventory.clone());
            state.reservations.insert(id, reservation.clone());
            Ok(TransitionOutcome::Applied {
                reservation,
                inventory,
            })
        });
        ready(result)
    }
}

pub(super) fn paginate<T>(rows: Vec<T>, page: PageRequest) -> Page<T> {
    let total_count = rows.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = rows
        .into_iter()
        .skip(offset)
        .take(page.page_size as usize)
        .collect();
    Page {
        items,
        total_count,
        page: page.page,
        page_size: page.page_size,
    }
}
