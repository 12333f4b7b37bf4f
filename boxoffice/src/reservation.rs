//! Reservation Manager.
//!
//! Per-reservation state machine:
//!
//! ```text
//! active --(expire)--> expired     quantity reserved → available
//! active --(cancel)--> cancelled   quantity reserved → available
//! active --(confirm)-> confirmed   quantity reserved → sold
//! ```
//!
//! Terminal states are idempotent targets. Re-applying the transition that
//! produced a state is a no-op; any other transition out of a terminal state
//! is rejected.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::ReservationConfig;
use crate::error::{ErrorKind, Result, TicketingError};
use crate::metrics;
use crate::store::{DueCursor, InventoryStore, TransitionOutcome};
use crate::types::{Reservation, ReservationId, ReservationStatus, TicketId, TicketInventory};

/// A transition out of `active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReservationTransition {
    /// Hold window elapsed (sweeper)
    Expire,
    /// Explicit release
    Cancel,
    /// Settlement
    Confirm,
}

impl ReservationTransition {
    /// Status reached by this transition
    #[must_use]
    pub const fn target(self) -> ReservationStatus {
        match self {
            Self::Expire => ReservationStatus::Expired,
            Self::Cancel => ReservationStatus::Cancelled,
            Self::Confirm => ReservationStatus::Confirmed,
        }
    }

    /// Decides whether the transition applies to `reservation` at `now`.
    ///
    /// Returns `Ok(true)` when the status must flip, `Ok(false)` when the
    /// reservation already sits in the target state.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` when the reservation is in another
    /// terminal state, when expiring a hold that has not lapsed, or when
    /// confirming a hold that has.
    pub fn plan(self, reservation: &Reservation, now: DateTime<Utc>) -> Result<bool> {
        match reservation.status {
            ReservationStatus::Active => match self {
                Self::Expire if !reservation.is_due(now) => Err(TicketingError::FailedPrecondition(
                    format!("reservation {} is not due until {}", reservation.id, reservation.expires_at),
                )),
                Self::Confirm if reservation.is_due(now) => Err(TicketingError::FailedPrecondition(
                    format!("reservation {} hold lapsed at {}", reservation.id, reservation.expires_at),
                )),
                _ => Ok(true),
            },
            status if status == self.target() => Ok(false),
            status => Err(TicketingError::FailedPrecondition(format!(
                "reservation {} is already {status}",
                reservation.id
            ))),
        }
    }

    /// Applies the compensating ledger mutation for this transition.
    ///
    /// # Errors
    ///
    /// Propagates ledger errors (a double release is an `InvariantViolation`).
    pub fn apply_to_ledger(
        self,
        inventory: &mut TicketInventory,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self {
            Self::Expire | Self::Cancel => inventory.release(quantity, now),
            Self::Confirm => inventory.confirm(quantity, now),
        }
    }
}

/// Counts from one `expire_reservations` pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Due reservations examined
    pub examined: u32,
    /// Reservations flipped to `expired` with capacity released
    pub expired: u32,
    /// Reservations another actor already closed
    pub skipped: u32,
    /// Reservations whose expiry failed; retried next sweep
    pub failed: u32,
}

/// Creates holds and drives them to a terminal state.
#[derive(Clone)]
pub struct ReservationManager {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    config: ReservationConfig,
}

impl ReservationManager {
    /// Creates a manager over the given store and clock
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, config: ReservationConfig) -> Self {
        Self { store, clock, config }
    }

    /// Places a hold of `quantity` tickets for `user_id`.
    ///
    /// The ledger reserve and the reservation insert commit together.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a zero quantity, blank user or a quantity above
    ///   the configured or per-ticket cap
    /// - `NotFound` if the ticket type does not exist
    /// - `InsufficientInventory` if capacity is short
    #[tracing::instrument(skip(self, user_id), fields(ticket_id = %ticket_id))]
    pub async fn create_reservation(
        &self,
        ticket_id: TicketId,
        user_id: &str,
        quantity: u32,
    ) -> Result<Reservation> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(TicketingError::InvalidArgument("user_id is required".to_string()));
        }
        if quantity == 0 {
            return Err(TicketingError::InvalidArgument(
                "quantity must be greater than zero".to_string(),
            ));
        }
        let cap = self.config.max_tickets_per_reservation;
        if cap > 0 && quantity > cap {
            return Err(TicketingError::InvalidArgument(format!(
                "quantity {quantity} exceeds the per-reservation limit of {cap}"
            )));
        }

        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("ticket", ticket_id))?;
        if ticket.max_tickets_per_order > 0 && quantity > ticket.max_tickets_per_order {
            return Err(TicketingError::InvalidArgument(format!(
                "quantity {quantity} exceeds the limit of {} for ticket {ticket_id}",
                ticket.max_tickets_per_order
            )));
        }

        let now = self.clock.now();
        let expires_at = self
            .config
            .hold_window()
            .and_then(|window| now.checked_add_signed(window))
            .ok_or_else(|| {
                TicketingError::InvariantViolation(format!(
                    "hold window of {} minutes overflows the clock",
                    self.config.hold_minutes
                ))
            })?;
        let reservation = Reservation::new(
            ReservationId::new(),
            ticket_id,
            user_id.to_string(),
            quantity,
            now,
            expires_at,
        );

        match self.store.hold(reservation).await {
            Ok((reservation, inventory)) => {
                metrics::record_reservation_created(&inventory);
                info!(
                    reservation_id = %reservation.id,
                    quantity,
                    available = inventory.available_quantity,
                    expires_at = %reservation.expires_at,
                    "Reservation created"
                );
                Ok(reservation)
            }
            Err(e) => {
                if e.kind() == ErrorKind::Internal {
                    error!(error = %e, quantity, "Reservation hold failed");
                } else {
                    warn!(error = %e, quantity, "Reservation rejected");
                }
                Err(e)
            }
        }
    }

    /// Loads a reservation.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no reservation has this id.
    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or_else(|| TicketingError::not_found("reservation", id))
    }

    /// Releases an active hold back to available.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `FailedPrecondition` if the reservation
    /// was confirmed or expired.
    #[tracing::instrument(skip(self), fields(reservation_id = %id))]
    pub async fn cancel_reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.transition(id, ReservationTransition::Cancel, self.clock.now())
            .await
            .map(|outcome| outcome.reservation().clone())
    }

    /// Moves an active, unexpired hold to sold.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `FailedPrecondition` if the hold lapsed
    /// or the reservation was cancelled or expired.
    #[tracing::instrument(skip(self), fields(reservation_id = %id))]
    pub async fn confirm_reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.transition(id, ReservationTransition::Confirm, self.clock.now())
            .await
            .map(|outcome| outcome.reservation().clone())
    }

    /// Expires every active reservation due at `now`, one transaction each.
    ///
    /// A failure on one reservation is logged and counted; the rest still run
    /// and the failed one is picked up again by the next call.
    ///
    /// # Errors
    ///
    /// Returns an error only if the due reservations cannot be listed.
    #[tracing::instrument(skip(self))]
    pub async fn expire_reservations(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let batch = self.config.sweep_batch_size;
        let mut report = SweepReport::default();
        let mut cursor = None;

        // Failed rows do not use up the batch; the scan moves past them
        while report.expired + report.skipped < batch {
            let limit = batch - report.expired - report.skipped;
            let due = self.store.due_reservations(now, cursor, limit).await?;
            let exhausted = due.len() < limit as usize;
            cursor = due.last().copied();

            for DueCursor { id, .. } in due {
                report.examined += 1;
                match self.transition(id, ReservationTransition::Expire, now).await {
                    Ok(outcome) if outcome.is_applied() => report.expired += 1,
                    Ok(_) => report.skipped += 1,
                    Err(e) if e.kind() == ErrorKind::FailedPrecondition => {
                        debug!(reservation_id = %id, reason = %e, "Reservation closed concurrently");
                        report.skipped += 1;
                    }
                    Err(e) => {
                        error!(reservation_id = %id, error = %e, "Failed to expire reservation, will retry");
                        report.failed += 1;
                    }
                }
            }
            if exhausted {
                break;
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "Expired reservations"
            );
        }
        Ok(report)
    }

    async fn transition(
        &self,
        id: ReservationId,
        transition: ReservationTransition,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let outcome = self.store.transition_reservation(id, transition, now).await?;
        match &outcome {
            TransitionOutcome::Applied { reservation, inventory } => {
                metrics::record_reservation_closed(reservation.status, reservation.quantity, inventory);
                info!(
                    reservation_id = %reservation.id,
                    ticket_id = %reservation.ticket_id,
                    status = %reservation.status,
                    quantity = reservation.quantity,
                    available = inventory.available_quantity,
                    reserved = inventory.reserved_quantity,
                    sold = inventory.sold_quantity,
                    "Reservation closed"
                );
            }
            TransitionOutcome::Unchanged(reservation) => {
                debug!(
                    reservation_id = %reservation.id,
                    status = %reservation.status,
                    "Reservation already in target state"
                );
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(status: ReservationStatus, created: DateTime<Utc>) -> Reservation {
        let mut r = Reservation::new(
            ReservationId::new(),
            TicketId::new(),
            "user-1".to_string(),
            2,
            created,
            created + Duration::minutes(15),
        );
        r.status = status;
        r
    }

    #[test]
    fn test_active_transitions() {
        let now = Utc::now();
        let active = reservation(ReservationStatus::Active, now);

        assert!(ReservationTransition::Cancel.plan(&active, now).unwrap());
        assert!(ReservationTransition::Confirm.plan(&active, now).unwrap());
        assert!(ReservationTransition::Expire.plan(&active, now).is_err());
        assert!(ReservationTransition::Expire.plan(&active, now + Duration::minutes(16)).unwrap());
    }

    #[test]
    fn test_confirm_after_lapse_rejected() {
        let now = Utc::now();
        let active = reservation(ReservationStatus::Active, now);
        let err = ReservationTransition::Confirm
            .plan(&active, now + Duration::minutes(15))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    }

    #[test]
    fn test_terminal_states_are_idempotent_targets() {
        let now = Utc::now();
        for transition in [
            ReservationTransition::Expire,
            ReservationTransition::Cancel,
            ReservationTransition::Confirm,
        ] {
            let terminal = reservation(transition.target(), now);
            assert!(!transition.plan(&terminal, now + Duration::hours(1)).unwrap());
        }
    }

    #[test]
    fn test_cross_terminal_transition_rejected() {
        let now = Utc::now();
        let confirmed = reservation(ReservationStatus::Confirmed, now);
        assert_eq!(
            ReservationTransition::Cancel.plan(&confirmed, now).unwrap_err().kind(),
            ErrorKind::FailedPrecondition
        );
        let expired = reservation(ReservationStatus::Expired, now);
        assert_eq!(
            ReservationTransition::Confirm.plan(&expired, now).unwrap_err().kind(),
            ErrorKind::FailedPrecondition
        );
    }

    #[test]
    fn test_ledger_effects() {
        let now = Utc::now();
        let mut inv = TicketInventory::new(TicketId::new(), 10, now);
        inv.reserve(4, now).unwrap();

        ReservationTransition::Confirm.apply_to_ledger(&mut inv, 2, now).unwrap();
        ReservationTransition::Expire.apply_to_ledger(&mut inv, 2, now).unwrap();
        assert_eq!(
            (inv.available_quantity, inv.reserved_quantity, inv.sold_quantity),
            (8, 0, 2)
        );
        assert!(ReservationTransition::Cancel.apply_to_ledger(&mut inv, 1, now).is_err());
    }
}
