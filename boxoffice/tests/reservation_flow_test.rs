//! Reservation lifecycle tests.
//!
//! Holds, expiry, cancellation and confirmation against the in-memory store
//! with a controllable clock. Verifies that capacity is never oversold and
//! that every terminal transition moves the ledger exactly once.
//!
//! Run with: `cargo test --test reservation_flow_test`

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use boxoffice::catalog::{NewTicket, TicketCatalog};
use boxoffice::config::{OrderConfig, ReservationConfig};
use boxoffice::mocks::{FixedClock, InMemoryInventoryStore};
use boxoffice::reservation::{ReservationManager, ReservationTransition, SweepReport};
use boxoffice::store::{InventoryStore, TransitionOutcome};
use boxoffice::sweeper::ExpirationSweeper;
use boxoffice::{Clock, ErrorKind, ReservationStatus, TicketId, TicketingError};
use chrono::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

struct Harness {
    store: InMemoryInventoryStore,
    clock: FixedClock,
    catalog: TicketCatalog,
    manager: ReservationManager,
}

fn harness(config: ReservationConfig) -> Harness {
    let store = InMemoryInventoryStore::new();
    let clock = FixedClock::at_epoch();
    let catalog = TicketCatalog::new(
        Arc::new(store.clone()),
        Arc::new(clock.clone()),
        OrderConfig::default(),
    );
    let manager = ReservationManager::new(Arc::new(store.clone()), Arc::new(clock.clone()), config);
    Harness {
        store,
        clock,
        catalog,
        manager,
    }
}

async fn ticket(h: &Harness, total: u32, max_per_order: Option<u32>) -> TicketId {
    h.catalog
        .create_ticket(NewTicket {
            event_id: Uuid::new_v4(),
            name: "General Admission".to_string(),
            price_cents: 1_000,
            total_quantity: total,
            max_tickets_per_order: max_per_order,
            ..NewTicket::default()
        })
        .await
        .unwrap()
        .id
}

fn counters(h: &Harness, ticket_id: TicketId) -> (u32, u32, u32) {
    let inventory = h.store.inventory(ticket_id).unwrap();
    assert!(inventory.check_invariant().is_ok());
    (
        inventory.available_quantity,
        inventory.reserved_quantity,
        inventory.sold_quantity,
    )
}

#[tokio::test]
async fn test_hold_moves_capacity_to_reserved() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;

    let reservation = h.manager.create_reservation(ticket_id, "alice", 3).await.unwrap();

    assert_eq!(reservation.status, ReservationStatus::Active);
    assert_eq!(reservation.quantity, 3);
    assert_eq!(reservation.user_id, "alice");
    assert_eq!(reservation.created_at, h.clock.now());
    assert_eq!(reservation.expires_at, h.clock.now() + Duration::minutes(15));
    assert_eq!(counters(&h, ticket_id), (7, 3, 0));

    let loaded = h.manager.get_reservation(reservation.id).await.unwrap();
    assert_eq!(loaded, reservation);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_holds_never_oversell() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;

    let first = {
        let manager = h.manager.clone();
        tokio::spawn(async move { manager.create_reservation(ticket_id, "alice", 6).await })
    };
    let second = {
        let manager = h.manager.clone();
        tokio::spawn(async move { manager.create_reservation(ticket_id, "bob", 6).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1, "exactly one hold of 6 fits into 10");

    let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(
        *failure,
        TicketingError::InsufficientInventory {
            requested: 6,
            available: 4
        }
    );
    assert_eq!(counters(&h, ticket_id), (4, 6, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_single_ticket_holds_fill_capacity_exactly() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 25, None).await;

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let manager = h.manager.clone();
            tokio::spawn(async move {
                manager
                    .create_reservation(ticket_id, &format!("user-{i}"), 1)
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 25);
    assert_eq!(counters(&h, ticket_id), (0, 25, 0));
}

#[tokio::test]
async fn test_lapsed_hold_is_expired_and_capacity_returned() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;
    let reservation = h.manager.create_reservation(ticket_id, "alice", 4).await.unwrap();

    // Not yet due
    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();
    assert_eq!(report, SweepReport::default());
    assert_eq!(counters(&h, ticket_id), (6, 4, 0));

    h.clock.advance(Duration::minutes(16));
    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(counters(&h, ticket_id), (10, 0, 0));
    let expired = h.manager.get_reservation(reservation.id).await.unwrap();
    assert_eq!(expired.status, ReservationStatus::Expired);

    // A second sweep finds nothing left to do
    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(counters(&h, ticket_id), (10, 0, 0));
}

#[tokio::test]
async fn test_hold_is_due_exactly_at_expiry() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 5, None).await;
    let reservation = h.manager.create_reservation(ticket_id, "alice", 2).await.unwrap();

    h.clock.set(reservation.expires_at);
    let err = h.manager.confirm_reservation(reservation.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);

    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(counters(&h, ticket_id), (5, 0, 0));
}

#[tokio::test]
async fn test_double_expire_releases_once() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;
    let reservation = h.manager.create_reservation(ticket_id, "alice", 4).await.unwrap();
    h.clock.advance(Duration::minutes(20));
    let now = h.clock.now();

    let first = h
        .store
        .transition_reservation(reservation.id, ReservationTransition::Expire, now)
        .await
        .unwrap();
    let second = h
        .store
        .transition_reservation(reservation.id, ReservationTransition::Expire, now)
        .await
        .unwrap();

    assert!(first.is_applied());
    assert!(matches!(second, TransitionOutcome::Unchanged(_)));
    assert_eq!(second.reservation().status, ReservationStatus::Expired);
    assert_eq!(counters(&h, ticket_id), (10, 0, 0));
}

#[tokio::test]
async fn test_expiring_before_due_is_rejected() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;
    let reservation = h.manager.create_reservation(ticket_id, "alice", 4).await.unwrap();

    let err = h
        .store
        .transition_reservation(reservation.id, ReservationTransition::Expire, h.clock.now())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(counters(&h, ticket_id), (6, 4, 0));
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;
    let reservation = h.manager.create_reservation(ticket_id, "alice", 3).await.unwrap();

    let cancelled = h.manager.cancel_reservation(reservation.id).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(counters(&h, ticket_id), (10, 0, 0));

    let again = h.manager.cancel_reservation(reservation.id).await.unwrap();
    assert_eq!(again.status, ReservationStatus::Cancelled);
    assert_eq!(counters(&h, ticket_id), (10, 0, 0));
}

#[tokio::test]
async fn test_confirm_moves_reserved_to_sold_once() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;
    let reservation = h.manager.create_reservation(ticket_id, "alice", 3).await.unwrap();

    let confirmed = h.manager.confirm_reservation(reservation.id).await.unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(counters(&h, ticket_id), (7, 0, 3));

    let again = h.manager.confirm_reservation(reservation.id).await.unwrap();
    assert_eq!(again.status, ReservationStatus::Confirmed);
    assert_eq!(counters(&h, ticket_id), (7, 0, 3));

    // Sold tickets never come back, even after the window passes
    h.clock.advance(Duration::hours(1));
    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(counters(&h, ticket_id), (7, 0, 3));
}

#[tokio::test]
async fn test_terminal_states_do_not_cross() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;

    let confirmed = h.manager.create_reservation(ticket_id, "alice", 2).await.unwrap();
    h.manager.confirm_reservation(confirmed.id).await.unwrap();
    let err = h.manager.cancel_reservation(confirmed.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);

    let cancelled = h.manager.create_reservation(ticket_id, "bob", 2).await.unwrap();
    h.manager.cancel_reservation(cancelled.id).await.unwrap();
    let err = h.manager.confirm_reservation(cancelled.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);

    assert_eq!(counters(&h, ticket_id), (8, 0, 2));
}

#[tokio::test]
async fn test_confirm_after_lapse_is_rejected() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;
    let reservation = h.manager.create_reservation(ticket_id, "alice", 3).await.unwrap();
    h.clock.advance(Duration::minutes(16));

    let err = h.manager.confirm_reservation(reservation.id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(counters(&h, ticket_id), (7, 3, 0));

    h.manager.expire_reservations(h.clock.now()).await.unwrap();
    assert_eq!(counters(&h, ticket_id), (10, 0, 0));
}

#[tokio::test]
async fn test_failed_expiry_does_not_block_other_holds() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;
    let first = h.manager.create_reservation(ticket_id, "alice", 1).await.unwrap();
    let broken = h.manager.create_reservation(ticket_id, "bob", 2).await.unwrap();
    let third = h.manager.create_reservation(ticket_id, "carol", 3).await.unwrap();
    h.store.fail_transitions_for(broken.id);
    h.clock.advance(Duration::minutes(16));

    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();

    assert_eq!(report.examined, 3);
    assert_eq!(report.expired, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(counters(&h, ticket_id), (8, 2, 0));
    for id in [first.id, third.id] {
        let reservation = h.manager.get_reservation(id).await.unwrap();
        assert_eq!(reservation.status, ReservationStatus::Expired);
    }

    // Picked up again once storage recovers
    h.store.heal();
    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(counters(&h, ticket_id), (10, 0, 0));
}

#[tokio::test]
async fn test_failing_holds_do_not_starve_the_batch() {
    let h = harness(ReservationConfig {
        sweep_batch_size: 2,
        ..ReservationConfig::default()
    });
    let ticket_id = ticket(&h, 10, None).await;
    let stuck_a = h.manager.create_reservation(ticket_id, "a", 1).await.unwrap();
    let stuck_b = h.manager.create_reservation(ticket_id, "b", 1).await.unwrap();
    h.clock.advance(Duration::minutes(1));
    let healthy = h.manager.create_reservation(ticket_id, "c", 1).await.unwrap();
    h.store.fail_transitions_for(stuck_a.id);
    h.store.fail_transitions_for(stuck_b.id);
    h.clock.advance(Duration::minutes(16));

    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();

    assert_eq!(report.examined, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(report.expired, 1);
    let reservation = h.manager.get_reservation(healthy.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Expired);
    assert_eq!(counters(&h, ticket_id), (8, 2, 0));
}

#[tokio::test]
async fn test_sweep_respects_batch_size() {
    let h = harness(ReservationConfig {
        sweep_batch_size: 2,
        ..ReservationConfig::default()
    });
    let ticket_id = ticket(&h, 10, None).await;
    for user in ["a", "b", "c"] {
        h.manager.create_reservation(ticket_id, user, 1).await.unwrap();
    }
    h.clock.advance(Duration::minutes(16));

    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();
    assert_eq!(report.expired, 2);

    let report = h.manager.expire_reservations(h.clock.now()).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(h.store.reservations_with_status(ReservationStatus::Expired).len(), 3);
}

#[tokio::test]
async fn test_quantity_limits() {
    let h = harness(ReservationConfig {
        max_tickets_per_reservation: 4,
        ..ReservationConfig::default()
    });
    let capped = ticket(&h, 10, Some(2)).await;
    let open = ticket(&h, 10, None).await;

    let err = h.manager.create_reservation(open, "alice", 5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = h.manager.create_reservation(capped, "alice", 3).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = h.manager.create_reservation(open, "alice", 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = h.manager.create_reservation(open, "  ", 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    h.manager.create_reservation(capped, "alice", 2).await.unwrap();
    h.manager.create_reservation(open, "alice", 4).await.unwrap();
    assert_eq!(counters(&h, capped), (8, 2, 0));
    assert_eq!(counters(&h, open), (6, 4, 0));
}

#[tokio::test]
async fn test_unrepresentable_hold_window_is_rejected() {
    let h = harness(ReservationConfig {
        hold_minutes: 1_000_000_000_000,
        ..ReservationConfig::default()
    });
    let ticket_id = ticket(&h, 10, None).await;

    let err = h.manager.create_reservation(ticket_id, "alice", 2).await.unwrap_err();

    assert!(matches!(err, TicketingError::InvariantViolation(_)));
    assert_eq!(counters(&h, ticket_id), (10, 0, 0));
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let h = harness(ReservationConfig::default());

    let err = h
        .manager
        .create_reservation(TicketId::new(), "alice", 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h
        .manager
        .get_reservation(boxoffice::ReservationId::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_sweeper_sweep_once_and_shutdown() {
    let h = harness(ReservationConfig::default());
    let ticket_id = ticket(&h, 10, None).await;
    h.manager.create_reservation(ticket_id, "alice", 5).await.unwrap();
    h.clock.advance(Duration::minutes(16));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sweeper = ExpirationSweeper::new(
        h.manager.clone(),
        Arc::new(h.clock.clone()),
        StdDuration::from_secs(3600),
        shutdown_rx,
    );

    let report = sweeper.sweep_once().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(counters(&h, ticket_id), (10, 0, 0));

    let handle = sweeper.spawn();
    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
