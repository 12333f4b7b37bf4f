//! Box office: ticket inventory, time-bounded reservation holds, orders and
//! payment settlement over `PostgreSQL`.
//!
//! # Architecture
//!
//! ```text
//!            HTTP (axum)
//!                 │
//!   ┌─────────────┼──────────────┬───────────────┐
//!   ▼             ▼              ▼               ▼
//! Catalog   Reservations   Order Orchestrator  Settlement
//!   │             │              │               │
//!   └──── InventoryStore ────┘   └── OrderStore ─┘
//!                 ▲
//!       Expiration Sweeper
//! ```
//!
//! # Inventory Invariant
//!
//! For every ticket type, at every committed state:
//!
//! ```text
//! available + reserved + sold == total,  all counters >= 0
//! ```
//!
//! Every change to the counters commits atomically with the reservation
//! status change that caused it, and concurrent holds against the same ticket
//! are serialised by a row lock so capacity is never oversold.
//!
//! # Reservation Lifecycle
//!
//! A hold is `active` until it is confirmed, cancelled or expired. Each of
//! those transitions happens at most once; repeating one is a no-op and the
//! ledger is touched only when the transition actually applies.

pub mod api;
pub mod app;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;
pub mod orders;
pub mod pricing;
pub mod reservation;
pub mod server;
pub mod settlement;
pub mod store;
pub mod sweeper;
pub mod types;

pub use app::{Application, BootstrapError};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::{ErrorKind, Result, TicketingError};
pub use types::{
    Money, Order, OrderId, OrderStatus, Payment, Reservation, ReservationId, ReservationStatus,
    Ticket, TicketId, TicketInventory,
};
