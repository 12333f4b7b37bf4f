//! Application state shared by HTTP handlers.

use std::sync::Arc;

use crate::catalog::TicketCatalog;
use crate::clock::Clock;
use crate::config::Config;
use crate::ledger::InventoryLedger;
use crate::orders::OrderOrchestrator;
use crate::reservation::ReservationManager;
use crate::settlement::SettlementRecorder;
use crate::store::{InventoryStore, OrderStore};

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Ticket type records and price lookups
    pub catalog: TicketCatalog,
    /// Availability reads
    pub ledger: InventoryLedger,
    /// Reservation holds
    pub reservations: ReservationManager,
    /// Orders
    pub orders: OrderOrchestrator,
    /// Payments
    pub settlement: SettlementRecorder,
    /// Inventory storage (readiness)
    pub inventory_store: Arc<dyn InventoryStore>,
    /// Order storage (readiness)
    pub order_store: Arc<dyn OrderStore>,
}

impl AppState {
    /// Wire every service over the given stores and clock.
    ///
    /// The catalog doubles as the orchestrator's pricing capability.
    #[must_use]
    pub fn new(
        inventory_store: Arc<dyn InventoryStore>,
        order_store: Arc<dyn OrderStore>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let catalog = TicketCatalog::new(
            Arc::clone(&inventory_store),
            Arc::clone(&clock),
            config.orders.clone(),
        );
        let ledger = InventoryLedger::new(Arc::clone(&inventory_store));
        let reservations = ReservationManager::new(
            Arc::clone(&inventory_store),
            Arc::clone(&clock),
            config.reservations.clone(),
        );
        let orders = OrderOrchestrator::new(
            Arc::clone(&order_store),
            Arc::new(catalog.clone()),
            Arc::clone(&clock),
            config.orders.clone(),
        );
        let settlement = SettlementRecorder::new(Arc::clone(&order_store), clock);

        Self {
            catalog,
            ledger,
            reservations,
            orders,
            settlement,
            inventory_store,
            order_store,
        }
    }
}
