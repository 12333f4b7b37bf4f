//! Router configuration.

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{orders, payments, reservations, tickets};

/// Build the complete Axum router.
///
/// Health checks sit at the root; everything else is nested under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Ticket catalog and inventory
        .route("/tickets", post(tickets::create_ticket).get(tickets::list_tickets))
        .route("/tickets/:id", get(tickets::get_ticket))
        .route("/tickets/:id/availability", get(tickets::check_availability))
        .route("/tickets/:id/reservations", post(reservations::reserve_tickets))
        // Reservation holds
        .route("/reservations/:id", get(reservations::get_reservation))
        .route("/reservations/:id/cancel", post(reservations::cancel_reservation))
        .route("/reservations/:id/confirm", post(reservations::confirm_reservation))
        // Orders
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", put(orders::update_order_status))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        // Settlement
        .route("/orders/:id/payments", post(payments::process_payment));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
