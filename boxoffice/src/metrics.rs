//! Business metrics for the box office.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_reservations_total{status}` - Reservations by status
//!   (created, confirmed, cancelled, expired)
//! - `boxoffice_tickets_sold_total` - Tickets moved reserved → sold
//! - `boxoffice_orders_total{status}` - Orders created and status changes
//! - `boxoffice_payments_total` - Recorded payments
//! - `boxoffice_payment_revenue_cents_total` - Settled revenue in cents
//! - `boxoffice_sweeps_total{outcome}` - Sweeper runs (ok, failed)
//! - `boxoffice_sweep_release_failures_total` - Per-reservation expiry failures
//!
//! ## Gauges
//! - `boxoffice_active_reservations` - Holds created minus holds closed by this process
//! - `boxoffice_tickets_available{ticket_id}` - Last observed available quantity
//!
//! ## Histograms
//! - `boxoffice_sweep_duration_seconds` - Time taken by one sweep

use metrics::{describe_counter, describe_gauge, describe_histogram};

use crate::reservation::SweepReport;
use crate::types::{OrderStatus, ReservationStatus, TicketInventory};

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    // Reservation metrics
    describe_counter!(
        "boxoffice_reservations_total",
        "Total number of reservations by status (created, confirmed, cancelled, expired)"
    );
    describe_gauge!(
        "boxoffice_active_reservations",
        "Current number of active reservation holds"
    );
    describe_counter!(
        "boxoffice_tickets_sold_total",
        "Total number of tickets sold"
    );
    describe_gauge!(
        "boxoffice_tickets_available",
        "Last observed available quantity per ticket type"
    );

    // Order metrics
    describe_counter!(
        "boxoffice_orders_total",
        "Total number of orders created and status changes by resulting status"
    );
    describe_counter!(
        "boxoffice_payments_total",
        "Total number of recorded payments"
    );
    describe_counter!(
        "boxoffice_payment_revenue_cents_total",
        "Total revenue from recorded payments in cents"
    );

    // Sweeper metrics
    describe_counter!(
        "boxoffice_sweeps_total",
        "Total number of expiration sweeps by outcome"
    );
    describe_counter!(
        "boxoffice_sweep_release_failures_total",
        "Reservations whose expiry failed and will be retried"
    );
    describe_histogram!(
        "boxoffice_sweep_duration_seconds",
        "Time taken by one expiration sweep"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a reservation hold being placed.
pub fn record_reservation_created(inventory: &TicketInventory) {
    metrics::counter!("boxoffice_reservations_total", "status" => "created").increment(1);
    metrics::gauge!("boxoffice_active_reservations").increment(1.0);
    update_tickets_available(inventory);
}

/// Record a reservation leaving the active state.
///
/// # Arguments
///
/// * `status` - Terminal status reached
/// * `quantity` - Quantity that was held
/// * `inventory` - Counters after the compensating ledger mutation
pub fn record_reservation_closed(status: ReservationStatus, quantity: u32, inventory: &TicketInventory) {
    metrics::counter!("boxoffice_reservations_total", "status" => status.as_str()).increment(1);
    metrics::gauge!("boxoffice_active_reservations").decrement(1.0);
    if status == ReservationStatus::Confirmed {
        metrics::counter!("boxoffice_tickets_sold_total").increment(u64::from(quantity));
    }
    update_tickets_available(inventory);
    tracing::debug!(status = %status, quantity, "Recorded reservation_closed metric");
}

/// Record an order reaching `status` (creation counts as `pending`).
pub fn record_order_status(status: OrderStatus) {
    metrics::counter!("boxoffice_orders_total", "status" => status.as_str()).increment(1);
}

/// Record a settled payment.
///
/// # Arguments
///
/// * `amount_cents` - Payment amount in cents
pub fn record_payment(amount_cents: u64) {
    metrics::counter!("boxoffice_payments_total").increment(1);
    metrics::counter!("boxoffice_payment_revenue_cents_total").increment(amount_cents);
    tracing::debug!(amount_cents, "Recorded payment metric");
}

/// Record a completed sweep.
pub fn record_sweep(report: &SweepReport, duration_secs: f64) {
    metrics::counter!("boxoffice_sweeps_total", "outcome" => "ok").increment(1);
    metrics::counter!("boxoffice_sweep_release_failures_total").increment(u64::from(report.failed));
    metrics::histogram!("boxoffice_sweep_duration_seconds").record(duration_secs);
}

/// Record a sweep that could not list due reservations.
pub fn record_sweep_failed() {
    metrics::counter!("boxoffice_sweeps_total", "outcome" => "failed").increment(1);
}

/// Update the available tickets gauge for a ticket type.
pub fn update_tickets_available(inventory: &TicketInventory) {
    metrics::gauge!(
        "boxoffice_tickets_available",
        "ticket_id" => inventory.ticket_id.to_string()
    )
    .set(f64::from(inventory.available_quantity));
}
