//! In-memory order store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::inventory::paginate;
use super::{lock, ready};
use crate::error::{Result, TicketingError};
use crate::orders::{StatusPlan, append_note, audit_line, plan_status_change};
use crate::settlement::NewPayment;
use crate::store::{OrderStore, StoreFuture};
use crate::types::{
    Order, OrderFilter, OrderId, OrderStatus, Page, PageRequest, Payment, StatusChange,
};

#[derive(Debug, Default)]
struct OrderState {
    orders: HashMap<OrderId, Order>,
    payments: Vec<Payment>,
    next_item_id: i64,
}

/// In-memory order and payment storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<OrderState>>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Payments recorded for an order.
    #[must_use]
    pub fn payments_for(&self, order_id: OrderId) -> Vec<Payment> {
        lock(&self.state)
            .map(|state| {
                state
                    .payments
                    .iter()
                    .filter(|p| p.order_id == order_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        lock(&self.state).map(|state| state.orders.len()).unwrap_or_default()
    }
}

fn load(state: &OrderState, order_id: OrderId) -> Result<Order> {
    state
        .orders
        .get(&order_id)
        .cloned()
        .ok_or_else(|| TicketingError::not_found("order", order_id))
}

impl OrderStore for InMemoryOrderStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        ready(lock(&self.state).map(|_| ()))
    }

    fn insert_order(&self, mut order: Order) -> StoreFuture<'_, Order> {
        let result = lock(&self.state).and_then(|mut state| {
            if state
                .orders
                .values()
                .any(|o| o.id == order.id || o.order_number == order.order_number)
            {
                return Err(TicketingError::AlreadyExists(format!(
                    "order {}",
                    order.order_number
                )));
            }
            for item in &mut order.items {
                state.next_item_id += 1;
                item.id = state.next_item_id;
            }
            state.orders.insert(order.id, order.clone());
            Ok(order)
        });
        ready(result)
    }

    fn get_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<Order>> {
        ready(lock(&self.state).map(|state| state.orders.get(&order_id).cloned()))
    }

    fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> StoreFuture<'_, Page<Order>> {
        let result = lock(&self.state).map(|state| {
            let mut matching: Vec<Order> = state
                .orders
                .values()
                .filter(|o| filter.matches(o))
                .cloned()
                .collect();
            matching.sort_by(|a, b| {
                b.order_date
                    .cmp(&a.order_date)
                    .then_with(|| b.order_number.cmp(&a.order_number))
            });
            paginate(matching, page)
        });
        ready(result)
    }

    fn update_status(&self, order_id: OrderId, change: StatusChange) -> StoreFuture<'_, Order> {
        let result = lock(&self.state).and_then(|mut state| {
            let mut order = load(&state, order_id)?;
            let plan = plan_status_change(order.status, change.status)?;
            let line = audit_line(order.status, plan, &change);

            if let StatusPlan::Apply { .. } = plan {
                order.status = change.status;
                if change.status == OrderStatus::Cancelled {
                    for item in &mut order.items {
                        item.status = "cancelled".to_string();
                        item.updated_at = change.at;
                    }
                }
            }
            order.notes = Some(append_note(order.notes.as_deref(), &line));
            order.updated_at = change.at;

            state.orders.insert(order_id, order.clone());
            Ok(order)
        });
        ready(result)
    }

    fn record_payment(&self, order_id: OrderId, payment: NewPayment) -> StoreFuture<'_, (Payment, Order)> {
        let result = lock(&self.state).and_then(|mut state| {
            let mut order = load(&state, order_id)?;
            let recorded = payment.settle(&order)?;
            if state.payments.iter().any(|p| p.order_id == order_id) {
                return Err(TicketingError::AlreadyExists(format!(
                    "payment for order {order_id}"
                )));
            }

            let change = StatusChange {
                status: OrderStatus::Paid,
                reason: Some(format!("payment {}", recorded.transaction_id)),
                at: payment.at,
            };
            let plan = plan_status_change(order.status, OrderStatus::Paid)?;
            order.notes = Some(append_note(
                order.notes.as_deref(),
                &audit_line(order.status, plan, &change),
            ));
            order.status = OrderStatus::Paid;
            order.updated_at = payment.at;

            state.payments.push(recorded.clone());
            state.orders.insert(order_id, order.clone());
            Ok((recorded, order))
        });
        ready(result)
    }
}
