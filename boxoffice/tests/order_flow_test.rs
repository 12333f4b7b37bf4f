//! Order and settlement tests.
//!
//! Order creation prices every line through the pricing capability and
//! persists all-or-nothing; settlement records exactly one payment and flips
//! the order to paid in the same unit of work.
//!
//! Run with: `cargo test --test order_flow_test`

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use boxoffice::config::OrderConfig;
use boxoffice::mocks::{FixedClock, InMemoryOrderStore, StaticPricing};
use boxoffice::orders::{NewOrder, OrderLine, OrderOrchestrator};
use boxoffice::settlement::SettlementRecorder;
use boxoffice::types::{BillingInfo, OrderFilter, PaymentInfo};
use boxoffice::{Clock, ErrorKind, Money, OrderId, OrderStatus, TicketId};
use chrono::Duration;

struct Harness {
    store: InMemoryOrderStore,
    pricing: StaticPricing,
    clock: FixedClock,
    orders: OrderOrchestrator,
    settlement: SettlementRecorder,
    t1: TicketId,
    t2: TicketId,
}

fn harness() -> Harness {
    let t1 = TicketId::new();
    let t2 = TicketId::new();
    let store = InMemoryOrderStore::new();
    let pricing = StaticPricing::new()
        .with_price(t1, 1_000, "USD")
        .with_price(t2, 500, "USD");
    let clock = FixedClock::at_epoch();
    let orders = OrderOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(pricing.clone()),
        Arc::new(clock.clone()),
        OrderConfig::default(),
    );
    let settlement = SettlementRecorder::new(Arc::new(store.clone()), Arc::new(clock.clone()));
    Harness {
        store,
        pricing,
        clock,
        orders,
        settlement,
        t1,
        t2,
    }
}

fn order_request(customer: &str, lines: &[(TicketId, u32)]) -> NewOrder {
    NewOrder {
        customer_id: customer.to_string(),
        items: lines
            .iter()
            .map(|&(ticket_id, quantity)| OrderLine { ticket_id, quantity })
            .collect(),
        billing: None,
        notes: None,
    }
}

fn card() -> PaymentInfo {
    PaymentInfo {
        method: "card".to_string(),
        reference: Some("ref-123".to_string()),
    }
}

#[tokio::test]
async fn test_order_totals_from_unit_prices() {
    let h = harness();

    let order = h
        .orders
        .create_order(order_request("cust-1", &[(h.t1, 2), (h.t2, 1)]))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, Money::from_cents(2_500));
    assert_eq!(order.subtotal, Money::from_cents(2_500));
    assert_eq!(order.total_amount.to_string(), "$25.00");
    assert_eq!(order.currency, "USD");
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].unit_price, Money::from_cents(1_000));
    assert_eq!(order.items[0].subtotal, Money::from_cents(2_000));
    assert_eq!(order.items[1].total_amount, Money::from_cents(500));
    assert!(order.order_number.starts_with("ORD-20250101"));
    assert_eq!(order.order_date, h.clock.now());

    let loaded = h.orders.get_order(order.id).await.unwrap();
    assert_eq!(loaded, order);
}

#[tokio::test]
async fn test_payment_marks_order_paid() {
    let h = harness();
    let order = h
        .orders
        .create_order(order_request("cust-1", &[(h.t1, 2), (h.t2, 1)]))
        .await
        .unwrap();

    let receipt = h.settlement.process_payment(order.id, card()).await.unwrap();

    assert!(receipt.transaction_id.starts_with("txn_"));
    assert_eq!(receipt.order.status, OrderStatus::Paid);
    assert_eq!(receipt.payment.amount, order.total_amount);
    assert_eq!(receipt.payment.status, "completed");
    assert_eq!(receipt.payment.reference.as_deref(), Some("ref-123"));

    let payments = h.store.payments_for(order.id);
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].transaction_id, receipt.transaction_id);

    let paid = h.orders.get_order(order.id).await.unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(paid.notes.unwrap().contains("pending -> paid"));
}

#[tokio::test]
async fn test_second_payment_is_rejected() {
    let h = harness();
    let order = h
        .orders
        .create_order(order_request("cust-1", &[(h.t1, 1)]))
        .await
        .unwrap();
    h.settlement.process_payment(order.id, card()).await.unwrap();

    let err = h.settlement.process_payment(order.id, card()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(h.store.payments_for(order.id).len(), 1);
}

#[tokio::test]
async fn test_payment_preconditions() {
    let h = harness();

    let err = h
        .settlement
        .process_payment(OrderId::new(), card())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let order = h
        .orders
        .create_order(order_request("cust-1", &[(h.t1, 1)]))
        .await
        .unwrap();

    let err = h
        .settlement
        .process_payment(
            order.id,
            PaymentInfo {
                method: " ".to_string(),
                reference: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    h.orders.cancel_order(order.id, None).await.unwrap();
    let err = h.settlement.process_payment(order.id, card()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert!(h.store.payments_for(order.id).is_empty());
}

#[tokio::test]
async fn test_pricing_failure_aborts_whole_order() {
    let h = harness();
    h.pricing.fail(h.t2);

    let err = h
        .orders
        .create_order(order_request("cust-1", &[(h.t1, 2), (h.t2, 1)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.store.order_count(), 0);

    let err = h
        .orders
        .create_order(order_request("cust-1", &[(TicketId::new(), 1)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_mixed_currencies_are_rejected() {
    let h = harness();
    let euro = TicketId::new();
    let pricing = h.pricing.clone().with_price(euro, 700, "EUR");
    let orders = OrderOrchestrator::new(
        Arc::new(h.store.clone()),
        Arc::new(pricing),
        Arc::new(h.clock.clone()),
        OrderConfig::default(),
    );

    let err = orders
        .create_order(order_request("cust-1", &[(h.t1, 1), (euro, 1)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_order_input_validation() {
    let h = harness();

    for request in [
        order_request("", &[(h.t1, 1)]),
        order_request("cust-1", &[]),
        order_request("cust-1", &[(h.t1, 0)]),
    ] {
        let err = h.orders.create_order(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_billing_and_notes_are_kept() {
    let h = harness();
    let mut request = order_request("cust-1", &[(h.t1, 1)]);
    request.billing = Some(BillingInfo {
        name: Some("Ada Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        ..BillingInfo::default()
    });
    request.notes = Some("aisle seat please".to_string());

    let order = h.orders.create_order(request).await.unwrap();

    let loaded = h.orders.get_order(order.id).await.unwrap();
    assert_eq!(
        loaded.billing.unwrap().email.as_deref(),
        Some("ada@example.com")
    );
    assert_eq!(loaded.notes.as_deref(), Some("aisle seat please"));
}

#[tokio::test]
async fn test_status_transitions_append_audit_notes() {
    let h = harness();
    let order = h
        .orders
        .create_order(order_request("cust-1", &[(h.t1, 1)]))
        .await
        .unwrap();

    let unchanged = h
        .orders
        .update_order_status(order.id, OrderStatus::Pending, Some("checked".to_string()))
        .await
        .unwrap();
    assert_eq!(unchanged.status, OrderStatus::Pending);
    assert!(unchanged.notes.as_deref().unwrap().contains("status pending unchanged: checked"));

    h.settlement.process_payment(order.id, card()).await.unwrap();

    let err = h
        .orders
        .update_order_status(order.id, OrderStatus::Pending, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);

    h.clock.advance(Duration::minutes(5));
    let cancelled = h
        .orders
        .cancel_order(order.id, Some("customer request".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.updated_at, h.clock.now());
    assert!(cancelled.items.iter().all(|item| item.status == "cancelled"));

    let notes = cancelled.notes.unwrap();
    assert_eq!(notes.lines().count(), 3);
    assert!(notes.lines().last().unwrap().ends_with(
        "status paid -> cancelled: customer request (compensation required: order was paid)"
    ));

    let err = h
        .orders
        .update_order_status(order.id, OrderStatus::Paid, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
}

#[tokio::test]
async fn test_cancel_uses_default_reason() {
    let h = harness();
    let order = h
        .orders
        .create_order(order_request("cust-1", &[(h.t2, 2)]))
        .await
        .unwrap();

    let cancelled = h.orders.cancel_order(order.id, None).await.unwrap();

    assert!(cancelled
        .notes
        .unwrap()
        .ends_with("status pending -> cancelled: cancelled by request"));
}

#[tokio::test]
async fn test_list_orders_pages_and_filters() {
    let h = harness();
    let mut ids = Vec::new();
    for _ in 0..5 {
        let order = h
            .orders
            .create_order(order_request("cust-1", &[(h.t1, 1)]))
            .await
            .unwrap();
        ids.push(order.id);
        h.clock.advance(Duration::minutes(1));
    }
    h.orders
        .create_order(order_request("cust-2", &[(h.t1, 1)]))
        .await
        .unwrap();
    h.settlement.process_payment(ids[0], card()).await.unwrap();

    let filter = || OrderFilter {
        customer_id: "cust-1".to_string(),
        ..OrderFilter::default()
    };

    let first = h.orders.list_orders(filter(), Some(1), Some(2)).await.unwrap();
    assert_eq!(first.total_count, 5);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].id, ids[4], "newest first");

    let last = h.orders.list_orders(filter(), Some(3), Some(2)).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].id, ids[0]);

    let beyond = h.orders.list_orders(filter(), Some(9), Some(2)).await.unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_count, 5);

    let paid = h
        .orders
        .list_orders(
            OrderFilter {
                status: Some(OrderStatus::Paid),
                ..filter()
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(paid.total_count, 1);
    assert_eq!(paid.items[0].id, ids[0]);
    assert_eq!(paid.page_size, 10);

    let start = h.clock.now() - Duration::minutes(5);
    let windowed = h
        .orders
        .list_orders(
            OrderFilter {
                from: Some(start + Duration::minutes(1)),
                to: Some(start + Duration::minutes(3)),
                ..filter()
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(windowed.total_count, 3);
}

#[tokio::test]
async fn test_list_orders_validation() {
    let h = harness();

    let err = h
        .orders
        .list_orders(OrderFilter::default(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let now = h.clock.now();
    let err = h
        .orders
        .list_orders(
            OrderFilter {
                customer_id: "cust-1".to_string(),
                from: Some(now),
                to: Some(now - Duration::days(1)),
                ..OrderFilter::default()
            },
            None,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}
