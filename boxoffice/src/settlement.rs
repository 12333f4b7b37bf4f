//! Settlement Recorder.
//!
//! Records a payment fact against a pending order and marks it paid. No money
//! moves here; the payment row is the record of a settlement that happened
//! elsewhere.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{Result, TicketingError};
use crate::metrics;
use crate::store::OrderStore;
use crate::types::{Order, OrderId, OrderStatus, Payment, PaymentId, PaymentInfo};

/// A payment about to be recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPayment {
    /// Payment identifier
    pub id: PaymentId,
    /// Transaction identifier handed back to the caller
    pub transaction_id: String,
    /// Caller-supplied details
    pub info: PaymentInfo,
    /// Recording time
    pub at: DateTime<Utc>,
}

impl NewPayment {
    /// Builds the payment row for `order`, using its total at call time.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the order is already paid
    /// - `FailedPrecondition` if the order is cancelled
    pub fn settle(&self, order: &Order) -> Result<Payment> {
        match order.status {
            OrderStatus::Pending => Ok(Payment {
                id: self.id,
                order_id: order.id,
                transaction_id: self.transaction_id.clone(),
                amount: order.total_amount,
                currency: order.currency.clone(),
                method: self.info.method.trim().to_string(),
                reference: self.info.reference.clone(),
                status: "completed".to_string(),
                created_at: self.at,
            }),
            OrderStatus::Paid => Err(TicketingError::AlreadyExists(format!(
                "order {} is already paid",
                order.id
            ))),
            OrderStatus::Cancelled => Err(TicketingError::FailedPrecondition(format!(
                "order {} is cancelled",
                order.id
            ))),
        }
    }
}

/// What the caller gets back from a settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// Transaction identifier
    pub transaction_id: String,
    /// Recorded payment
    pub payment: Payment,
    /// Order after the status flip
    pub order: Order,
}

/// Records settlements.
#[derive(Clone)]
pub struct SettlementRecorder {
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
}

impl SettlementRecorder {
    /// Creates a recorder
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Records a completed payment for `order_id` and marks the order paid,
    /// both in one transaction.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the payment method is blank
    /// - `NotFound` for an unknown order
    /// - `AlreadyExists` / `FailedPrecondition` per [`NewPayment::settle`]
    #[tracing::instrument(skip(self, info), fields(order_id = %order_id, method = %info.method))]
    pub async fn process_payment(&self, order_id: OrderId, info: PaymentInfo) -> Result<Receipt> {
        if info.method.trim().is_empty() {
            return Err(TicketingError::InvalidArgument(
                "payment method is required".to_string(),
            ));
        }

        let payment = NewPayment {
            id: PaymentId::new(),
            transaction_id: format!("txn_{}", uuid::Uuid::new_v4().simple()),
            info,
            at: self.clock.now(),
        };

        match self.store.record_payment(order_id, payment).await {
            Ok((payment, order)) => {
                metrics::record_payment(payment.amount.cents());
                metrics::record_order_status(order.status);
                info!(
                    transaction_id = %payment.transaction_id,
                    amount = %payment.amount,
                    currency = %payment.currency,
                    "Payment recorded"
                );
                Ok(Receipt {
                    transaction_id: payment.transaction_id.clone(),
                    payment,
                    order,
                })
            }
            Err(e) => {
                warn!(error = %e, "Payment not recorded");
                Err(e)
            }
        }
    }
}
