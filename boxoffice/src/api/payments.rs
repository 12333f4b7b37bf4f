//! Settlement endpoint.
//!
//! - POST /api/orders/:id/payments - Record a payment and mark the order paid

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::server::{AppError, AppState, JsonBody};
use crate::types::{Money, OrderId, OrderStatus, PaymentInfo};

/// Request to record a payment.
#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    /// Payment method (e.g. `card`)
    pub method: String,
    /// Caller-side reference
    #[serde(default)]
    pub reference: Option<String>,
}

/// Response after recording a payment.
#[derive(Debug, Serialize)]
pub struct ProcessPaymentResponse {
    /// Transaction identifier
    pub transaction_id: String,
    /// Settled order
    pub order_id: OrderId,
    /// Amount recorded (order total at call time)
    pub amount: Money,
    /// Currency
    pub currency: String,
    /// Payment status
    pub payment_status: String,
    /// Order status after settlement
    pub order_status: OrderStatus,
}

/// Record a payment for a pending order.
///
/// # Errors
///
/// 400 for a missing method, 404 for an unknown order, 409 if the order is
/// already paid or cancelled.
pub async fn process_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<ProcessPaymentRequest>,
) -> Result<(StatusCode, Json<ProcessPaymentResponse>), AppError> {
    let order_id: OrderId = parse_id(&id)?;
    let receipt = state
        .settlement
        .process_payment(
            order_id,
            PaymentInfo {
                method: request.method,
                reference: request.reference,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProcessPaymentResponse {
            transaction_id: receipt.transaction_id,
            order_id,
            amount: receipt.payment.amount,
            currency: receipt.payment.currency,
            payment_status: receipt.payment.status,
            order_status: receipt.order.status,
        }),
    ))
}
