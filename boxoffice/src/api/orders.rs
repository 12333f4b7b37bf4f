//! Order endpoints.
//!
//! - POST /api/orders - Place an order
//! - GET /api/orders?customer_id=&status=&from=&to=&page=&page_size= - List orders
//! - GET /api/orders/:id - Get an order
//! - PUT /api/orders/:id/status - Change order status
//! - POST /api/orders/:id/cancel - Cancel an order

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use super::parse_id;
use crate::orders::{NewOrder, OrderLine, parse_timestamp};
use crate::server::{AppError, AppState, JsonBody, QueryParams};
use crate::types::{BillingInfo, Order, OrderFilter, OrderId, OrderStatus, Page};

/// One requested order line.
#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    /// Ticket type id
    pub ticket_id: String,
    /// Quantity
    pub quantity: u32,
}

/// Request to place an order.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Customer placing the order
    pub customer_id: String,
    /// Requested lines
    pub items: Vec<OrderItemRequest>,
    /// Billing snapshot
    #[serde(default)]
    pub billing: Option<BillingInfo>,
    /// Free text notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// Query parameters for listing orders.
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    /// Customer whose orders to list
    pub customer_id: Option<String>,
    /// Status filter
    pub status: Option<String>,
    /// Inclusive lower bound on order date (RFC 3339)
    pub from: Option<String>,
    /// Inclusive upper bound on order date (RFC 3339)
    pub to: Option<String>,
    /// Page number (1-based)
    pub page: Option<u32>,
    /// Page size
    pub page_size: Option<u32>,
}

/// Request to change an order's status.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// Target status
    pub status: String,
    /// Reason recorded in the order notes
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request to cancel an order.
#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    /// Reason recorded in the order notes
    #[serde(default)]
    pub reason: Option<String>,
}

/// Place an order.
///
/// # Errors
///
/// 400 for invalid input, 404 if a ticket is unknown.
pub async fn create_order(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let items = request
        .items
        .iter()
        .map(|item| {
            Ok(OrderLine {
                ticket_id: parse_id(&item.ticket_id)?,
                quantity: item.quantity,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let order = state
        .orders
        .create_order(NewOrder {
            customer_id: request.customer_id,
            items,
            billing: request.billing,
            notes: request.notes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List a customer's orders with the total count for the same filter.
///
/// # Errors
///
/// 400 for a missing customer, unknown status or unparsable date.
pub async fn list_orders(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListOrdersQuery>,
) -> Result<Json<Page<Order>>, AppError> {
    let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let filter = OrderFilter {
        customer_id: query.customer_id.unwrap_or_default(),
        status: present(query.status)
            .map(|s| OrderStatus::parse(&s))
            .transpose()?,
        from: present(query.from)
            .map(|s| parse_timestamp("from", &s))
            .transpose()?,
        to: present(query.to)
            .map(|s| parse_timestamp("to", &s))
            .transpose()?,
    };
    let page = state
        .orders
        .list_orders(filter, query.page, query.page_size)
        .await?;
    Ok(Json(page))
}

/// Get an order with its items.
///
/// # Errors
///
/// 400 for a malformed id, 404 if unknown.
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.get_order(order_id).await?))
}

/// Change an order's status.
///
/// # Errors
///
/// 400 for an unknown status, 404 if unknown, 409 for a forbidden move.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order_id: OrderId = parse_id(&id)?;
    let status = OrderStatus::parse(&request.status)?;
    let order = state
        .orders
        .update_order_status(order_id, status, request.reason)
        .await?;
    Ok(Json(order))
}

/// Cancel an order. The body is optional.
///
/// # Errors
///
/// 404 if unknown.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CancelOrderRequest>>,
) -> Result<Json<Order>, AppError> {
    let order_id: OrderId = parse_id(&id)?;
    let reason = body.and_then(|Json(request)| request.reason);
    Ok(Json(state.orders.cancel_order(order_id, reason).await?))
}
