//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use super::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Liveness check. Does not touch dependencies.
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Inventory storage reachable
    pub inventory_store: bool,
    /// Order storage reachable
    pub order_store: bool,
}

/// Readiness check: 200 when both stores answer, 503 otherwise.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let (inventory, orders) = tokio::join!(state.inventory_store.ping(), state.order_store.ping());
    if let Err(e) = &inventory {
        tracing::warn!(error = %e, "Inventory store not ready");
    }
    if let Err(e) = &orders {
        tracing::warn!(error = %e, "Order store not ready");
    }

    let response = ReadinessResponse {
        ready: inventory.is_ok() && orders.is_ok(),
        inventory_store: inventory.is_ok(),
        order_store: orders.is_ok(),
    };
    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
