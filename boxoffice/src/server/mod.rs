//! HTTP server module.
//!
//! Axum router, shared state, health endpoints and error responses.

pub mod error;
pub mod extract;
pub mod health;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use extract::{JsonBody, QueryParams};
pub use routes::build_router;
pub use state::AppState;
