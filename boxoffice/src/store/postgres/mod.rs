//! `PostgreSQL` store implementations.
//!
//! # Concurrency
//!
//! Capacity is serialised by the database. Every inventory-affecting
//! transaction takes `SELECT ... FOR UPDATE` on the `ticket_inventory` row
//! before reading `available_quantity`, and reservation transitions lock the
//! reservation row first, then the inventory row, always in that order.
//!
//! Each transaction runs under a bounded deadline: `statement_timeout` is set
//! locally inside the transaction and the whole unit of work is wrapped in a
//! `tokio::time::timeout`. A transaction dropped on timeout is rolled back.

mod inventory;
mod orders;

pub use inventory::PostgresInventoryStore;
pub use orders::PostgresOrderStore;

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use crate::config::DatabaseConfig;
use crate::error::{Result, TicketingError};

/// Open a connection pool using the database configuration.
///
/// # Errors
///
/// Returns error if the database cannot be reached.
pub async fn connect(config: &DatabaseConfig) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .idle_timeout(Duration::from_secs(config.idle_timeout))
        .connect(&config.url)
        .await
}

/// Run database migrations.
///
/// # Errors
///
/// Returns error if migrations fail.
pub async fn migrate(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Begin a transaction whose statements time out after `timeout`.
async fn begin(pool: &PgPool, timeout: Duration) -> Result<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT set_config('statement_timeout', $1, true)")
        .bind(timeout.as_millis().to_string())
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Run `work` under the transaction deadline.
///
/// On timeout the future, and with it any open transaction, is dropped, which
/// rolls the transaction back.
async fn with_deadline<T, F>(timeout: Duration, operation: &'static str, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, work).await.unwrap_or_else(|_| {
        Err(TicketingError::Timeout(format!(
            "{operation} exceeded {}ms and was rolled back",
            timeout.as_millis()
        )))
    })
}
