//! Application lifecycle management and graceful shutdown.
//!
//! 1. **Startup**: connect the pool, run migrations, wire services, bind
//! 2. **Runtime**: serve HTTP and run the expiration sweeper
//! 3. **Shutdown**: stop accepting connections, signal the sweeper and wait
//!    for its current sweep to finish

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::reservation::ReservationManager;
use crate::server::{AppState, build_router};
use crate::store::postgres::{self, PostgresInventoryStore, PostgresOrderStore};
use crate::store::{InventoryStore, OrderStore};
use crate::sweeper::ExpirationSweeper;

/// Errors raised while building or running the application.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Database connection failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migrations failed
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Binding or serving failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fully wired application ready to run.
pub struct Application {
    listener: TcpListener,
    state: AppState,
    sweeper: ExpirationSweeper,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_timeout: Duration,
}

impl Application {
    /// Connect to the database, migrate, wire services and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns error if the database is unreachable, migrations fail or the
    /// address cannot be bound.
    pub async fn build(config: Config) -> Result<Self, BootstrapError> {
        info!("Connecting to database...");
        let pool = postgres::connect(&config.database).await?;
        Self::build_with_pool(config, pool).await
    }

    /// Same as [`Self::build`] over an existing pool.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail or the address cannot be bound.
    pub async fn build_with_pool(config: Config, pool: PgPool) -> Result<Self, BootstrapError> {
        postgres::migrate(&pool).await?;
        info!("Database migrations complete");

        let tx_timeout = config.database.transaction_timeout();
        let inventory_store: Arc<dyn InventoryStore> =
            Arc::new(PostgresInventoryStore::new(pool.clone(), tx_timeout));
        let order_store: Arc<dyn OrderStore> = Arc::new(PostgresOrderStore::new(pool, tx_timeout));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let state = AppState::new(
            Arc::clone(&inventory_store),
            order_store,
            Arc::clone(&clock),
            &config,
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let sweeper = ExpirationSweeper::new(
            ReservationManager::new(inventory_store, Arc::clone(&clock), config.reservations.clone()),
            clock,
            Duration::from_secs(config.reservations.sweep_interval_secs),
            shutdown_rx,
        );

        let listener = TcpListener::bind(config.bind_address()).await?;
        info!(address = %config.bind_address(), "Listener bound");

        Ok(Self {
            listener,
            state,
            sweeper,
            shutdown_tx,
            shutdown_timeout: Duration::from_secs(config.server.shutdown_timeout),
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run(self) -> Result<(), BootstrapError> {
        let sweeper = self.sweeper.spawn();

        info!("HTTP server listening for requests");
        axum::serve(self.listener, build_router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped, initiating graceful shutdown...");
        if self.shutdown_tx.send(()).is_err() {
            warn!("Expiration sweeper already stopped");
        }

        match tokio::time::timeout(self.shutdown_timeout, sweeper).await {
            Ok(Ok(())) => info!("Expiration sweeper stopped gracefully"),
            Ok(Err(e)) => warn!(error = %e, "Expiration sweeper task failed"),
            Err(_) => warn!("Expiration sweeper shutdown timed out"),
        }

        info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal, shutting down gracefully..."),
        () = terminate => info!("Received SIGTERM signal, shutting down gracefully..."),
    }
}
