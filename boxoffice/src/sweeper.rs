//! Expiration Sweeper.
//!
//! Background task that periodically expires lapsed holds through
//! [`ReservationManager::expire_reservations`]. It keeps no state of its own
//! beyond the database, so any number of instances may run side by side and a
//! crash mid-sweep is repaired by the next run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::clock::Clock;
use crate::error::Result;
use crate::metrics;
use crate::reservation::{ReservationManager, SweepReport};

/// Periodic expiry worker.
pub struct ExpirationSweeper {
    manager: ReservationManager,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl ExpirationSweeper {
    /// Creates a sweeper that runs every `interval` until `shutdown` fires.
    #[must_use]
    pub fn new(
        manager: ReservationManager,
        clock: Arc<dyn Clock>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            manager,
            clock,
            interval,
            shutdown,
        }
    }

    /// Runs one sweep at the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns an error if due reservations could not be listed.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let started = Instant::now();
        match self.manager.expire_reservations(self.clock.now()).await {
            Ok(report) => {
                metrics::record_sweep(&report, started.elapsed().as_secs_f64());
                Ok(report)
            }
            Err(e) => {
                metrics::record_sweep_failed();
                Err(e)
            }
        }
    }

    /// Spawn the sweeper as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(interval_secs = self.interval.as_secs(), "Expiration sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("Expiration sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Expiration sweep failed, retrying next interval");
                    }
                }
            }
        }

        info!("Expiration sweeper stopped");
    }
}
