//! Time source abstraction.
//!
//! Every timestamp the box office persists (`created_at`, `expires_at`,
//! `last_updated`, order dates) comes from an injected [`Clock`] so holds
//! can be expired deterministically in tests.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
