//! In-memory implementations of the storage and pricing seams for tests.
//!
//! Each store keeps its state behind one mutex, so every method is atomic in
//! the same way a single database transaction is: changes are computed on a
//! copy and written back only when every step succeeded.

pub mod clock;
pub mod inventory;
pub mod orders;
pub mod pricing;

pub use clock::FixedClock;
pub use inventory::InMemoryInventoryStore;
pub use orders::InMemoryOrderStore;
pub use pricing::StaticPricing;

use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, TicketingError};
use crate::store::StoreFuture;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| TicketingError::Storage("in-memory store lock poisoned".to_string()))
}

fn ready<T: Send + 'static>(result: Result<T>) -> StoreFuture<'static, T> {
    Box::pin(std::future::ready(result))
}
