use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::CustomerId;

type LockMap = DashMap<CustomerId, Arc<Mutex<()>>>;

/// Registry of per-customer exclusive locks.
///
/// Holds only mutexes, never balances. A customer's entry is evicted as soon as
/// no task holds or waits for its lock.
#[derive(Default)]
pub struct CustomerLocks {
    locks: Arc<LockMap>,
}

/// Exclusive access to one customer until dropped.
pub struct CustomerGuard {
    // Declared first so the mutex is released before the slot tries to evict it.
    _guard: OwnedMutexGuard<()>,
    _slot: Slot,
}

struct Slot {
    customer_id: CustomerId,
    mutex: Arc<Mutex<()>>,
    locks: Arc<LockMap>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        // One reference in the map and one here: nobody else is interested.
        self.locks
            .remove_if(&self.customer_id, |_, m| Arc::strong_count(m) <= 2);
    }
}

impl CustomerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the customer's lock. Cancelling the wait leaves no lock held.
    pub async fn lock(&self, customer_id: CustomerId) -> CustomerGuard {
        let mutex = self.locks.entry(customer_id).or_default().clone();
        let slot = Slot {
            customer_id,
            mutex,
            locks: Arc::clone(&self.locks),
        };

        let guard = match Arc::clone(&slot.mutex).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(%customer_id, "waiting for customer lock");
                Arc::clone(&slot.mutex).lock_owned().await
            }
        };

        CustomerGuard {
            _guard: guard,
            _slot: slot,
        }
    }

    /// Number of customers currently locked or awaited.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
