//! Fixed-size striped key locks.
//!
//! Keys hash to one of N mutual-exclusion stripes, sized by the configured
//! concurrency level. A higher level reduces false contention between
//! unrelated keys at the cost of memory. Acquisition waits are bounded:
//! expiry is a recoverable [`StoreError::LockTimeout`], not corruption.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;

/// Striped lock table serializing per-key read-modify-write sequences.
#[derive(Debug)]
pub struct KeyLockManager {
    stripes: Vec<Arc<Mutex<()>>>,
    timeout: Duration,
}

impl KeyLockManager {
    pub fn new(concurrency_level: usize, timeout: Duration) -> Self {
        let stripes = (0..concurrency_level.max(1)).map(|_| Arc::new(Mutex::new(()))).collect();
        Self { stripes, timeout }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_for<K: Hash + ?Sized>(&self, key: &K) -> Arc<Mutex<()>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.stripes.len();
        Arc::clone(&self.stripes[index])
    }

    /// Acquire the stripe for `key`, waiting at most the configured timeout.
    ///
    /// The returned guard releases the stripe on drop, whether the guarded
    /// operation succeeded or failed.
    pub async fn lock<K: Hash + ?Sized>(&self, key: &K) -> Result<KeyGuard, StoreError> {
        let stripe = self.stripe_for(key);
        match tokio::time::timeout(self.timeout, stripe.lock_owned()).await {
            Ok(guard) => Ok(KeyGuard { _guard: guard }),
            Err(_) => Err(StoreError::LockTimeout { timeout_ms: self.timeout.as_millis() as u64 }),
        }
    }
}

/// Holds one stripe; released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}
