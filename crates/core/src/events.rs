//! Entry lifecycle events and listener registration.
//!
//! Listeners observe created/updated/removed/expired events for a cache.
//! Registration returns a [`ListenerHandle`]; invoking it is the only way to
//! stop delivery. Delivery ordering across listeners is unspecified, but each
//! listener sees events in emission order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::entry::CacheEntry;

/// Kind of entry lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Removed,
    Expired,
}

/// An entry lifecycle event delivered to listeners.
#[derive(Debug, Clone)]
pub struct CacheEntryEvent<K, V> {
    pub kind: EventKind,
    pub key: K,
    /// The entry after the mutation; `None` for removals and expirations.
    pub entry: Option<CacheEntry<K, V>>,
}

/// Callback capability for entry lifecycle events.
pub trait CacheEntryListener<K, V>: Send + Sync {
    fn on_event(&self, event: &CacheEntryEvent<K, V>);
}

type Listeners<K, V> = BTreeMap<u64, Arc<dyn CacheEntryListener<K, V>>>;

/// Registry of entry listeners for one cache instance.
pub struct ListenerRegistry<K, V> {
    listeners: Arc<Mutex<Listeners<K, V>>>,
    next_id: AtomicU64,
}

impl<K: 'static, V: 'static> Default for ListenerRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// The cancel closure captures a Weak to the listener map, so the key and
// value types must outlive any handle.
impl<K: 'static, V: 'static> ListenerRegistry<K, V> {
    pub fn new() -> Self {
        Self { listeners: Arc::new(Mutex::new(BTreeMap::new())), next_id: AtomicU64::new(0) }
    }

    fn locked(map: &Mutex<Listeners<K, V>>) -> MutexGuard<'_, Listeners<K, V>> {
        // A poisoned lock only means a listener panicked mid-delivery; the
        // map itself is still consistent.
        match map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a listener; the returned handle deregisters it.
    pub fn register(&self, listener: Arc<dyn CacheEntryListener<K, V>>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Self::locked(&self.listeners).insert(id, listener);
        let weak: Weak<Mutex<Listeners<K, V>>> = Arc::downgrade(&self.listeners);
        ListenerHandle {
            cancel: Box::new(move || {
                if let Some(map) = weak.upgrade() {
                    Self::locked(&map).remove(&id);
                }
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        Self::locked(&self.listeners).is_empty()
    }

    /// Deliver an event to every registered listener.
    pub fn emit(&self, event: &CacheEntryEvent<K, V>) {
        let snapshot: Vec<_> = Self::locked(&self.listeners).values().cloned().collect();
        for listener in snapshot {
            listener.on_event(event);
        }
    }
}

impl<K: 'static, V: 'static> std::fmt::Debug for ListenerRegistry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &Self::locked(&self.listeners).len())
            .finish()
    }
}

/// Cancellation handle for a registered listener.
///
/// Calling [`ListenerHandle::cancel`] deregisters the listener; dropping the
/// handle without calling it leaves the subscription active.
pub struct ListenerHandle {
    cancel: Box<dyn FnOnce() + Send + Sync>,
}

impl ListenerHandle {
    pub fn cancel(self) {
        (self.cancel)();
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting(AtomicUsize);

    impl CacheEntryListener<String, String> for Counting {
        fn on_event(&self, _event: &CacheEntryEvent<String, String>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event() -> CacheEntryEvent<String, String> {
        CacheEntryEvent { kind: EventKind::Created, key: "k".into(), entry: None }
    }

    #[test]
    fn test_register_and_emit() {
        let registry = ListenerRegistry::new();
        let listener = Arc::new(Counting(AtomicUsize::new(0)));
        let _handle = registry.register(listener.clone());

        registry.emit(&event());
        registry.emit(&event());
        assert_eq!(listener.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let registry = ListenerRegistry::new();
        let listener = Arc::new(Counting(AtomicUsize::new(0)));
        let handle = registry.register(listener.clone());

        registry.emit(&event());
        handle.cancel();
        registry.emit(&event());
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handle_outlives_registry() {
        let registry = ListenerRegistry::new();
        let listener = Arc::new(Counting(AtomicUsize::new(0)));
        let handle = registry.register(listener);

        drop(registry);
        // The handle holds only a weak reference; cancelling late is a no-op.
        handle.cancel();
    }

    #[test]
    fn test_cancel_is_scoped_to_one_listener() {
        let registry = ListenerRegistry::new();
        let first = Arc::new(Counting(AtomicUsize::new(0)));
        let second = Arc::new(Counting(AtomicUsize::new(0)));
        let handle = registry.register(first.clone());
        let _keep = registry.register(second.clone());

        handle.cancel();
        registry.emit(&event());
        assert_eq!(first.0.load(Ordering::SeqCst), 0);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }
}
