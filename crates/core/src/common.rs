//! Helpers shared by the in-memory collaborator modules.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use treesync_api::Subscription;

type DynCb<T> = Arc<dyn Fn(T) + 'static + Send + Sync>;

/// Fans values out to callbacks subscribed under a key.
///
/// Callbacks are always invoked with the internal lock released, so a
/// callback may subscribe, unsubscribe or emit without deadlocking.
pub(crate) struct Dispatcher<K, T> {
    inner: Arc<Mutex<DispatcherInner<K, T>>>,
}

struct DispatcherInner<K, T> {
    next_id: u64,
    subs: HashMap<K, HashMap<u64, DynCb<T>>>,
}

impl<K, T> Default for Dispatcher<K, T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DispatcherInner {
                next_id: 0,
                subs: HashMap::new(),
            })),
        }
    }
}

fn lock<K, T>(
    m: &Mutex<DispatcherInner<K, T>>,
) -> MutexGuard<'_, DispatcherInner<K, T>> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl<K, T> Dispatcher<K, T>
where
    K: 'static + Clone + Eq + std::hash::Hash + Send,
    T: 'static + Clone,
{
    /// Register a callback under `key`. Dropping the returned
    /// [Subscription] removes it.
    pub fn subscribe(&self, key: K, cb: DynCb<T>) -> Subscription
    where
        T: Send,
    {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subs.entry(key.clone()).or_default().insert(id, cb);
            id
        };

        let weak: Weak<Mutex<DispatcherInner<K, T>>> =
            Arc::downgrade(&self.inner);
        Subscription::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut inner = lock(&inner);
            if let Some(subs) = inner.subs.get_mut(&key) {
                subs.remove(&id);
                if subs.is_empty() {
                    inner.subs.remove(&key);
                }
            }
        })
    }

    /// Invoke every callback subscribed under `key` with `value`.
    pub fn emit(&self, key: &K, value: T) {
        let cbs: Vec<DynCb<T>> = lock(&self.inner)
            .subs
            .get(key)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default();
        for cb in cbs {
            cb(value.clone());
        }
    }

    /// Number of live subscriptions under `key`.
    pub fn count(&self, key: &K) -> usize {
        lock(&self.inner).subs.get(key).map(|s| s.len()).unwrap_or(0)
    }
}
