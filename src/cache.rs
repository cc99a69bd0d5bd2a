//! At-most-once loading of immutable documents (dataset listing, schemas).
//!
//! The first caller for a key starts the load; callers arriving while it is in
//! flight await the same shared future. A successful load is kept for the lifetime
//! of the cache, a failed one is forgotten so the next call can try again.

use crate::error::Result;
use ahash::AHashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V>>>;

enum Slot<V: Clone> {
    Pending(SharedLoad<V>),
    Ready(V),
}

pub(crate) struct SharedCache<K, V: Clone> {
    slots: Mutex<AHashMap<K, Slot<V>>>,
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(AHashMap::new()),
        }
    }

    /// Value for `key`, loading it with `load` unless it is cached or in flight.
    pub async fn get_or_load<F>(self: &Arc<Self>, key: K, load: F) -> Result<V>
    where
        F: FnOnce() -> BoxFuture<'static, Result<V>>,
    {
        let shared = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            match slots.get(&key) {
                Some(Slot::Ready(v)) => return Ok(v.clone()),
                Some(Slot::Pending(s)) => s.clone(),
                None => {
                    let cache = Arc::clone(self);
                    let fut = load();
                    let settle_key = key.clone();
                    let shared = async move {
                        let result = fut.await;
                        cache.settle(&settle_key, &result);
                        result
                    }
                    .boxed()
                    .shared();
                    slots.insert(key, Slot::Pending(shared.clone()));
                    shared
                }
            }
        };
        shared.await
    }

    fn settle(&self, key: &K, result: &Result<V>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(v) => {
                slots.insert(key.clone(), Slot::Ready(v.clone()));
            }
            Err(_) => {
                slots.remove(key);
            }
        }
    }

    /// Already loaded value, without touching the network.
    pub fn get(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(key) {
            Some(Slot::Ready(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn ready_keys(&self) -> Vec<K> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Ready(_)))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_loads_share_one_call() {
        let cache: Arc<SharedCache<String, u32>> = Arc::new(SharedCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let load = || {
            let calls = Arc::clone(&calls);
            move || -> BoxFuture<'static, Result<u32>> {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok(7)
                }
                .boxed()
            }
        };
        let (a, b) = tokio::join!(
            cache.get_or_load("x".into(), load()),
            cache.get_or_load("x".into(), load())
        );
        assert_eq!((a.unwrap(), b.unwrap()), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&"x".to_string()), Some(7));
        assert_eq!(cache.get_or_load("x".into(), load()).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache: Arc<SharedCache<(), u32>> = Arc::new(SharedCache::new());
        let err = cache
            .get_or_load((), || async { Err(Error::Transport("down".into())) }.boxed())
            .await
            .unwrap_err();
        assert_eq!(err, Error::Transport("down".into()));
        assert!(cache.get(&()).is_none());
        let ok = cache.get_or_load((), || async { Ok(1) }.boxed()).await;
        assert_eq!(ok, Ok(1));
        assert_eq!(cache.ready_keys(), vec![()]);
    }
}
