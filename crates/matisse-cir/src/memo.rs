// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Memo map with atomic get-or-build.
//!
//! At most one build runs per key. Other threads asking for a key that is
//! being built wait for it; the building thread asking for its own key
//! again gets the recursion error. Values are inserted only when the build
//! succeeds; a failed or panicking build leaves no entry behind.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

enum Slot<V> {
    Building(ThreadId),
    Ready(Arc<V>),
}

pub struct BuildCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
    settled: Condvar,
}

impl<K, V> Default for BuildCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            settled: Condvar::new(),
        }
    }
}

/// Removes an unfinished slot if the build does not commit.
struct PendingSlot<'a, K: Eq + Hash + Clone, V> {
    cache: &'a BuildCache<K, V>,
    key: K,
    committed: bool,
}

impl<K: Eq + Hash + Clone, V> Drop for PendingSlot<'_, K, V> {
    fn drop(&mut self) {
        if !self.committed {
            self.cache.lock().remove(&self.key);
            self.cache.settled.notify_all();
        }
    }
}

impl<K: Eq + Hash + Clone, V> BuildCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        match self.lock().get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether the current thread is building `key`.
    pub fn is_building(&self, key: &K) -> bool {
        matches!(self.lock().get(key), Some(Slot::Building(owner)) if *owner == thread::current().id())
    }

    /// Returns the cached value for `key`, building it with `build` if absent.
    ///
    /// `on_recursion` produces the error returned when the current thread is
    /// already building `key`.
    pub fn get_or_try_build<E>(
        &self,
        key: &K,
        build: impl FnOnce() -> Result<V, E>,
        on_recursion: impl FnOnce() -> E,
    ) -> Result<Arc<V>, E> {
        let me = thread::current().id();
        let mut slots = self.lock();
        loop {
            match slots.get(key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Building(owner)) if *owner == me => return Err(on_recursion()),
                Some(Slot::Building(_)) => {
                    slots = self
                        .settled
                        .wait(slots)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                None => break,
            }
        }
        slots.insert(key.clone(), Slot::Building(me));
        drop(slots);

        let mut pending = PendingSlot {
            cache: self,
            key: key.clone(),
            committed: false,
        };
        let value = Arc::new(build()?);
        self.lock().insert(key.clone(), Slot::Ready(value.clone()));
        pending.committed = true;
        self.settled.notify_all();
        Ok(value)
    }

    /// Completed entries.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<Arc<V>> {
        self.lock()
            .values()
            .filter_map(|s| match s {
                Slot::Ready(v) => Some(v.clone()),
                Slot::Building(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().retain(|_, s| matches!(s, Slot::Building(_)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn builds_once() {
        let cache: BuildCache<u32, String> = BuildCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = cache
                .get_or_try_build(
                    &1,
                    || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ()>("one".to_string())
                    },
                    || (),
                )
                .unwrap();
            assert_eq!(*v, "one");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failure_leaves_no_entry() {
        let cache: BuildCache<u32, u32> = BuildCache::new();
        let r = cache.get_or_try_build(&1, || Err("boom"), || "recursive");
        assert_eq!(r.err(), Some("boom"));
        assert!(cache.get(&1).is_none());
        let r = cache.get_or_try_build(&1, || Ok::<_, &str>(5), || "recursive");
        assert_eq!(*r.unwrap(), 5);
    }

    #[test]
    fn same_thread_reentry_is_recursion() {
        let cache: BuildCache<u32, u32> = BuildCache::new();
        let r = cache.get_or_try_build(
            &1,
            || {
                assert!(cache.is_building(&1));
                cache.get_or_try_build(&1, || Ok(2), || "recursive").map(|v| *v)
            },
            || "recursive",
        );
        assert_eq!(r.err(), Some("recursive"));
        assert!(cache.is_empty());
    }

    #[test]
    fn nested_different_keys() {
        let cache: BuildCache<u32, u32> = BuildCache::new();
        let r = cache.get_or_try_build(
            &1,
            || {
                let inner = cache.get_or_try_build(&2, || Ok::<_, ()>(20), || ())?;
                Ok(*inner + 1)
            },
            || (),
        );
        assert_eq!(*r.unwrap(), 21);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_requests_build_once() {
        let cache: Arc<BuildCache<u32, u32>> = Arc::new(BuildCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    let v = cache
                        .get_or_try_build(
                            &7,
                            || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(std::time::Duration::from_millis(10));
                                Ok::<_, ()>(49)
                            },
                            || (),
                        )
                        .unwrap();
                    *v
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 49);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
