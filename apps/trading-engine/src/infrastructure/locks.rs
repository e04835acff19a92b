//! Per-key exclusive sections.
//!
//! Each family hands out one async mutex per key, created on first use.
//! The registry map itself sits behind a single short-lived std mutex so
//! creation never races; the per-key mutex is then awaited outside it, so
//! unrelated keys never block each other.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::shared::{OrderId, SagaUid, SecurityId, UserId};

/// Lazily populated map of async mutexes keyed by `K`.
pub struct KeyedLocks<K> {
    entries: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> fmt::Debug for KeyedLocks<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.entries.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("KeyedLocks").field("keys", &keys).finish()
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// The section lasts until the returned guard is dropped.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let handle = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(key.clone()).or_default())
        };
        handle.lock_owned().await
    }

    /// Lock every distinct key in `keys`, in ascending key order.
    ///
    /// Callers that need several keys of one family go through here so two
    /// of them never wait on each other's second key.
    pub async fn lock_all(&self, keys: impl IntoIterator<Item = K>) -> Vec<OwnedMutexGuard<()>>
    where
        K: Ord,
    {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Drop the entry for `key` if nobody holds or awaits it.
    ///
    /// Returns whether the entry was removed.
    pub fn release(&self, key: &K) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(handle) if Arc::strong_count(handle) == 1 => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Number of keys with a live entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no key has an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The four disjoint lock families.
///
/// Security, order and actuary keys are never evicted. Saga keys are
/// released when their saga state is removed.
///
/// Acquisition order: order, saga, security, actuary. A task holding a
/// later family never waits on an earlier one.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    /// Guards portfolio and order-row mutation for one security.
    pub securities: KeyedLocks<SecurityId>,
    /// Guards one order's multi-step matching loop.
    pub orders: KeyedLocks<OrderId>,
    /// Guards saga phase read-modify-write.
    pub sagas: KeyedLocks<SagaUid>,
    /// Guards one actuary's credit usage across securities.
    pub actuaries: KeyedLocks<UserId>,
}

impl ResourceLocks {
    /// Create empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::<u64>::new());
        let guard = locks.lock(&1).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock(&1).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::<u64>::new();
        let _a = locks.lock(&1).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&2)).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn families_are_disjoint() {
        let locks = ResourceLocks::new();
        let _security = locks.securities.lock(&SecurityId::new(7)).await;
        let order = tokio::time::timeout(Duration::from_millis(50), locks.orders.lock(&OrderId::new(7))).await;
        assert!(order.is_ok());
    }

    #[tokio::test]
    async fn release_skips_held_entries() {
        let locks = KeyedLocks::<SagaUid>::new();
        let uid = SagaUid::from("OTC-1-1");
        let guard = locks.lock(&uid).await;
        assert!(!locks.release(&uid));
        drop(guard);
        assert!(locks.release(&uid));
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn lock_all_orders_and_dedups_keys() {
        let locks = Arc::new(KeyedLocks::<u64>::new());
        let guards = locks.lock_all([3, 1, 3]).await;
        assert_eq!(guards.len(), 2);

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.lock_all([1, 3]).await.len() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guards);
        assert_eq!(contender.await.unwrap(), 2);
    }

    proptest! {
        #[test]
        fn never_two_holders_of_one_key(tasks in 2usize..12, keys in 1u64..4) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let locks = Arc::new(KeyedLocks::<u64>::new());
                let inside: Arc<Vec<AtomicUsize>> =
                    Arc::new((0..keys).map(|_| AtomicUsize::new(0)).collect());
                let mut handles = Vec::new();
                for i in 0..tasks {
                    let locks = Arc::clone(&locks);
                    let inside = Arc::clone(&inside);
                    let key = i as u64 % keys;
                    handles.push(tokio::spawn(async move {
                        let _g = locks.lock(&key).await;
                        let slot = &inside[key as usize];
                        assert_eq!(slot.fetch_add(1, Ordering::SeqCst), 0);
                        tokio::task::yield_now().await;
                        slot.fetch_sub(1, Ordering::SeqCst);
                    }));
                }
                for handle in handles {
                    handle.await.unwrap();
                }
            });
        }
    }
}
