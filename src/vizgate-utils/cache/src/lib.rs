//! Caching utilities for Vizgate.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    fetched_at: Instant,
}

struct Slot<V> {
    entry: AsyncMutex<Option<Entry<V>>>,
    /// Bumped by every failed fetch, while the entry lock is held.
    failures: AtomicU64,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            entry: AsyncMutex::new(None),
            failures: AtomicU64::new(0),
        }
    }
}

/// Where a looked-up value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Served from a fresh cache entry.
    Hit,
    /// Produced by the fetch closure and stored.
    Fetched,
}

/// Value returned by [`TtlCache::get_or_try_fetch`].
#[derive(Debug, Clone)]
pub struct Lookup<V> {
    pub value: V,
    pub origin: Origin,
}

/// Why [`TtlCache::get_or_try_fetch`] produced no value.
#[derive(Debug, thiserror::Error)]
pub enum FetchError<E> {
    /// This caller's fetch failed.
    #[error("{0}")]
    Failed(E),
    /// The caller waited on another caller's fetch for the same key, and
    /// that fetch failed.
    #[error("concurrent fetch for the same key failed")]
    Joined,
}

impl<E> FetchError<E> {
    /// The underlying error, if this caller ran the fetch.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Joined => None,
        }
    }
}

/// Observable state of a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Nothing has been stored yet.
    Empty,
    /// Stored and younger than the TTL.
    Fresh,
    /// Stored but older than the TTL.
    Stale,
    /// A fetch currently holds the slot.
    Refreshing,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Fresh => "active",
            Self::Stale => "stale",
            Self::Refreshing => "refreshing",
        }
    }
}

/// Keyed time-to-live cache with single-flight refresh.
///
/// Every key owns an async slot. A caller that misses keeps the slot locked
/// while it fetches, so concurrent misses on the same key wait for that one
/// fetch and then share its outcome: the stored value on success, or
/// [`FetchError::Joined`] on failure. A failed fetch leaves the previous
/// entry in place.
pub struct TtlCache<K, V> {
    ttl: Duration,
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("keys", &self.slots.lock().len())
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> Arc<Slot<V>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    fn is_fresh(&self, entry: &Entry<V>) -> bool {
        entry.fetched_at.elapsed() < self.ttl
    }

    /// Return the fresh value for `key`, or run `fetch` and store its result.
    ///
    /// Nothing is stored when `fetch` fails. Callers that were already
    /// waiting on that failed fetch get [`FetchError::Joined`] instead of
    /// fetching again.
    pub async fn get_or_try_fetch<F, Fut, E>(
        &self,
        key: &K,
        fetch: F,
    ) -> Result<Lookup<V>, FetchError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);
        let failures_seen = slot.failures.load(Ordering::Acquire);
        let mut entry = slot.entry.lock().await;

        if let Some(cached) = entry.as_ref() {
            if self.is_fresh(cached) {
                return Ok(Lookup {
                    value: cached.value.clone(),
                    origin: Origin::Hit,
                });
            }
        }

        if slot.failures.load(Ordering::Acquire) != failures_seen {
            return Err(FetchError::Joined);
        }

        match fetch().await {
            Ok(value) => {
                *entry = Some(Entry {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(Lookup {
                    value,
                    origin: Origin::Fetched,
                })
            }
            Err(e) => {
                slot.failures.fetch_add(1, Ordering::AcqRel);
                Err(FetchError::Failed(e))
            }
        }
    }

    /// Get the value for `key` if it is still fresh.
    pub async fn get(&self, key: &K) -> Option<V> {
        let slot = self.slot(key);
        let entry = slot.entry.lock().await;
        entry
            .as_ref()
            .filter(|e| self.is_fresh(e))
            .map(|e| e.value.clone())
    }

    /// Store a value directly, resetting its age.
    pub async fn insert(&self, key: K, value: V) {
        let slot = self.slot(&key);
        let mut entry = slot.entry.lock().await;
        *entry = Some(Entry {
            value,
            fetched_at: Instant::now(),
        });
    }

    /// Drop the entry for `key`.
    pub async fn invalidate(&self, key: &K) {
        let slot = self.slot(key);
        let mut entry = slot.entry.lock().await;
        *entry = None;
    }

    /// Report the state of `key` without waiting on an in-flight fetch.
    pub fn state(&self, key: &K) -> EntryState {
        let Some(slot) = self.slots.lock().get(key).cloned() else {
            return EntryState::Empty;
        };

        match slot.entry.try_lock() {
            Ok(entry) => match entry.as_ref() {
                None => EntryState::Empty,
                Some(e) if self.is_fresh(e) => EntryState::Fresh,
                Some(_) => EntryState::Stale,
            },
            Err(_) => EntryState::Refreshing,
        }
    }
}
