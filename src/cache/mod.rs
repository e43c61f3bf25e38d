//! Read-through query cache with stale-while-revalidate semantics.
//!
//! - A fresh entry is returned without touching the network.
//! - [`QueryCache::invalidate`] marks an entry stale but keeps its value; the
//!   next `get` returns that value immediately and refetches in the background.
//! - At most one fetch per key is in flight; concurrent callers share it.
//! - Every entry carries a generation. Invalidation bumps it, and a fetch that
//!   started under an older generation stores its value but leaves the entry
//!   stale, so a read racing a write never masks the write.
//! - Each fetch carries an id. A fetch only updates the entry while it is that
//!   entry's in-flight fetch, so one started before [`QueryCache::clear`]
//!   cannot land in an entry created afterwards.

pub mod queries;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};

pub use self::queries::{GalleryQueries, QueryError};
use crate::types::EventId;

/// Structured cache key: the query name plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    EventsList,
    EventAssets(EventId),
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::EventsList => f.write_str("events-list"),
            QueryKey::EventAssets(id) => write!(f, "event-assets/{id}"),
        }
    }
}

/// Marks cached reads stale after a write. The pipeline depends on this
/// rather than on a concrete cache.
pub trait Invalidate: Send + Sync {
    /// Mark `key` stale. Returns whether an entry existed.
    fn invalidate(&self, key: &QueryKey) -> bool;
}

/// Copy of an entry handed to external readers.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot<V> {
    pub value: Option<V>,
    pub fresh: bool,
}

type FetchResult<V, E> = Result<V, Arc<E>>;
type InFlight<V, E> = Shared<BoxFuture<'static, FetchResult<V, E>>>;

struct Fetch<V, E> {
    id: u64,
    handle: InFlight<V, E>,
}

struct Entry<V, E> {
    value: Option<V>,
    fresh: bool,
    generation: u64,
    in_flight: Option<Fetch<V, E>>,
}

impl<V, E> Default for Entry<V, E> {
    fn default() -> Self {
        Self {
            value: None,
            fresh: false,
            generation: 0,
            in_flight: None,
        }
    }
}

type Entries<V, E> = Arc<Mutex<HashMap<QueryKey, Entry<V, E>>>>;

pub struct QueryCache<V, E> {
    entries: Entries<V, E>,
    next_fetch: AtomicU64,
}

impl<V, E> Default for QueryCache<V, E> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_fetch: AtomicU64::new(0),
        }
    }
}

impl<V, E> fmt::Debug for QueryCache<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &lock(&self.entries).len())
            .finish()
    }
}

/// Entries are plain data with no cross-field invariant a panic could break
/// halfway, so a poisoned lock is still safe to use.
fn lock<V, E>(entries: &Entries<V, E>) -> MutexGuard<'_, HashMap<QueryKey, Entry<V, E>>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V, E> QueryCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value for `key`, fetching it with `fetcher` when needed.
    ///
    /// `fetcher` is only called when no fetch for `key` is already in flight.
    /// Must be called from within a Tokio runtime: fetches are spawned so
    /// they run to completion even if every caller goes away.
    pub async fn get<F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<V, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let pending = {
            let mut entries = lock(&self.entries);
            let entry = entries.entry(key.clone()).or_default();

            if entry.fresh {
                if let Some(value) = &entry.value {
                    return Ok(value.clone());
                }
            }

            let joined = entry.in_flight.as_ref().map(|fetch| fetch.handle.clone());
            let in_flight = match joined {
                Some(handle) => handle,
                None => {
                    let id = self.next_fetch.fetch_add(1, Ordering::Relaxed);
                    let handle = spawn_fetch(
                        Arc::clone(&self.entries),
                        key.clone(),
                        id,
                        entry.generation,
                        fetcher(),
                    );
                    entry.in_flight = Some(Fetch {
                        id,
                        handle: handle.clone(),
                    });
                    handle
                }
            };

            if let Some(stale) = &entry.value {
                tracing::debug!(key = %key, "Serving stale value while refetching");
                return Ok(stale.clone());
            }
            in_flight
        };

        pending.await
    }

    /// Mark `key` stale without evicting its value.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut entries = lock(&self.entries);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.fresh = false;
                entry.generation += 1;
                tracing::debug!(key = %key, generation = entry.generation, "Invalidated cache entry");
                true
            }
            None => false,
        }
    }

    /// Copy of the current entry for `key`, if any.
    pub fn peek(&self, key: &QueryKey) -> Option<CacheSnapshot<V>> {
        lock(&self.entries).get(key).map(|entry| CacheSnapshot {
            value: entry.value.clone(),
            fresh: entry.fresh,
        })
    }

    /// Drop every entry. In-flight fetches complete but find nothing to update.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

impl<V, E> Invalidate for QueryCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    fn invalidate(&self, key: &QueryKey) -> bool {
        QueryCache::invalidate(self, key)
    }
}

/// Start a fetch on the runtime and return a handle every caller can await.
fn spawn_fetch<V, E, Fut>(
    entries: Entries<V, E>,
    key: QueryKey,
    id: u64,
    generation: u64,
    fetch: Fut,
) -> InFlight<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    tracing::debug!(key = %key, fetch = id, "Fetching");
    let shared = async move {
        let result = fetch.await.map_err(Arc::new);
        complete(&entries, &key, id, generation, &result);
        result
    }
    .boxed()
    .shared();

    tokio::spawn(shared.clone());
    shared
}

fn complete<V, E>(
    entries: &Entries<V, E>,
    key: &QueryKey,
    id: u64,
    generation: u64,
    result: &FetchResult<V, E>,
) where
    V: Clone,
    E: fmt::Display,
{
    let mut entries = lock(entries);
    let Some(entry) = entries
        .get_mut(key)
        .filter(|entry| entry.in_flight.as_ref().is_some_and(|f| f.id == id))
    else {
        tracing::debug!(key = %key, fetch = id, "Entry cleared during fetch, dropping result");
        return;
    };
    entry.in_flight = None;
    match result {
        Ok(value) => {
            entry.value = Some(value.clone());
            entry.fresh = entry.generation == generation;
            if !entry.fresh {
                tracing::debug!(key = %key, "Entry invalidated during fetch, keeping it stale");
            }
        }
        Err(e) if entry.value.is_some() => {
            tracing::warn!(key = %key, error = %e, "Background refetch failed, keeping stale value");
        }
        Err(e) => {
            tracing::debug!(key = %key, error = %e, "Fetch failed");
        }
    }
}
