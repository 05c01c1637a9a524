//! Registry of opened pyramids.
//!
//! Opening a pyramid walks its directory chain and loads every level's tile
//! offsets, so opened stores are kept in an LRU cache keyed by content id.
//! Concurrent requests for a pyramid that is still being opened wait for the
//! first open instead of starting their own.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::debug;

use crate::error::{IoError, PyramidError};
use crate::io::RangeReader;

use super::store::PyramidStore;

/// Default number of opened pyramids kept in memory.
pub const DEFAULT_PYRAMID_CACHE_CAPACITY: usize = 64;

// =============================================================================
// ContentSource
// =============================================================================

/// One page of content identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentList {
    pub ids: Vec<String>,
    /// Pass back as `cursor` to fetch the next page
    pub next_cursor: Option<String>,
}

/// Where pyramid bytes come from.
///
/// The registry only needs to turn an identifier into a range reader and to
/// enumerate identifiers; storage layout is up to the implementation.
#[async_trait]
pub trait ContentSource: Send + Sync {
    type Reader: RangeReader + 'static;

    /// Create a range reader for a content id.
    ///
    /// Unknown ids must fail with [`IoError::NotFound`].
    async fn create_reader(&self, id: &str) -> Result<Self::Reader, IoError>;

    /// List up to `limit` ids, sorted, starting after `cursor`.
    async fn list(&self, limit: usize, cursor: Option<&str>) -> Result<ContentList, IoError>;
}

// =============================================================================
// PyramidRegistry
// =============================================================================

type OpenResult<R> = Result<Arc<PyramidStore<R>>, PyramidError>;

struct InFlightState<R: RangeReader + 'static> {
    notify: Notify,
    result: Mutex<Option<OpenResult<R>>>,
}

/// LRU cache of opened pyramids in front of a [`ContentSource`].
pub struct PyramidRegistry<S: ContentSource> {
    source: S,
    cache: RwLock<LruCache<String, Arc<PyramidStore<S::Reader>>>>,
    in_flight: Mutex<HashMap<String, Arc<InFlightState<S::Reader>>>>,
}

impl<S: ContentSource> PyramidRegistry<S> {
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, DEFAULT_PYRAMID_CACHE_CAPACITY)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(source: S, capacity: usize) -> Self {
        Self {
            source,
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get an opened pyramid, opening it on first access.
    pub async fn get(&self, id: &str) -> OpenResult<S::Reader> {
        {
            let mut cache = self.cache.write().await;
            if let Some(store) = cache.get(id) {
                return Ok(store.clone());
            }
        }

        loop {
            let state = {
                let mut in_flight = self.in_flight.lock().await;

                if let Some(state) = in_flight.get(id) {
                    state.clone()
                } else {
                    let state = Arc::new(InFlightState {
                        notify: Notify::new(),
                        result: Mutex::new(None),
                    });
                    in_flight.insert(id.to_string(), state.clone());
                    drop(in_flight);

                    let result = self.open(id).await;

                    *state.result.lock().await = Some(result.clone());
                    if let Ok(ref store) = result {
                        self.cache.write().await.put(id.to_string(), store.clone());
                    }

                    self.in_flight.lock().await.remove(id);
                    state.notify.notify_waiters();

                    return result;
                }
            };

            // Register interest before checking, so a notification sent in
            // between is not lost.
            let notified = state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let guard = state.result.lock().await;
            if let Some(ref result) = *guard {
                return result.clone();
            }
            drop(guard);
            notified.await;

            let guard = state.result.lock().await;
            if let Some(ref result) = *guard {
                return result.clone();
            }
            drop(guard);
        }
    }

    async fn open(&self, id: &str) -> OpenResult<S::Reader> {
        let reader = self.source.create_reader(id).await?;
        let store = PyramidStore::from_reader(reader).await?;
        debug!(id, levels = store.level_count(), "pyramid cached");
        Ok(Arc::new(store))
    }

    /// Drop a pyramid from the cache so the next access reopens it.
    pub async fn invalidate(&self, id: &str) {
        self.cache.write().await.pop(id);
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}
