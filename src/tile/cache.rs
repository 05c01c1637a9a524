//! Cache of encoded tiles.
//!
//! Decoding a tile and encoding it again costs far more than keeping the
//! result, so encoded tiles are kept in an LRU bounded by total byte size.
//! Entries are keyed by pyramid, level, tile and output encoding.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

use super::encoder::ImageEncoding;

/// Default cache capacity: 100MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Upper bound on entries, whatever their size.
const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub pyramid_id: Arc<str>,
    pub level: usize,
    pub col: u32,
    pub row: u32,
    pub encoding: ImageEncoding,
}

impl TileCacheKey {
    pub fn new(
        pyramid_id: impl Into<Arc<str>>,
        level: usize,
        col: u32,
        row: u32,
        encoding: ImageEncoding,
    ) -> Self {
        Self {
            pyramid_id: pyramid_id.into(),
            level,
            col,
            row,
            encoding,
        }
    }
}

struct CacheState {
    entries: LruCache<TileCacheKey, Bytes>,
    size: usize,
}

/// Size-bounded LRU of encoded tiles, shareable across tasks.
pub struct TileCache {
    state: Mutex<CacheState>,
    max_size: usize,
}

impl TileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Cache holding at most `max_size` bytes of tiles.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)),
                size: 0,
            }),
            max_size,
        }
    }

    /// Look up a tile, marking it recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        self.state.lock().await.entries.get(key).cloned()
    }

    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        self.state.lock().await.entries.contains(key)
    }

    /// Store a tile, evicting least recently used tiles until the cache fits.
    ///
    /// A tile larger than the whole capacity is not stored.
    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        if data.len() > self.max_size {
            return;
        }
        let mut state = self.state.lock().await;
        let added = data.len();

        if let Some((_, old)) = state.entries.push(key, data) {
            state.size = state.size.saturating_sub(old.len());
        }
        state.size += added;

        while state.size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => state.size = state.size.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    pub async fn remove(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut state = self.state.lock().await;
        let data = state.entries.pop(key)?;
        state.size = state.size.saturating_sub(data.len());
        Some(data)
    }

    /// Drop every tile of one pyramid.
    pub async fn invalidate_pyramid(&self, pyramid_id: &str) -> usize {
        let mut state = self.state.lock().await;
        let keys: Vec<TileCacheKey> = state
            .entries
            .iter()
            .filter(|(key, _)| &*key.pyramid_id == pyramid_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            if let Some(data) = state.entries.pop(key) {
                state.size = state.size.saturating_sub(data.len());
            }
        }
        keys.len()
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.size = 0;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Total bytes currently cached.
    pub async fn size(&self) -> usize {
        self.state.lock().await.size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}
