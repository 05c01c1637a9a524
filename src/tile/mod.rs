//! Tile delivery layer.
//!
//! [`TileSource`] is the one interface display code needs, implemented over
//! pyramid files ([`PyramidSource`]) and streamed frames
//! ([`StreamFrameSource`]). On top of it the [`TileService`] answers HTTP
//! requests for pyramid tiles:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  TileEncoder    │  │
//! │  │  (encoded    │  │  (PNG / JPEG)   │  │
//! │  │   tiles)     │  │                 │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     PyramidRegistry → PyramidSource     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tilewall::tile::{ImageEncoding, TileCache, TileCacheKey};
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = TileCache::with_capacity(50 * 1024 * 1024);
//!     let key = TileCacheKey::new("wall.tif", 0, 1, 2, ImageEncoding::Png);
//!
//!     if cache.get(&key).await.is_none() {
//!         cache.put(key, Bytes::from_static(b"png bytes")).await;
//!     }
//! }
//! ```

mod cache;
mod encoder;
mod service;
mod source;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use encoder::{
    clamp_quality, is_valid_quality, ImageEncoding, TileEncoder, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use service::{
    LevelSelection, PyramidMetadata, RegionResponse, TileRequest, TileResponse, TileService,
    MAX_REGION_PIXELS,
};
pub use source::{
    compose_viewport, PyramidSource, PyramidTileKey, StreamFrameSource, TileSource, ViewportImage,
};
