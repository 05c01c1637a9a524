//! Tile Service for orchestrating tile generation.
//!
//! The TileService is the main entry point for tile requests. It orchestrates:
//! - Request validation
//! - Cache lookups
//! - Pyramid access via the registry
//! - Decoding on blocking workers
//! - PNG / JPEG encoding
//! - Result caching
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Validate params   4. Read + decode tile             │    │
//! │  │  2. Check cache       5. Encode                         │    │
//! │  │  3. Get pyramid       6. Cache & return                 │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐     ┌────────────────┐    ┌──────────────┐     │
//! │    │ TileCache │     │PyramidRegistry │    │ TileEncoder  │     │
//! │    └───────────┘     └────────────────┘    └──────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::error::{PyramidError, TileError};
use crate::geometry::{Rect, Size};
use crate::pixel::PixelBuffer;
use crate::pyramid::{ContentList, ContentSource, LevelGeometry, LevelPolicy, PyramidRegistry};

use super::cache::{TileCache, TileCacheKey};
use super::encoder::{is_valid_quality, ImageEncoding, TileEncoder};
use super::source::{compose_viewport, PyramidSource, PyramidTileKey, TileSource};

/// Largest region, in pixels, a single region request may compose.
pub const MAX_REGION_PIXELS: u64 = 4096 * 4096;

// =============================================================================
// Requests and responses
// =============================================================================

/// A request for one tile of one pyramid level.
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Content identifier of the pyramid
    pub pyramid_id: String,

    /// Pyramid level (0 = full resolution)
    pub level: usize,

    pub col: u32,
    pub row: u32,

    pub encoding: ImageEncoding,

    /// Serve a blank tile instead of failing when the tile data is unreadable
    pub blank_on_error: bool,
}

impl TileRequest {
    /// PNG tile request.
    pub fn new(pyramid_id: impl Into<String>, level: usize, col: u32, row: u32) -> Self {
        Self {
            pyramid_id: pyramid_id.into(),
            level,
            col,
            row,
            encoding: ImageEncoding::Png,
            blank_on_error: false,
        }
    }

    pub fn with_encoding(mut self, encoding: ImageEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_blank_on_error(mut self, blank_on_error: bool) -> Self {
        self.blank_on_error = blank_on_error;
        self
    }
}

/// An encoded image produced by the service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub data: Bytes,

    /// Whether this tile was served from cache
    pub cache_hit: bool,

    pub encoding: ImageEncoding,

    /// The tile could not be read and was replaced by a blank one
    pub blank: bool,
}

/// A composed region of one level.
#[derive(Debug, Clone)]
pub struct RegionResponse {
    pub data: Bytes,
    pub encoding: ImageEncoding,
    /// Area actually composed, after clipping to the level
    pub region: Rect,
    /// Tiles left blank because they could not be read
    pub missing_tiles: usize,
}

/// Structure of an opened pyramid.
#[derive(Debug, Clone, Serialize)]
pub struct PyramidMetadata {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub level_count: usize,
    pub bigtiff: bool,
    /// Canonical pixel format of level 0 tiles, when supported
    pub pixel_format: Option<&'static str>,
    pub description: Option<String>,
    pub levels: Vec<LevelGeometry>,
}

/// Outcome of a level selection.
#[derive(Debug, Clone, Serialize)]
pub struct LevelSelection {
    pub target: Size,
    pub policy: LevelPolicy,
    pub level: usize,
    pub geometry: LevelGeometry,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service for generating and caching tiles.
///
/// # Type Parameters
///
/// * `S` - Where pyramid files come from (e.g. [`LocalContentSource`](crate::pyramid::LocalContentSource))
pub struct TileService<S: ContentSource> {
    registry: Arc<PyramidRegistry<S>>,

    /// Cache for encoded tiles
    cache: TileCache,

    encoder: TileEncoder,
}

impl<S: ContentSource> TileService<S> {
    /// Create a tile service with the default tile cache capacity (100MB).
    pub fn new(registry: PyramidRegistry<S>) -> Self {
        Self::with_shared_registry(Arc::new(registry))
    }

    /// Create a tile service over a registry shared with other components.
    pub fn with_shared_registry(registry: Arc<PyramidRegistry<S>>) -> Self {
        Self {
            registry,
            cache: TileCache::new(),
            encoder: TileEncoder::new(),
        }
    }

    /// Create a tile service with a custom tile cache capacity in bytes.
    pub fn with_cache_capacity(registry: PyramidRegistry<S>, cache_capacity: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            cache: TileCache::with_capacity(cache_capacity),
            encoder: TileEncoder::new(),
        }
    }

    /// Get an encoded tile, using the cache when possible.
    ///
    /// Tiles are cropped to the part that lies inside the level image. Blank
    /// replacements for unreadable tiles are never cached.
    ///
    /// # Errors
    ///
    /// - the pyramid cannot be found or opened
    /// - the level or tile coordinates are out of range
    /// - the tile cannot be decoded and `blank_on_error` is not set
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        check_encoding(request.encoding)?;

        let cache_key = TileCacheKey::new(
            request.pyramid_id.as_str(),
            request.level,
            request.col,
            request.row,
            request.encoding,
        );
        if let Some(data) = self.cache.get(&cache_key).await {
            return Ok(TileResponse {
                data,
                cache_hit: true,
                encoding: request.encoding,
                blank: false,
            });
        }

        let (pixels, blank) = self.generate_tile(&request).await?;
        let data = self.encoder.encode(&pixels, request.encoding)?;
        if !blank {
            self.cache.put(cache_key, data.clone()).await;
        }

        Ok(TileResponse {
            data,
            cache_hit: false,
            encoding: request.encoding,
            blank,
        })
    }

    /// Decode a tile without touching the cache.
    ///
    /// Returns the pixels and whether they are a blank replacement.
    pub async fn generate_tile(
        &self,
        request: &TileRequest,
    ) -> Result<(PixelBuffer, bool), TileError> {
        let store = self.registry.get(&request.pyramid_id).await?;
        let key = PyramidTileKey::new(request.level, request.col, request.row);
        let source = PyramidSource::new(Arc::clone(&store));
        let rect = source.tile_rect(key)?;

        match source.tile_at(key).await {
            Ok(pixels) => Ok((pixels, false)),
            Err(TileError::Pyramid(err)) if request.blank_on_error && is_tile_data_error(&err) => {
                debug!(
                    pyramid = %request.pyramid_id,
                    level = request.level,
                    col = request.col,
                    row = request.row,
                    "serving blank tile"
                );
                let blank = store
                    .blank_tile(request.level)
                    .crop(Rect::new(0, 0, rect.width, rect.height));
                Ok((blank, true))
            }
            Err(err) => Err(err),
        }
    }

    /// Encoded thumbnail: the first tile of the top level, cropped.
    pub async fn thumbnail(
        &self,
        pyramid_id: &str,
        encoding: ImageEncoding,
    ) -> Result<Bytes, TileError> {
        check_encoding(encoding)?;
        let store = self.registry.get(pyramid_id).await?;
        let pixels = store.read_thumbnail().await?;
        self.encoder.encode(&pixels, encoding)
    }

    /// Compose a region of one level into a single image.
    ///
    /// The region is clipped to the level; tiles that fail to read stay blank.
    pub async fn region(
        &self,
        pyramid_id: &str,
        level: usize,
        region: Rect,
        encoding: ImageEncoding,
    ) -> Result<RegionResponse, TileError> {
        check_encoding(encoding)?;
        let store = self.registry.get(pyramid_id).await?;
        let size = store.read_size_at_level(level)?;

        let region = Rect::new(0, 0, size.width, size.height)
            .intersection(&region)
            .ok_or_else(|| TileError::InvalidRegion {
                reason: format!("region does not overlap the {} level image", size),
            })?;
        if region.size().area() > MAX_REGION_PIXELS {
            return Err(TileError::InvalidRegion {
                reason: format!(
                    "{}x{} exceeds the {} pixel limit",
                    region.width, region.height, MAX_REGION_PIXELS
                ),
            });
        }

        let source = PyramidSource::new(store);
        let image = compose_viewport(&source, region, level as u32).await?;
        let data = self.encoder.encode(&image.pixels, encoding)?;

        Ok(RegionResponse {
            data,
            encoding,
            region,
            missing_tiles: image.missing.len(),
        })
    }

    /// Level structure of a pyramid.
    pub async fn metadata(&self, pyramid_id: &str) -> Result<PyramidMetadata, TileError> {
        let store = self.registry.get(pyramid_id).await?;
        let size = store.image_size();
        Ok(PyramidMetadata {
            id: pyramid_id.to_string(),
            width: size.width,
            height: size.height,
            level_count: store.level_count(),
            bigtiff: store.is_bigtiff(),
            pixel_format: store.pixel_format(0).ok().map(|f| f.name()),
            description: store.description().map(str::to_string),
            levels: store.levels(),
        })
    }

    /// Pick the level to display at `target` size.
    pub async fn select_level(
        &self,
        pyramid_id: &str,
        target: Size,
        policy: LevelPolicy,
    ) -> Result<LevelSelection, TileError> {
        if target.is_empty() {
            return Err(TileError::InvalidRegion {
                reason: "target size must be positive".to_string(),
            });
        }
        let store = self.registry.get(pyramid_id).await?;
        let level = store.select_level(target, policy)?;
        Ok(LevelSelection {
            target,
            policy,
            level,
            geometry: store.level_geometry(level)?,
        })
    }

    /// One page of available pyramids.
    pub async fn list(&self, limit: usize, cursor: Option<&str>) -> Result<ContentList, TileError> {
        Ok(self.registry.source().list(limit, cursor).await?)
    }

    /// Get tile cache statistics.
    ///
    /// Returns `(current_size, capacity, entry_count)`.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        let size = self.cache.size().await;
        let capacity = self.cache.capacity();
        let count = self.cache.len().await;
        (size, capacity, count)
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Forget a pyramid: its opened store and every cached tile.
    pub async fn invalidate_pyramid(&self, pyramid_id: &str) {
        self.registry.invalidate(pyramid_id).await;
        let removed = self.cache.invalidate_pyramid(pyramid_id).await;
        debug!(pyramid = pyramid_id, removed, "invalidated pyramid");
    }

    pub fn registry(&self) -> &Arc<PyramidRegistry<S>> {
        &self.registry
    }
}

fn check_encoding(encoding: ImageEncoding) -> Result<(), TileError> {
    match encoding.quality() {
        Some(quality) if !is_valid_quality(quality) => Err(TileError::InvalidQuality { quality }),
        _ => Ok(()),
    }
}

/// Failures confined to one tile's stored data.
fn is_tile_data_error(err: &PyramidError) -> bool {
    matches!(
        err,
        PyramidError::Decode { .. } | PyramidError::Io(_) | PyramidError::Worker(_)
    )
}

// =============================================================================
// Tests
// =============================================================================
