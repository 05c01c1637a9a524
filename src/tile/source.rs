//! One tile interface over both delivery paths.
//!
//! A display node asks the same three questions whatever feeds it: which
//! tiles cover this viewport, where does a tile sit, and what are its pixels.
//! [`PyramidSource`] answers them from a pyramid file with the level as the
//! layer; [`StreamFrameSource`] answers them from an assembled frame with the
//! channel as the layer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PyramidError, StreamError, TileError};
use crate::geometry::{Rect, RectF, TileCoord};
use crate::io::RangeReader;
use crate::pixel::{PixelBuffer, PixelFormat};
use crate::pyramid::PyramidStore;
use crate::stream::{ImageTileDecoder, StreamFrameAssembler, TileDecoder};

/// Tiles addressable by key, grouped in layers.
#[async_trait]
pub trait TileSource: Send + Sync {
    type Key: Copy + Send + Sync + fmt::Debug + 'static;

    /// Pixel area of a tile within its layer.
    fn tile_rect(&self, key: Self::Key) -> Result<Rect, TileError>;

    /// Keys of the tiles of `layer` that intersect `viewport`, row-major.
    ///
    /// Unknown layers yield nothing.
    fn visible_set(&self, viewport: &RectF, layer: u32) -> Vec<Self::Key>;

    /// Decoded pixels of a tile, exactly `tile_rect(key)` in size.
    async fn tile_at(&self, key: Self::Key) -> Result<PixelBuffer, TileError>;
}

// =============================================================================
// Pyramid
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PyramidTileKey {
    pub level: usize,
    pub coord: TileCoord,
}

impl PyramidTileKey {
    pub const fn new(level: usize, col: u32, row: u32) -> Self {
        Self {
            level,
            coord: TileCoord::new(col, row),
        }
    }
}

/// Tiles of a shared pyramid store. Layers are pyramid levels.
pub struct PyramidSource<R: RangeReader> {
    store: Arc<PyramidStore<R>>,
}

impl<R: RangeReader> Clone for PyramidSource<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<R: RangeReader + 'static> PyramidSource<R> {
    pub fn new(store: Arc<PyramidStore<R>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PyramidStore<R>> {
        &self.store
    }
}

#[async_trait]
impl<R: RangeReader + 'static> TileSource for PyramidSource<R> {
    type Key = PyramidTileKey;

    fn tile_rect(&self, key: PyramidTileKey) -> Result<Rect, TileError> {
        Ok(self.store.tile_rect(key.level, key.coord)?)
    }

    fn visible_set(&self, viewport: &RectF, layer: u32) -> Vec<PyramidTileKey> {
        let level = layer as usize;
        self.store
            .visible_tiles(level, viewport)
            .unwrap_or_default()
            .into_iter()
            .map(|coord| PyramidTileKey { level, coord })
            .collect()
    }

    /// Reads the stored bytes, then decodes on a blocking worker and crops the
    /// tile's padding away.
    async fn tile_at(&self, key: PyramidTileKey) -> Result<PixelBuffer, TileError> {
        let PyramidTileKey { level, coord } = key;
        let rect = self.store.tile_rect(level, coord)?;
        let data = self
            .store
            .read_tile_bytes(level, coord)
            .await
            .inspect_err(|err| self.store.log_tile_failure(err, level, coord))?;

        let store = Arc::clone(&self.store);
        let tile = tokio::task::spawn_blocking(move || {
            store
                .decode_tile_bytes(level, coord, &data)
                .inspect_err(|err| store.log_tile_failure(err, level, coord))
        })
        .await
        .map_err(|e| PyramidError::Worker(e.to_string()))??;

        Ok(tile.crop(Rect::new(0, 0, rect.width, rect.height)))
    }
}

// =============================================================================
// Stream
// =============================================================================

/// Tiles of an assembled frame, keyed by global index. Layers are channels.
pub struct StreamFrameSource<D: TileDecoder = ImageTileDecoder> {
    frame: Arc<StreamFrameAssembler>,
    decoder: Arc<D>,
}

impl<D: TileDecoder> Clone for StreamFrameSource<D> {
    fn clone(&self) -> Self {
        Self {
            frame: Arc::clone(&self.frame),
            decoder: Arc::clone(&self.decoder),
        }
    }
}

impl StreamFrameSource<ImageTileDecoder> {
    pub fn new(frame: StreamFrameAssembler) -> Self {
        Self::with_decoder(frame, ImageTileDecoder)
    }
}

impl<D: TileDecoder + 'static> StreamFrameSource<D> {
    pub fn with_decoder(frame: StreamFrameAssembler, decoder: D) -> Self {
        Self {
            frame: Arc::new(frame),
            decoder: Arc::new(decoder),
        }
    }

    pub fn frame(&self) -> &StreamFrameAssembler {
        &self.frame
    }
}

#[async_trait]
impl<D: TileDecoder + 'static> TileSource for StreamFrameSource<D> {
    type Key = usize;

    fn tile_rect(&self, key: usize) -> Result<Rect, TileError> {
        Ok(self.frame.get_tile_rect(key)?)
    }

    fn visible_set(&self, viewport: &RectF, layer: u32) -> Vec<usize> {
        match u8::try_from(layer) {
            Ok(channel) => self.frame.compute_visible_global_set(viewport, channel),
            Err(_) => Vec::new(),
        }
    }

    async fn tile_at(&self, key: usize) -> Result<PixelBuffer, TileError> {
        let frame = Arc::clone(&self.frame);
        let decoder = Arc::clone(&self.decoder);
        let tile = tokio::task::spawn_blocking(move || frame.get_tile_image(key, decoder.as_ref()))
            .await
            .map_err(|e| StreamError::Worker(e.to_string()))??;
        Ok(tile)
    }
}

// =============================================================================
// Viewport composition
// =============================================================================

/// Pixels of a viewport with the tiles that could not be drawn.
#[derive(Debug, Clone)]
pub struct ViewportImage<K> {
    pub pixels: PixelBuffer,
    pub missing: Vec<K>,
}

/// Draw every visible tile of `layer` that overlaps `region` into one image.
///
/// The image takes the format of the first tile that decodes. Tiles that fail
/// stay blank and are listed in [`ViewportImage::missing`].
pub async fn compose_viewport<S: TileSource + ?Sized>(
    source: &S,
    region: Rect,
    layer: u32,
) -> Result<ViewportImage<S::Key>, TileError> {
    if region.is_empty() {
        return Err(TileError::InvalidRegion {
            reason: "region has no area".to_string(),
        });
    }

    let mut tiles = Vec::new();
    let mut missing = Vec::new();
    for key in source.visible_set(&region.into(), layer) {
        let rect = source.tile_rect(key)?;
        match source.tile_at(key).await {
            Ok(tile) => tiles.push((rect, tile)),
            Err(err) => {
                debug!(?key, "{}", err);
                missing.push(key);
            }
        }
    }

    let format = tiles
        .first()
        .map(|(_, tile)| tile.format())
        .unwrap_or(PixelFormat::Argb32);
    let mut pixels = PixelBuffer::try_blank(region.width, region.height, format)?;

    for (rect, tile) in tiles {
        let Some(overlap) = rect.intersection(&region) else {
            continue;
        };
        let piece = tile.convert(format).crop(Rect::new(
            overlap.x - rect.x,
            overlap.y - rect.y,
            overlap.width,
            overlap.height,
        ));
        pixels.blit(&piece, overlap.x - region.x, overlap.y - region.y)?;
    }

    Ok(ViewportImage { pixels, missing })
}
