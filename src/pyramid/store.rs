//! Random access to the tiles of one pyramidal TIFF.
//!
//! # Reading a tile
//!
//! ```text
//! (level, col, row)
//!        │
//!        ▼
//! ┌──────────────┐  offsets and byte counts loaded at open
//! │ tile_location│
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  one positioned read
//! │ RangeReader  │
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  none / LZW / Deflate / JPEG, predictor
//! │ decode_tile  │
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  Gray8 / Rgb888 / Argb32
//! │ normalize    │
//! └──────────────┘
//! ```
//!
//! Tiles are always returned at the level's full tile size. Edge tiles keep
//! the padding stored in the file; [`PyramidStore::tile_rect`] gives the part
//! that lies inside the image.
//!
//! A store only takes `&self`, so one open file can serve concurrent readers.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{CodecError, PyramidError, TiffError};
use crate::format::tiff::{PyramidLevel, TiffPyramid};
use crate::format::{decode_tile, TileEncoding};
use crate::geometry::{Rect, RectF, Size, TileCoord};
use crate::io::{FileRangeReader, RangeReader};
use crate::pixel::{normalize, AlphaKind, PixelBuffer, PixelFormat, RawTile, SampleLayout};

use super::level::{select_level, LevelGeometry, LevelPolicy};

/// A full level read tile by tile, with the tiles that could not be read.
#[derive(Debug, Clone)]
pub struct LevelImage {
    pub pixels: PixelBuffer,
    /// Tiles left blank because they failed to read or decode
    pub missing_tiles: Vec<TileCoord>,
}

impl LevelImage {
    pub fn is_complete(&self) -> bool {
        self.missing_tiles.is_empty()
    }
}

/// An opened pyramid.
pub struct PyramidStore<R: RangeReader = FileRangeReader> {
    reader: R,
    pyramid: TiffPyramid,
    /// Set when levels grow somewhere down the chain; level selection refuses
    /// to run on such a file.
    level_order: Option<TiffError>,
}

impl<R: RangeReader> fmt::Debug for PyramidStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PyramidStore")
            .field("identifier", &self.identifier())
            .field("levels", &self.level_count())
            .field("bigtiff", &self.is_bigtiff())
            .finish_non_exhaustive()
    }
}

impl PyramidStore<FileRangeReader> {
    /// Open a pyramidal TIFF on the local filesystem.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PyramidError> {
        let reader = FileRangeReader::open(path).await?;
        Self::from_reader(reader).await
    }
}

impl<R: RangeReader> PyramidStore<R> {
    /// Parse the pyramid structure behind any range reader.
    pub async fn from_reader(reader: R) -> Result<Self, PyramidError> {
        let pyramid = TiffPyramid::parse(&reader).await?;
        if pyramid.levels.is_empty() {
            return Err(TiffError::MissingTag("TileWidth").into());
        }

        let level_order = pyramid.check_level_order().err();
        if let Some(ref err) = level_order {
            warn!(file = reader.identifier(), "{}", err);
        }

        debug!(
            file = reader.identifier(),
            levels = pyramid.level_count(),
            width = pyramid.levels[0].width,
            height = pyramid.levels[0].height,
            bigtiff = pyramid.header.is_bigtiff,
            "opened pyramid"
        );

        Ok(Self {
            reader,
            pyramid,
            level_order,
        })
    }

    pub fn identifier(&self) -> &str {
        self.reader.identifier()
    }

    pub fn level_count(&self) -> usize {
        self.pyramid.level_count()
    }

    pub fn description(&self) -> Option<&str> {
        self.pyramid.description.as_deref()
    }

    pub fn is_bigtiff(&self) -> bool {
        self.pyramid.header.is_bigtiff
    }

    /// Full-resolution image size.
    pub fn image_size(&self) -> Size {
        self.pyramid.levels[0].image_size()
    }

    /// Directory-level description of a level.
    pub fn level(&self, level: usize) -> Result<&PyramidLevel, PyramidError> {
        self.pyramid
            .get_level(level)
            .ok_or(PyramidError::InvalidLevel {
                level,
                level_count: self.level_count(),
            })
    }

    pub fn level_geometry(&self, level: usize) -> Result<LevelGeometry, PyramidError> {
        let l = self.level(level)?;
        let base = &self.pyramid.levels[0];
        Ok(LevelGeometry {
            level,
            width: l.width,
            height: l.height,
            tile_width: l.tile_width,
            tile_height: l.tile_height,
            tiles_x: l.tiles_x,
            tiles_y: l.tiles_y,
            downsample: base.width as f64 / l.width as f64,
        })
    }

    pub fn levels(&self) -> Vec<LevelGeometry> {
        (0..self.level_count())
            .filter_map(|level| self.level_geometry(level).ok())
            .collect()
    }

    /// Image size at a level.
    pub fn read_size_at_level(&self, level: usize) -> Result<Size, PyramidError> {
        self.level(level).map(PyramidLevel::image_size).map_err(|err| {
            warn!(file = self.identifier(), "Invalid pyramid level: {}", level);
            err
        })
    }

    /// Native sample layout of a level.
    pub fn sample_layout(&self, level: usize) -> Result<SampleLayout, PyramidError> {
        let l = self.level(level)?;
        Ok(SampleLayout {
            samples_per_pixel: l.samples_per_pixel,
            bits_per_sample: l.bits_per_sample,
            alpha: AlphaKind::from_extra_samples(&l.extra_samples),
            byte_order: l.byte_order,
        })
    }

    /// Canonical format of the tiles of a level.
    pub fn pixel_format(&self, level: usize) -> Result<PixelFormat, PyramidError> {
        Ok(self.sample_layout(level)?.canonical_format()?)
    }

    /// Select a level for a target image size; see [`select_level`].
    pub fn select_level(&self, target: Size, policy: LevelPolicy) -> Result<usize, PyramidError> {
        if let Some(ref err) = self.level_order {
            return Err(err.clone().into());
        }
        let sizes: Vec<Size> = self.pyramid.levels.iter().map(|l| l.image_size()).collect();
        select_level(&sizes, target, policy).ok_or(PyramidError::InvalidLevel {
            level: 0,
            level_count: 0,
        })
    }

    /// The largest level that fits inside a single tile.
    pub fn top_level(&self) -> Result<usize, PyramidError> {
        self.select_level(self.pyramid.levels[0].tile_size(), LevelPolicy::AtMost)
    }

    /// Area of a tile that lies inside the level image.
    pub fn tile_rect(&self, level: usize, coord: TileCoord) -> Result<Rect, PyramidError> {
        let l = self.level(level)?;
        l.tile_rect(coord).ok_or(PyramidError::InvalidCoordinate {
            level,
            col: coord.col,
            row: coord.row,
            tiles_x: l.tiles_x,
            tiles_y: l.tiles_y,
        })
    }

    /// Tiles of a level whose area overlaps `viewport`, in row-major order.
    pub fn visible_tiles(
        &self,
        level: usize,
        viewport: &RectF,
    ) -> Result<Vec<TileCoord>, PyramidError> {
        let l = self.level(level)?;
        if viewport.is_empty() {
            return Ok(Vec::new());
        }

        let span = |start: f64, end: f64, tile: u32, count: u32| {
            let first = (start.max(0.0) / tile as f64).floor() as u32;
            let last = ((end.max(0.0) / tile as f64).ceil() as u32).min(count);
            first.min(count)..last
        };
        let cols = span(viewport.x, viewport.right(), l.tile_width, l.tiles_x);
        let rows = span(viewport.y, viewport.bottom(), l.tile_height, l.tiles_y);

        let mut tiles = Vec::new();
        for row in rows {
            for col in cols.clone() {
                let coord = TileCoord::new(col, row);
                if l.tile_rect(coord).is_some_and(|r| r.intersects(viewport)) {
                    tiles.push(coord);
                }
            }
        }
        Ok(tiles)
    }

    // -------------------------------------------------------------------------
    // Tile access
    // -------------------------------------------------------------------------

    /// Fetch the stored bytes of a tile.
    pub async fn read_tile_bytes(
        &self,
        level: usize,
        coord: TileCoord,
    ) -> Result<Bytes, PyramidError> {
        let l = self.level(level)?;
        let (offset, length) = l.tile_location(coord).ok_or(PyramidError::InvalidCoordinate {
            level,
            col: coord.col,
            row: coord.row,
            tiles_x: l.tiles_x,
            tiles_y: l.tiles_y,
        })?;

        if length == 0 {
            return Err(PyramidError::Decode {
                level,
                col: coord.col,
                row: coord.row,
                message: "tile has no stored data".to_string(),
            });
        }
        let length = usize::try_from(length).map_err(|_| PyramidError::Decode {
            level,
            col: coord.col,
            row: coord.row,
            message: format!("tile byte count {} cannot be addressed", length),
        })?;

        Ok(self.reader.read_exact_at(offset, length).await?)
    }

    /// Decompress stored tile bytes into native samples.
    ///
    /// CPU-bound; async callers can move it to a blocking worker.
    pub fn decode_raw_tile(
        &self,
        level: usize,
        coord: TileCoord,
        data: &[u8],
    ) -> Result<RawTile, PyramidError> {
        let l = self.level(level)?;
        let layout = self.sample_layout(level)?;
        layout.canonical_format()?;

        let compression = l
            .compression_scheme()
            .ok_or_else(|| PyramidError::UnsupportedCompression {
                level,
                name: format!("code {}", l.compression),
            })?;
        let encoding = TileEncoding {
            compression,
            predictor: l.predictor,
            jpeg_tables: l.jpeg_tables.as_deref(),
        };

        decode_tile(data, &encoding, l.tile_width, l.tile_height, layout).map_err(|err| match err {
            CodecError::Unsupported(c) => PyramidError::UnsupportedCompression {
                level,
                name: c.name().to_string(),
            },
            CodecError::Corrupt(message) => PyramidError::Decode {
                level,
                col: coord.col,
                row: coord.row,
                message,
            },
        })
    }

    /// Decompress and normalize stored tile bytes.
    pub fn decode_tile_bytes(
        &self,
        level: usize,
        coord: TileCoord,
        data: &[u8],
    ) -> Result<PixelBuffer, PyramidError> {
        let raw = self.decode_raw_tile(level, coord, data)?;
        Ok(normalize(&raw)?)
    }

    /// Read a tile in its native sample layout.
    pub async fn read_raw_tile(
        &self,
        level: usize,
        coord: TileCoord,
    ) -> Result<RawTile, PyramidError> {
        let data = self.read_tile_bytes(level, coord).await?;
        self.decode_raw_tile(level, coord, &data)
    }

    /// Read a tile in its canonical pixel format.
    ///
    /// Failures are logged with the tile coordinates before being returned.
    pub async fn read_tile(
        &self,
        level: usize,
        coord: TileCoord,
    ) -> Result<PixelBuffer, PyramidError> {
        let result = match self.read_tile_bytes(level, coord).await {
            Ok(data) => self.decode_tile_bytes(level, coord, &data),
            Err(err) => Err(err),
        };
        if let Err(ref err) = result {
            self.log_tile_failure(err, level, coord);
        }
        result
    }

    /// Read a tile, degrading to a blank tile when it cannot be read.
    ///
    /// The blank tile has the level's tile size and canonical format; a level
    /// that does not exist yields [`PixelBuffer::empty`].
    pub async fn read_tile_or_blank(&self, level: usize, coord: TileCoord) -> PixelBuffer {
        match self.read_tile(level, coord).await {
            Ok(tile) => tile,
            Err(_) => self.blank_tile(level),
        }
    }

    /// Blank tile matching a level's tile size and format.
    pub fn blank_tile(&self, level: usize) -> PixelBuffer {
        match (self.level(level), self.pixel_format(level)) {
            (Ok(l), Ok(format)) => PixelBuffer::blank(l.tile_width, l.tile_height, format),
            (Ok(l), Err(_)) => PixelBuffer::blank(l.tile_width, l.tile_height, PixelFormat::Argb32),
            _ => PixelBuffer::empty(),
        }
    }

    pub(crate) fn log_tile_failure(&self, err: &PyramidError, level: usize, coord: TileCoord) {
        warn!(
            file = self.identifier(),
            "{} for tile ({}, {}) @ LOD {}",
            err,
            coord.col,
            coord.row,
            level
        );
    }

    /// Compose a whole level from its tiles.
    ///
    /// Allocates the full level image. Tiles that fail to read are left blank
    /// and listed in [`LevelImage::missing_tiles`]; an unsupported sample
    /// layout aborts the read.
    pub async fn read_full_level(&self, level: usize) -> Result<LevelImage, PyramidError> {
        let l = self.level(level)?;
        let format = self.pixel_format(level)?;
        let mut pixels = PixelBuffer::try_blank(l.width, l.height, format)?;
        let mut missing_tiles = Vec::new();

        for row in 0..l.tiles_y {
            for col in 0..l.tiles_x {
                let coord = TileCoord::new(col, row);
                match self.read_tile(level, coord).await {
                    Ok(tile) => pixels.blit(&tile, col * l.tile_width, row * l.tile_height)?,
                    Err(PyramidError::Pixel(err)) => return Err(err.into()),
                    Err(_) => missing_tiles.push(coord),
                }
            }
        }

        if !missing_tiles.is_empty() {
            warn!(
                file = self.identifier(),
                level,
                missing = missing_tiles.len(),
                "level read with missing tiles"
            );
        }

        Ok(LevelImage {
            pixels,
            missing_tiles,
        })
    }

    /// First tile of the top level, cropped to that level's size.
    pub async fn read_thumbnail(&self) -> Result<PixelBuffer, PyramidError> {
        let level = self.top_level()?;
        let size = self.read_size_at_level(level)?;
        let tile = self.read_tile(level, TileCoord::new(0, 0)).await?;
        Ok(tile.crop(Rect::new(0, 0, size.width, size.height)))
    }
}
