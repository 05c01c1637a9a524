//! One channel of a streamed frame, regrouped into assembled tiles.
//!
//! Clients stream small tiles (typically 64 or 128 pixels). For display the
//! small tiles are grouped into larger assembled tiles so a wall renders a
//! few hundred textures rather than tens of thousands:
//!
//! ```text
//!  small tiles (4 x 3 grid)        assembled tiles (factor 2)
//!  ┌──┬──┬──┬──┐                   ┌─────┬─────┐
//!  │ 0│ 1│ 2│ 3│                   │     │     │
//!  ├──┼──┼──┼──┤                   │  0  │  1  │
//!  │ 4│ 5│ 6│ 7│         ──▶       ├─────┼─────┤
//!  ├──┼──┼──┼──┤                   │  2  │  3  │
//!  │ 8│ 9│10│11│                   └─────┴─────┘
//!  └──┴──┴──┴──┘
//! ```
//!
//! Indices exposed by this module always refer to assembled tiles.

use tracing::debug;

use crate::error::StreamError;
use crate::geometry::{Rect, RectF, Size};
use crate::pixel::{normalize, PixelBuffer};

use super::frame::{Frame, StreamTile, TileDecoder};

/// Edge length of assembled tiles when none is configured.
pub const DEFAULT_ASSEMBLED_TILE_SIZE: u32 = 512;

/// Validated tile grid of one channel.
#[derive(Debug, Clone)]
pub struct StreamChannelAssembler {
    channel: u8,
    /// Small tiles in row-major order
    tiles: Vec<StreamTile>,
    columns: u32,
    rows: u32,
    tile_width: u32,
    tile_height: u32,
    image_size: Size,
    /// Small tiles per assembled tile along each axis
    factor_x: u32,
    factor_y: u32,
    grid: Size,
}

impl StreamChannelAssembler {
    pub fn new(frame: &Frame, channel: u8) -> Result<Self, StreamError> {
        Self::with_tile_size(frame, channel, DEFAULT_ASSEMBLED_TILE_SIZE)
    }

    /// Collect and validate `channel`'s tiles, grouping them into assembled
    /// tiles of about `assembled_size` pixels.
    ///
    /// The assembled size is rounded down to a whole number of small tiles and
    /// is never smaller than one small tile.
    pub fn with_tile_size(
        frame: &Frame,
        channel: u8,
        assembled_size: u32,
    ) -> Result<Self, StreamError> {
        let tiles: Vec<StreamTile> = frame
            .tiles
            .iter()
            .filter(|t| t.channel == channel)
            .cloned()
            .collect();
        let incomplete = |reason: String| StreamError::IncompleteFrame { channel, reason };

        let first = tiles
            .first()
            .ok_or_else(|| incomplete("channel has no tiles".to_string()))?;
        if (first.x, first.y) != (0, 0) {
            return Err(incomplete(format!(
                "first tile is at ({}, {}), expected (0, 0)",
                first.x, first.y
            )));
        }
        let (tile_width, tile_height) = (first.width, first.height);
        if tile_width == 0 || tile_height == 0 {
            return Err(incomplete("first tile has no area".to_string()));
        }

        let columns = tiles.iter().take_while(|t| t.y == 0).count();
        if tiles.len() % columns != 0 {
            return Err(incomplete(format!(
                "{} tiles do not fill rows of {}",
                tiles.len(),
                columns
            )));
        }
        let rows = tiles.len() / columns;

        let last_width = tiles[columns - 1].width;
        let last_height = tiles[(rows - 1) * columns].height;

        for (i, tile) in tiles.iter().enumerate() {
            let (col, row) = (i % columns, i / columns);
            let expected_x = col as u64 * tile_width as u64;
            let expected_y = row as u64 * tile_height as u64;
            if (tile.x as u64, tile.y as u64) != (expected_x, expected_y) {
                return Err(incomplete(format!(
                    "tile {} is at ({}, {}), expected ({}, {})",
                    i, tile.x, tile.y, expected_x, expected_y
                )));
            }

            let expected_width = if col + 1 < columns { tile_width } else { last_width };
            let expected_height = if row + 1 < rows { tile_height } else { last_height };
            if tile.width != expected_width || tile.height != expected_height {
                return Err(incomplete(format!(
                    "tile {} is {}x{}, expected {}x{}",
                    i, tile.width, tile.height, expected_width, expected_height
                )));
            }
        }
        if last_width == 0 || last_width > tile_width || last_height == 0 || last_height > tile_height
        {
            return Err(incomplete(format!(
                "edge tiles are {}x{}, tile size is {}x{}",
                last_width, last_height, tile_width, tile_height
            )));
        }

        let image_width = (columns as u64 - 1) * tile_width as u64 + last_width as u64;
        let image_height = (rows as u64 - 1) * tile_height as u64 + last_height as u64;
        let (Ok(width), Ok(height)) = (u32::try_from(image_width), u32::try_from(image_height))
        else {
            return Err(incomplete(format!(
                "channel image of {}x{} exceeds {} pixels per side",
                image_width,
                image_height,
                u32::MAX
            )));
        };
        let image_size = Size::new(width, height);
        // Every column and row starts at a distinct u32 offset, so the counts fit.
        let (columns, rows) = (columns as u32, rows as u32);
        let factor_x = (assembled_size / tile_width).max(1);
        let factor_y = (assembled_size / tile_height).max(1);
        let grid = Size::new(columns.div_ceil(factor_x), rows.div_ceil(factor_y));

        debug!(
            channel,
            columns,
            rows,
            assembled_columns = grid.width,
            assembled_rows = grid.height,
            "channel assembled"
        );

        Ok(Self {
            channel,
            tiles,
            columns,
            rows,
            tile_width,
            tile_height,
            image_size,
            factor_x,
            factor_y,
            grid,
        })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Number of assembled tiles.
    pub fn tiles_count(&self) -> usize {
        self.grid.width as usize * self.grid.height as usize
    }

    /// Assembled tile grid, in tiles.
    pub fn grid_size(&self) -> Size {
        self.grid
    }

    /// Grid of the small tiles as received.
    pub fn source_grid_size(&self) -> Size {
        Size::new(self.columns, self.rows)
    }

    pub fn image_size(&self) -> Size {
        self.image_size
    }

    /// Full size of an assembled tile; edge tiles may be smaller.
    pub fn assembled_tile_size(&self) -> Size {
        Size::new(
            self.factor_x * self.tile_width,
            self.factor_y * self.tile_height,
        )
    }

    fn check_index(&self, index: usize) -> Result<(), StreamError> {
        if index >= self.tiles_count() {
            return Err(StreamError::IndexOutOfRange {
                index,
                count: self.tiles_count(),
            });
        }
        Ok(())
    }

    /// Pixel area of an assembled tile, clipped to the channel image.
    pub fn tile_rect(&self, index: usize) -> Result<Rect, StreamError> {
        self.check_index(index)?;
        let full = self.assembled_tile_size();
        let col = (index % self.grid.width as usize) as u64;
        let row = (index / self.grid.width as usize) as u64;
        // Assembled tiles start inside the image, so offsets fit in u32.
        let x = (col * full.width as u64).min(self.image_size.width as u64) as u32;
        let y = (row * full.height as u64).min(self.image_size.height as u64) as u32;
        Ok(Rect::new(
            x,
            y,
            full.width.min(self.image_size.width - x),
            full.height.min(self.image_size.height - y),
        ))
    }

    /// Assembled tiles intersecting `viewport`, in row-major order.
    pub fn compute_visible_set(&self, viewport: &RectF) -> Vec<usize> {
        (0..self.tiles_count())
            .filter(|&i| {
                self.tile_rect(i)
                    .is_ok_and(|rect| rect.intersects(viewport))
            })
            .collect()
    }

    /// Small tiles making up an assembled tile, in row-major order.
    fn members(&self, index: usize) -> impl Iterator<Item = &StreamTile> + '_ {
        let col = index as u32 % self.grid.width;
        let row = index as u32 / self.grid.width;
        let cols = col * self.factor_x..((col + 1) * self.factor_x).min(self.columns);
        let rows = row * self.factor_y..((row + 1) * self.factor_y).min(self.rows);
        rows.flat_map(move |r| {
            cols.clone()
                .map(move |c| &self.tiles[(r * self.columns + c) as usize])
        })
    }

    /// Decode every small tile of an assembled tile into one buffer.
    ///
    /// The buffer takes the canonical format of the first small tile; the
    /// others are converted to it. Any failing member fails the whole tile.
    pub fn decode_tile(
        &self,
        index: usize,
        decoder: &dyn TileDecoder,
    ) -> Result<PixelBuffer, StreamError> {
        let rect = self.tile_rect(index)?;
        let decode_error = |message: String| StreamError::Decode {
            channel: self.channel,
            index,
            message,
        };

        let mut canvas: Option<PixelBuffer> = None;
        for tile in self.members(index) {
            let raw = decoder.decode(tile).map_err(|e| decode_error(e.to_string()))?;
            let pixels = normalize(&raw).map_err(|e| decode_error(e.to_string()))?;
            if (pixels.width(), pixels.height()) != (tile.width, tile.height) {
                return Err(decode_error(format!(
                    "tile at ({}, {}) decoded to {}x{}, expected {}x{}",
                    tile.x,
                    tile.y,
                    pixels.width(),
                    pixels.height(),
                    tile.width,
                    tile.height
                )));
            }

            if canvas.is_none() {
                canvas = Some(PixelBuffer::try_blank(rect.width, rect.height, pixels.format())?);
            }
            if let Some(canvas) = canvas.as_mut() {
                let pixels = pixels.convert(canvas.format());
                canvas.blit(&pixels, tile.x - rect.x, tile.y - rect.y)?;
            }
        }

        Ok(canvas.unwrap_or_else(PixelBuffer::empty))
    }
}
