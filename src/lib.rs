//! # tilewall
//!
//! A tile engine for very large images shown on display walls.
//!
//! Images reach the wall in two shapes: multi-resolution pyramids stored as
//! tiled TIFF/BigTIFF files, and streamed frames made of many small encoded
//! tiles per channel. Both end up as tiles in one of three canonical pixel
//! formats, addressed by integer rectangles and selected by viewport.
//!
//! ## Architecture
//!
//! - [`io`] - positioned reads over files and memory
//! - [`mod@format`] - TIFF container parsing and tile payload codecs
//! - [`pixel`] - canonical pixel buffers and the sample layout normalizer
//! - [`pyramid`] - pyramid store, level selection and the opened-file registry
//! - [`stream`] - channel and frame assemblers for streamed tiles
//! - [`tile`] - viewport composition, encoding, caching and the tile service
//! - [`server`] - Axum-based read-only HTTP API
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tilewall::geometry::{RectF, TileCoord};
//! use tilewall::pyramid::{LevelPolicy, PyramidStore};
//! use tilewall::geometry::Size;
//!
//! # async fn run() -> Result<(), tilewall::PyramidError> {
//! let store = PyramidStore::open("/data/walls/mural.tif").await?;
//! let level = store.select_level(Size::new(7680, 4320), LevelPolicy::AtMost)?;
//!
//! let viewport = RectF::new(0.0, 0.0, 2048.0, 2048.0);
//! for coord in store.visible_tiles(level, &viewport)? {
//!     let tile = store.read_tile_or_blank(level, coord).await;
//!     println!("{:?} -> {}", coord, tile.size());
//! }
//! # let _ = TileCoord::new(0, 0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod io;
pub mod pixel;
pub mod pyramid;
pub mod server;
pub mod stream;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, ExtractConfig, InspectConfig, ServeConfig};
pub use error::{
    CodecError, IoError, PixelFormatError, PyramidError, StreamError, TiffError, TileError,
};
pub use geometry::{Rect, RectF, Size, TileCoord};
pub use io::{FileRangeReader, MemoryReader, RangeReader};
pub use pixel::{normalize, PixelBuffer, PixelFormat, RawTile, SampleLayout};
pub use pyramid::{
    select_level, ContentSource, LevelGeometry, LevelPolicy, LocalContentSource, PyramidRegistry,
    PyramidStore,
};
pub use server::{create_router, AppState, RouterConfig};
pub use stream::{
    Frame, ImageTileDecoder, StreamChannelAssembler, StreamFrameAssembler, StreamTile,
    TileDecoder, TileFormat,
};
pub use tile::{
    compose_viewport, ImageEncoding, PyramidSource, StreamFrameSource, TileCache, TileEncoder,
    TileService, TileSource,
};
