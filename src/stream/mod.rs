//! Images delivered as streamed frames of small tiles.
//!
//! A [`Frame`] carries the still-encoded tiles of every channel (for example
//! the two eyes of a stereo pair). [`StreamChannelAssembler`] validates one
//! channel and regroups its small tiles into larger assembled tiles;
//! [`StreamFrameAssembler`] puts all channels behind one global tile index.
//!
//! Payloads are decoded through a [`TileDecoder`], with [`ImageTileDecoder`]
//! as the default.

mod assembler;
mod channel;
pub(crate) mod frame;

pub use assembler::{StreamFrameAssembler, TileLocation};
pub use channel::{StreamChannelAssembler, DEFAULT_ASSEMBLED_TILE_SIZE};
pub use frame::{Frame, ImageTileDecoder, StreamTile, TileDecoder, TileFormat};
