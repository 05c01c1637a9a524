//! Container parsing and tile payload decoding.
//!
//! - [`tiff`]: header, directory chain and pyramid level discovery
//! - [`codec`]: decompression of a single stored tile
//! - [`jpeg`]: splicing shared tables into abbreviated JPEG tiles

pub mod codec;
pub mod jpeg;
pub mod tiff;

pub use codec::{decode_jpeg, decode_tile, jpeg_to_raw, TileEncoding};
