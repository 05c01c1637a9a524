//! Tiled TIFF and BigTIFF container parsing.
//!
//! Only what a tile reader needs is decoded: the header, the directory chain
//! and the handful of tags that describe tiled levels. Both byte orders and
//! both offset widths are handled transparently.

mod parser;
mod pyramid;
mod tags;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{PyramidLevel, TiffPyramid};
pub use tags::{Compression, FieldType, Predictor, TiffTag};
pub use values::ValueReader;
