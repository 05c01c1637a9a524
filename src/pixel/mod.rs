//! Canonical pixel formats and the normalizer that produces them.
//!
//! Every tile that leaves a pyramid store or a stream assembler is a
//! [`PixelBuffer`] in one of three formats, whatever the source file's
//! sample layout was.

mod buffer;
mod normalize;

pub use buffer::{PixelBuffer, PixelFormat};
pub use normalize::{normalize, AlphaKind, RawTile, SampleLayout};
