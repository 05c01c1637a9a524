//! Frames of small tiles pushed by a streaming client.

use bytes::Bytes;

use crate::error::CodecError;
use crate::format::{decode_jpeg, jpeg_to_raw};
use crate::geometry::Rect;
use crate::pixel::{RawTile, SampleLayout};

/// Encoding of one streamed tile payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    Jpeg,
    /// Uncompressed interleaved samples
    Raw(SampleLayout),
}

/// One small tile of a streamed frame, still encoded.
#[derive(Debug, Clone)]
pub struct StreamTile {
    /// Pixel position of the tile inside its channel
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub channel: u8,
    pub format: TileFormat,
    pub payload: Bytes,
}

impl StreamTile {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// All tiles of one frame of a stream, in the order they were sent.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Name of the stream the frame belongs to
    pub uri: String,
    pub tiles: Vec<StreamTile>,
}

impl Frame {
    pub fn new(uri: impl Into<String>, tiles: Vec<StreamTile>) -> Self {
        Self {
            uri: uri.into(),
            tiles,
        }
    }

    /// Distinct channel ids, ascending.
    pub fn channels(&self) -> Vec<u8> {
        let mut channels: Vec<u8> = self.tiles.iter().map(|t| t.channel).collect();
        channels.sort_unstable();
        channels.dedup();
        channels
    }
}

/// Turns one streamed payload into native samples.
///
/// Decoding is synchronous; callers on an async runtime move it to a blocking
/// worker.
pub trait TileDecoder: Send + Sync {
    fn decode(&self, tile: &StreamTile) -> Result<RawTile, CodecError>;
}

/// Decodes JPEG payloads with the `image` crate and passes raw payloads through.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTileDecoder;

impl TileDecoder for ImageTileDecoder {
    fn decode(&self, tile: &StreamTile) -> Result<RawTile, CodecError> {
        let raw = match tile.format {
            TileFormat::Jpeg => jpeg_to_raw(decode_jpeg(&tile.payload)?),
            TileFormat::Raw(layout) => RawTile {
                width: tile.width,
                height: tile.height,
                layout,
                data: tile.payload.to_vec(),
            },
        };

        if (raw.width, raw.height) != (tile.width, tile.height) {
            return Err(CodecError::Corrupt(format!(
                "payload is {}x{}, tile declares {}x{}",
                raw.width, raw.height, tile.width, tile.height
            )));
        }
        Ok(raw)
    }
}
