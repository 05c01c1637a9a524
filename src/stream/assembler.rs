//! Frame-wide tile addressing across channels.
//!
//! Every channel keeps its own assembled tile grid. The frame assembler lays
//! the channels end to end in ascending channel order, so a single global
//! index addresses any tile of the frame:
//!
//! ```text
//! channel 0: 0 .. 16     channel 1: 16 .. 32     channel 2: 32 .. 40
//! ```

use tracing::warn;

use crate::error::StreamError;
use crate::geometry::{Rect, RectF};
use crate::pixel::PixelBuffer;

use super::channel::{StreamChannelAssembler, DEFAULT_ASSEMBLED_TILE_SIZE};
use super::frame::{Frame, TileDecoder};

/// Channel position and intra-channel index of a global tile index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLocation {
    /// Position of the channel in ascending channel order
    pub channel_position: usize,
    pub channel: u8,
    pub index: usize,
}

/// All channels of one frame behind one global tile index space.
///
/// Immutable after construction; every query takes `&self`.
#[derive(Debug, Clone)]
pub struct StreamFrameAssembler {
    uri: String,
    channels: Vec<StreamChannelAssembler>,
    /// `offsets[k]` is the global index of channel `k`'s first tile
    offsets: Vec<usize>,
    tiles_count: usize,
}

impl StreamFrameAssembler {
    pub fn new(frame: &Frame) -> Result<Self, StreamError> {
        Self::with_tile_size(frame, DEFAULT_ASSEMBLED_TILE_SIZE)
    }

    /// Build one channel assembler per channel in the frame.
    ///
    /// Fails with [`StreamError::EmptyFrame`] when the frame has no tiles or
    /// when any channel does not form a complete grid.
    pub fn with_tile_size(frame: &Frame, assembled_size: u32) -> Result<Self, StreamError> {
        let ids = frame.channels();
        if ids.is_empty() {
            return Err(StreamError::EmptyFrame {
                reason: "frame has no tiles".to_string(),
            });
        }

        let mut channels = Vec::with_capacity(ids.len());
        let mut offsets = Vec::with_capacity(ids.len());
        let mut tiles_count = 0;
        for id in ids {
            let channel = StreamChannelAssembler::with_tile_size(frame, id, assembled_size)
                .map_err(|err| {
                    warn!(uri = %frame.uri, channel = id, "{}", err);
                    StreamError::EmptyFrame {
                        reason: err.to_string(),
                    }
                })?;
            offsets.push(tiles_count);
            tiles_count += channel.tiles_count();
            channels.push(channel);
        }

        Ok(Self {
            uri: frame.uri.clone(),
            channels,
            offsets,
            tiles_count,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total assembled tiles across all channels.
    pub fn tiles_count(&self) -> usize {
        self.tiles_count
    }

    /// Channel ids, ascending.
    pub fn channel_ids(&self) -> Vec<u8> {
        self.channels.iter().map(|c| c.channel()).collect()
    }

    pub fn channel(&self, channel: u8) -> Option<&StreamChannelAssembler> {
        self.position(channel).map(|k| &self.channels[k])
    }

    /// Global index of a channel's first tile.
    pub fn channel_offset(&self, channel: u8) -> Option<usize> {
        self.position(channel).map(|k| self.offsets[k])
    }

    fn position(&self, channel: u8) -> Option<usize> {
        self.channels
            .binary_search_by_key(&channel, |c| c.channel())
            .ok()
    }

    /// Resolve a global index to its channel and intra-channel index.
    pub fn channel_for_index(&self, global: usize) -> Result<TileLocation, StreamError> {
        if global >= self.tiles_count {
            return Err(StreamError::IndexOutOfRange {
                index: global,
                count: self.tiles_count,
            });
        }
        // Offsets are sorted and start at 0, so this is never 0.
        let position = self.offsets.partition_point(|&offset| offset <= global) - 1;
        Ok(TileLocation {
            channel_position: position,
            channel: self.channels[position].channel(),
            index: global - self.offsets[position],
        })
    }

    /// Decode the assembled tile at a global index.
    ///
    /// Failures are logged with the channel and index before being returned.
    pub fn get_tile_image(
        &self,
        global: usize,
        decoder: &dyn TileDecoder,
    ) -> Result<PixelBuffer, StreamError> {
        let location = self.channel_for_index(global)?;
        self.channels[location.channel_position]
            .decode_tile(location.index, decoder)
            .map_err(|err| {
                warn!(
                    uri = %self.uri,
                    channel = location.channel,
                    index = location.index,
                    "{}",
                    err
                );
                err
            })
    }

    /// Channel-local pixel area of the tile at a global index.
    pub fn get_tile_rect(&self, global: usize) -> Result<Rect, StreamError> {
        let location = self.channel_for_index(global)?;
        self.channels[location.channel_position].tile_rect(location.index)
    }

    /// Intra-channel indices of `channel`'s tiles that intersect `viewport`.
    ///
    /// Unknown channels yield an empty set.
    pub fn compute_visible_set(&self, viewport: &RectF, channel: u8) -> Vec<usize> {
        self.channel(channel)
            .map(|c| c.compute_visible_set(viewport))
            .unwrap_or_default()
    }

    /// Same as [`compute_visible_set`](Self::compute_visible_set), as global indices.
    pub fn compute_visible_global_set(&self, viewport: &RectF, channel: u8) -> Vec<usize> {
        match self.channel_offset(channel) {
            Some(offset) => self
                .compute_visible_set(viewport, channel)
                .into_iter()
                .map(|i| i + offset)
                .collect(),
            None => Vec::new(),
        }
    }
}
