//! Streamed frame assembly tests.
//!
//! Tests verify:
//! - Small tiles regroup into assembled tiles with clipped edge tiles
//! - Global indices span channels in ascending channel order
//! - Incomplete channels reject the whole frame
//! - Viewports compose from a frame through the shared tile interface

use bytes::Bytes;

use tilewall::error::{CodecError, StreamError, TileError};
use tilewall::geometry::{Rect, RectF, Size};
use tilewall::pixel::{PixelFormat, RawTile};
use tilewall::stream::{Frame, StreamFrameAssembler, StreamTile, TileDecoder, TileFormat};
use tilewall::tile::{compose_viewport, StreamFrameSource, TileSource};

use super::test_utils::{gray_grid, solid_jpeg};

/// Channel 0: 4x3 small tiles of 16 with an 8-pixel last column.
/// Channel 1: 2x2 small tiles of 16.
fn stereo_frame() -> Frame {
    let mut tiles = gray_grid(1, 2, 2, 16, 16, 16);
    tiles.extend(gray_grid(0, 4, 3, 16, 8, 16));
    Frame::new("stereo", tiles)
}

fn assembler() -> StreamFrameAssembler {
    StreamFrameAssembler::with_tile_size(&stereo_frame(), 32).unwrap()
}

// =============================================================================
// Geometry
// =============================================================================

#[test]
fn test_channels_regroup_into_assembled_tiles() {
    let frame = assembler();

    assert_eq!(frame.channel_ids(), vec![0, 1]);
    assert_eq!(frame.tiles_count(), 5);
    assert_eq!(frame.channel_offset(1), Some(4));

    let channel = frame.channel(0).unwrap();
    assert_eq!(channel.image_size(), Size::new(56, 48));
    assert_eq!(channel.grid_size(), Size::new(2, 2));

    assert_eq!(frame.get_tile_rect(1).unwrap(), Rect::new(32, 0, 24, 32));
    assert_eq!(frame.get_tile_rect(3).unwrap(), Rect::new(32, 32, 24, 16));
    assert_eq!(frame.get_tile_rect(4).unwrap(), Rect::new(0, 0, 32, 32));
    assert!(matches!(
        frame.get_tile_rect(5),
        Err(StreamError::IndexOutOfRange { index: 5, count: 5 })
    ));
}

#[test]
fn test_global_index_resolution() {
    let frame = assembler();

    let location = frame.channel_for_index(3).unwrap();
    assert_eq!((location.channel, location.index), (0, 3));
    let location = frame.channel_for_index(4).unwrap();
    assert_eq!((location.channel, location.index), (1, 0));
}

#[test]
fn test_visible_sets() {
    let frame = assembler();
    let center = RectF::new(30.0, 30.0, 4.0, 4.0);

    assert_eq!(frame.compute_visible_set(&center, 0), vec![0, 1, 2, 3]);
    assert_eq!(frame.compute_visible_global_set(&center, 1), vec![4]);
    assert!(frame.compute_visible_set(&center, 9).is_empty());

    // Half-open edges: touching x = 32 only selects the right column.
    let edge = RectF::new(32.0, 0.0, 1.0, 1.0);
    assert_eq!(frame.compute_visible_set(&edge, 0), vec![1]);
}

#[test]
fn test_incomplete_channel_rejects_frame() {
    let mut frame = stereo_frame();
    // Drop the last tile of channel 1.
    frame.tiles.remove(3);

    assert!(matches!(
        StreamFrameAssembler::with_tile_size(&frame, 32),
        Err(StreamError::EmptyFrame { .. })
    ));
    assert!(matches!(
        StreamFrameAssembler::new(&Frame::new("empty", Vec::new())),
        Err(StreamError::EmptyFrame { .. })
    ));
}

// =============================================================================
// Decoding
// =============================================================================

#[tokio::test]
async fn test_assembled_tile_pixels() {
    let source = StreamFrameSource::new(assembler());

    let tile = source.tile_at(1).await.unwrap();
    assert_eq!(tile.format(), PixelFormat::Gray8);
    assert_eq!(tile.size(), Size::new(24, 32));
    assert_eq!(tile.pixel(0, 0), Some(&[2u8][..]));
    assert_eq!(tile.pixel(16, 0), Some(&[3u8][..]));
    assert_eq!(tile.pixel(0, 16), Some(&[6u8][..]));
    assert_eq!(tile.pixel(23, 31), Some(&[7u8][..]));
}

#[tokio::test]
async fn test_jpeg_payloads() {
    let tiles = vec![StreamTile {
        x: 0,
        y: 0,
        width: 16,
        height: 16,
        channel: 0,
        format: TileFormat::Jpeg,
        payload: Bytes::from(solid_jpeg(16, 16, [20, 200, 20])),
    }];
    let frame = StreamFrameAssembler::new(&Frame::new("jpeg", tiles)).unwrap();
    let source = StreamFrameSource::new(frame);

    let tile = source.tile_at(0).await.unwrap();
    assert_eq!(tile.format(), PixelFormat::Rgb888);
    let px = tile.pixel(8, 8).unwrap();
    assert!(px[1] > 180 && px[0] < 60, "{:?}", px);
}

struct RejectChannelOne;

impl TileDecoder for RejectChannelOne {
    fn decode(&self, tile: &StreamTile) -> Result<RawTile, CodecError> {
        if tile.channel == 1 {
            return Err(CodecError::Corrupt("dropped packet".to_string()));
        }
        match tile.format {
            TileFormat::Raw(layout) => Ok(RawTile {
                width: tile.width,
                height: tile.height,
                layout,
                data: tile.payload.to_vec(),
            }),
            TileFormat::Jpeg => Err(CodecError::Corrupt("unexpected JPEG".to_string())),
        }
    }
}

#[tokio::test]
async fn test_decode_failure_names_channel_and_index() {
    let source = StreamFrameSource::with_decoder(assembler(), RejectChannelOne);

    assert!(source.tile_at(0).await.is_ok());
    assert!(matches!(
        source.tile_at(4).await,
        Err(TileError::Stream(StreamError::Decode {
            channel: 1,
            index: 0,
            ..
        }))
    ));
}

// =============================================================================
// Viewport Composition
// =============================================================================

#[tokio::test]
async fn test_compose_channel_viewport() {
    let source = StreamFrameSource::new(assembler());

    let image = compose_viewport(&source, Rect::new(24, 8, 16, 16), 0)
        .await
        .unwrap();
    assert!(image.missing.is_empty());
    assert_eq!(image.pixels.size(), Size::new(16, 16));
    // (24, 8) lies in small tile (1, 0); (32, 16) in small tile (2, 1).
    assert_eq!(image.pixels.pixel(0, 0), Some(&[1u8][..]));
    assert_eq!(image.pixels.pixel(8, 8), Some(&[6u8][..]));
}

#[tokio::test]
async fn test_compose_lists_failed_tiles() {
    let source = StreamFrameSource::with_decoder(assembler(), RejectChannelOne);

    let image = compose_viewport(&source, Rect::new(0, 0, 32, 32), 1)
        .await
        .unwrap();
    assert_eq!(image.missing, vec![4]);
    assert_eq!(image.pixels.format(), PixelFormat::Argb32);
    assert!(image.pixels.data().iter().all(|&v| v == 0));

    assert!(matches!(
        compose_viewport(&source, Rect::new(0, 0, 0, 8), 0).await,
        Err(TileError::InvalidRegion { .. })
    ));
}
