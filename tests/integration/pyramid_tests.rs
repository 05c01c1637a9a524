//! Pyramid store tests over generated TIFF files.
//!
//! Tests verify:
//! - Both byte orders and BigTIFF open to the same levels
//! - Uncompressed, PackBits, LZW, Deflate and JPEG tiles decode
//! - Level selection, visibility and edge-tile geometry
//! - Corrupt tiles fail alone and degrade to blank tiles on request

use tilewall::error::{IoError, PyramidError, TiffError};
use tilewall::geometry::{Rect, RectF, Size, TileCoord};
use tilewall::io::MemoryReader;
use tilewall::pixel::PixelFormat;
use tilewall::pyramid::{LevelPolicy, PyramidStore};

use super::test_utils::{deflate, lzw, rgb_pyramid, solid_jpeg, Endian, LevelSpec, TiffBuilder};

async fn open(data: Vec<u8>) -> Result<PyramidStore<MemoryReader>, PyramidError> {
    PyramidStore::from_reader(MemoryReader::new(data, "test.tif")).await
}

fn gray_level(fill: u8) -> LevelSpec {
    LevelSpec::uncompressed(64, 32, 32, 1, move |_, _| fill)
}

// =============================================================================
// Container Variants
// =============================================================================

#[tokio::test]
async fn test_open_rgb_pyramid() {
    let store = open(rgb_pyramid()).await.unwrap();

    assert_eq!(store.level_count(), 3);
    assert_eq!(store.image_size(), Size::new(100, 80));
    assert!(!store.is_bigtiff());
    assert_eq!(store.description(), Some("Test pyramid|AppMag = 20"));

    let levels = store.levels();
    assert_eq!(levels[1].image_size(), Size::new(50, 40));
    assert_eq!((levels[0].tiles_x, levels[0].tiles_y), (4, 3));
    assert_eq!(levels[2].downsample, 4.0);
    assert_eq!(store.pixel_format(0).unwrap(), PixelFormat::Rgb888);
}

#[tokio::test]
async fn test_byte_orders_and_bigtiff_agree() {
    for (endian, bigtiff) in [
        (Endian::Little, false),
        (Endian::Big, false),
        (Endian::Little, true),
        (Endian::Big, true),
    ] {
        let data = TiffBuilder::new()
            .endian(endian)
            .bigtiff(bigtiff)
            .level(LevelSpec::uncompressed(64, 64, 32, 3, |c, r| (r * 2 + c) as u8 + 1))
            .level(LevelSpec::uncompressed(32, 32, 32, 3, |_, _| 9))
            .build();
        let store = open(data).await.unwrap();

        assert_eq!(store.is_bigtiff(), bigtiff, "{:?}", endian);
        assert_eq!(store.level_count(), 2);

        let tile = store.read_tile(0, TileCoord::new(1, 1)).await.unwrap();
        assert_eq!(tile.pixel(0, 0), Some(&[4u8, 4, 4][..]), "{:?}", endian);
    }
}

#[tokio::test]
async fn test_rejects_non_tiff() {
    let result = open(b"GIF89a not a tiff at all".to_vec()).await;
    assert!(matches!(
        result,
        Err(PyramidError::Format(TiffError::InvalidMagic(_)))
    ));
}

#[tokio::test]
async fn test_rejects_strip_organized_file() {
    let data = TiffBuilder::new()
        .level(LevelSpec::strips(64, 32, 8, 5))
        .build();
    assert!(matches!(
        open(data).await,
        Err(PyramidError::Format(TiffError::StripOrganization))
    ));
}

#[tokio::test]
async fn test_strip_directory_ends_pyramid() {
    let data = TiffBuilder::new()
        .level(gray_level(1))
        .level(LevelSpec::uncompressed(32, 16, 32, 1, |_, _| 2))
        .level(LevelSpec::strips(16, 8, 8, 3))
        .build();
    let store = open(data).await.unwrap();
    assert_eq!(store.level_count(), 2);
}

#[tokio::test]
async fn test_rejects_oversized_tiles() {
    let level = LevelSpec {
        width: 40000,
        height: 20000,
        tile: 20000,
        samples_per_pixel: 1,
        compression: 1,
        extra_samples: None,
        tiles: vec![vec![0u8; 16]; 2],
        stripped: false,
    };
    let result = open(TiffBuilder::new().level(level).build()).await;
    assert!(matches!(
        result,
        Err(PyramidError::Format(TiffError::InvalidTagValue { .. }))
    ));
}

#[tokio::test]
async fn test_open_local_files() {
    let dir = std::env::temp_dir().join(format!("tilewall-open-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("wall.tif");
    std::fs::write(&path, rgb_pyramid()).unwrap();

    let store = PyramidStore::open(&path).await.unwrap();
    assert_eq!(store.level_count(), 3);
    assert_eq!(store.image_size(), Size::new(100, 80));

    assert!(matches!(
        PyramidStore::open(dir.join("absent.tif")).await,
        Err(PyramidError::Io(IoError::NotFound(_)))
    ));
    assert!(matches!(
        PyramidStore::open(&dir).await,
        Err(PyramidError::Io(IoError::Open { .. }))
    ));

    std::fs::remove_dir_all(&dir).unwrap();
}

// =============================================================================
// Compression
// =============================================================================

#[tokio::test]
async fn test_compressed_levels_decode_identically() {
    let plain = gray_level(77);
    let levels = [
        plain.clone(),
        plain.clone().compressed(8, deflate),
        plain.clone().compressed(5, lzw),
        // PackBits: one repeat run of 128 bytes, eight times per 32x32 tile.
        plain.clone().compressed(32773, |t| {
            t.chunks(128).flat_map(|c| [(-127i8) as u8, c[0]]).collect()
        }),
    ];

    for level in levels {
        let compression = level.compression;
        let store = open(TiffBuilder::new().level(level).build()).await.unwrap();
        let tile = store.read_tile(0, TileCoord::new(1, 0)).await.unwrap();

        assert_eq!(tile.format(), PixelFormat::Gray8, "compression {}", compression);
        assert_eq!(tile.size(), Size::new(32, 32));
        assert!(tile.data().iter().all(|&v| v == 77), "compression {}", compression);
    }
}

#[tokio::test]
async fn test_jpeg_tiles() {
    let mut level = LevelSpec::uncompressed(64, 32, 32, 3, |_, _| 0);
    level.tiles = vec![solid_jpeg(32, 32, [200, 40, 40]); 2];
    level.compression = 7;

    let store = open(TiffBuilder::new().level(level).build()).await.unwrap();
    let tile = store.read_tile(0, TileCoord::new(0, 0)).await.unwrap();

    assert_eq!(tile.format(), PixelFormat::Rgb888);
    let px = tile.pixel(16, 16).unwrap();
    assert!(px[0] > 180 && px[1] < 70 && px[2] < 70, "{:?}", px);
}

#[tokio::test]
async fn test_unsupported_compression_is_reported_per_level() {
    let level = gray_level(1).compressed(34712, |t| t.to_vec());
    let store = open(TiffBuilder::new().level(level).build()).await.unwrap();

    let result = store.read_tile(0, TileCoord::new(0, 0)).await;
    assert!(matches!(
        result,
        Err(PyramidError::UnsupportedCompression { level: 0, .. })
    ));
}

#[tokio::test]
async fn test_rgba_normalizes_to_bgra_order() {
    let mut level = LevelSpec::uncompressed(32, 32, 32, 4, |_, _| 0).with_extra_samples(2);
    level.tiles = vec![[10u8, 20, 30, 255].repeat(32 * 32)];

    let store = open(TiffBuilder::new().level(level).build()).await.unwrap();
    let tile = store.read_tile(0, TileCoord::new(0, 0)).await.unwrap();

    assert_eq!(tile.format(), PixelFormat::Argb32);
    assert_eq!(tile.pixel(5, 5), Some(&[30u8, 20, 10, 255][..]));
}

// =============================================================================
// Geometry
// =============================================================================

#[tokio::test]
async fn test_select_level_policies() {
    let store = open(rgb_pyramid()).await.unwrap();

    let target = Size::new(60, 60);
    assert_eq!(store.select_level(target, LevelPolicy::AtMost).unwrap(), 1);
    assert_eq!(store.select_level(target, LevelPolicy::AtLeast).unwrap(), 0);

    let tiny = Size::new(5, 5);
    assert_eq!(store.select_level(tiny, LevelPolicy::AtMost).unwrap(), 2);
    assert_eq!(store.select_level(tiny, LevelPolicy::AtLeast).unwrap(), 2);

    assert_eq!(store.top_level().unwrap(), 2);
}

#[tokio::test]
async fn test_growing_levels_refuse_selection() {
    let data = TiffBuilder::new()
        .level(LevelSpec::uncompressed(32, 32, 32, 1, |_, _| 0))
        .level(LevelSpec::uncompressed(64, 64, 32, 1, |_, _| 0))
        .build();
    let store = open(data).await.unwrap();

    let result = store.select_level(Size::new(10, 10), LevelPolicy::AtMost);
    assert!(matches!(
        result,
        Err(PyramidError::Format(TiffError::LevelOrder { .. }))
    ));
    // Tiles stay readable.
    assert!(store.read_tile(1, TileCoord::new(1, 1)).await.is_ok());
}

#[tokio::test]
async fn test_edge_tile_rect_and_visibility() {
    let store = open(rgb_pyramid()).await.unwrap();

    assert_eq!(
        store.tile_rect(0, TileCoord::new(3, 2)).unwrap(),
        Rect::new(96, 64, 4, 16)
    );
    assert!(matches!(
        store.tile_rect(0, TileCoord::new(4, 0)),
        Err(PyramidError::InvalidCoordinate { .. })
    ));

    let visible = store
        .visible_tiles(0, &RectF::new(30.0, 0.0, 40.0, 32.0))
        .unwrap();
    assert_eq!(
        visible,
        vec![TileCoord::new(0, 0), TileCoord::new(1, 0), TileCoord::new(2, 0)]
    );

    // Touching the right border of column 0 does not select it.
    let visible = store
        .visible_tiles(0, &RectF::new(32.0, 32.0, 1.0, 1.0))
        .unwrap();
    assert_eq!(visible, vec![TileCoord::new(1, 1)]);

    assert!(store
        .visible_tiles(0, &RectF::new(0.0, 0.0, 0.0, 10.0))
        .unwrap()
        .is_empty());
    assert!(matches!(
        store.visible_tiles(7, &RectF::new(0.0, 0.0, 1.0, 1.0)),
        Err(PyramidError::InvalidLevel { level: 7, .. })
    ));
}

// =============================================================================
// Whole Images
// =============================================================================

#[tokio::test]
async fn test_thumbnail_is_cropped_top_level() {
    let store = open(rgb_pyramid()).await.unwrap();
    let thumbnail = store.read_thumbnail().await.unwrap();

    assert_eq!(thumbnail.size(), Size::new(25, 20));
    assert_eq!(thumbnail.pixel(24, 19), Some(&[200u8, 200, 200][..]));
}

#[tokio::test]
async fn test_full_level_marks_corrupt_tiles_missing() {
    let mut level = LevelSpec::uncompressed(64, 64, 32, 1, |c, r| (r * 2 + c) as u8 + 1)
        .compressed(8, deflate);
    level.tiles[3] = vec![0xDE, 0xAD, 0xBE, 0xEF];
    let store = open(TiffBuilder::new().level(level).build()).await.unwrap();

    let image = store.read_full_level(0).await.unwrap();
    assert!(!image.is_complete());
    assert_eq!(image.missing_tiles, vec![TileCoord::new(1, 1)]);
    assert_eq!(image.pixels.size(), Size::new(64, 64));
    assert_eq!(image.pixels.pixel(40, 10), Some(&[2u8][..]));
    assert_eq!(image.pixels.pixel(40, 40), Some(&[0u8][..]));

    assert!(matches!(
        store.read_tile(0, TileCoord::new(1, 1)).await,
        Err(PyramidError::Decode { level: 0, col: 1, row: 1, .. })
    ));
    let blank = store.read_tile_or_blank(0, TileCoord::new(1, 1)).await;
    assert_eq!(blank.size(), Size::new(32, 32));
    assert!(blank.data().iter().all(|&v| v == 0));
}
