//! Test utilities for integration tests.
//!
//! Provides an in-memory content source and a small pyramidal TIFF writer
//! covering both byte orders, classic and BigTIFF layouts, and the
//! supported tile compressions.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use tilewall::error::IoError;
use tilewall::io::MemoryReader;
use tilewall::pixel::SampleLayout;
use tilewall::pyramid::{ContentList, ContentSource};
use tilewall::stream::{StreamTile, TileFormat};

// =============================================================================
// Mock Content Source
// =============================================================================

/// Content source serving pyramid files from memory.
///
/// Counts how often each id is opened so registry caching can be observed.
pub struct MockContentSource {
    files: HashMap<String, Bytes>,
    opens: Arc<AtomicUsize>,
}

impl MockContentSource {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_file(mut self, id: impl Into<String>, data: Vec<u8>) -> Self {
        self.files.insert(id.into(), Bytes::from(data));
        self
    }

    /// Shared open counter; stays valid after the source moves into a registry.
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opens)
    }
}

impl Default for MockContentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSource for MockContentSource {
    type Reader = MemoryReader;

    async fn create_reader(&self, id: &str) -> Result<Self::Reader, IoError> {
        let data = self
            .files
            .get(id)
            .ok_or_else(|| IoError::NotFound(id.to_string()))?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryReader::new(data.clone(), format!("mock://{}", id)))
    }

    async fn list(&self, limit: usize, cursor: Option<&str>) -> Result<ContentList, IoError> {
        let mut ids: Vec<String> = self.files.keys().cloned().collect();
        ids.sort();
        if let Some(cursor) = cursor {
            ids.retain(|id| id.as_str() > cursor);
        }

        let has_more = ids.len() > limit;
        ids.truncate(limit);
        let next_cursor = if has_more { ids.last().cloned() } else { None };
        Ok(ContentList { ids, next_cursor })
    }
}

// =============================================================================
// Tile Payloads
// =============================================================================

/// Zlib-compressed payload, as stored with Compression = 8.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// LZW payload with the TIFF code size switch, as stored with Compression = 5.
pub fn lzw(data: &[u8]) -> Vec<u8> {
    weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
        .encode(data)
        .unwrap()
}

/// Baseline JPEG of a solid color.
pub fn solid_jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .encode_image(&image)
        .unwrap();
    out
}

pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G'])
}

pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

// =============================================================================
// TIFF Builder
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// One tiled level and its stored tile payloads in row-major order.
#[derive(Clone, Debug)]
pub struct LevelSpec {
    pub width: u32,
    pub height: u32,
    pub tile: u32,
    pub samples_per_pixel: u16,
    pub compression: u16,
    pub extra_samples: Option<u16>,
    pub tiles: Vec<Vec<u8>>,
    /// Write StripOffsets with `tile` rows per strip instead of tile tags
    pub stripped: bool,
}

impl LevelSpec {
    /// Uncompressed level; every sample of tile (col, row) is `fill(col, row)`.
    pub fn uncompressed(
        width: u32,
        height: u32,
        tile: u32,
        samples_per_pixel: u16,
        fill: impl Fn(u32, u32) -> u8,
    ) -> Self {
        let tiles_x = width.div_ceil(tile);
        let tiles_y = height.div_ceil(tile);
        let len = (tile * tile) as usize * samples_per_pixel as usize;
        let tiles = (0..tiles_y)
            .flat_map(|row| (0..tiles_x).map(move |col| (col, row)))
            .map(|(col, row)| vec![fill(col, row); len])
            .collect();
        Self {
            width,
            height,
            tile,
            samples_per_pixel,
            compression: 1,
            extra_samples: None,
            tiles,
            stripped: false,
        }
    }

    /// Full-width strips of `rows_per_strip` rows, every sample `fill`.
    pub fn strips(width: u32, height: u32, rows_per_strip: u32, fill: u8) -> Self {
        let strips = height.div_ceil(rows_per_strip);
        let len = (width * rows_per_strip) as usize;
        Self {
            width,
            height,
            tile: rows_per_strip,
            samples_per_pixel: 1,
            compression: 1,
            extra_samples: None,
            tiles: vec![vec![fill; len]; strips as usize],
            stripped: true,
        }
    }

    /// Re-encode every tile payload with `compress` and tag the level.
    pub fn compressed(mut self, compression: u16, compress: impl Fn(&[u8]) -> Vec<u8>) -> Self {
        self.tiles = self.tiles.iter().map(|t| compress(t)).collect();
        self.compression = compression;
        self
    }

    pub fn with_extra_samples(mut self, kind: u16) -> Self {
        self.extra_samples = Some(kind);
        self
    }
}

enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Ascii(String),
}

/// Writes pyramidal TIFF files with one directory per level.
pub struct TiffBuilder {
    endian: Endian,
    bigtiff: bool,
    description: Option<String>,
    levels: Vec<LevelSpec>,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self {
            endian: Endian::Little,
            bigtiff: false,
            description: None,
            levels: Vec::new(),
        }
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn bigtiff(mut self, bigtiff: bool) -> Self {
        self.bigtiff = bigtiff;
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn level(mut self, level: LevelSpec) -> Self {
        self.levels.push(level);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut w = Writer {
            endian: self.endian,
            bigtiff: self.bigtiff,
            out: Vec::new(),
        };

        w.out.extend_from_slice(match self.endian {
            Endian::Little => b"II",
            Endian::Big => b"MM",
        });
        if self.bigtiff {
            w.u16(43);
            w.u16(8);
            w.u16(0);
        } else {
            w.u16(42);
        }
        let mut link = w.out.len();
        w.offset(0);

        for (index, level) in self.levels.iter().enumerate() {
            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for tile in &level.tiles {
                offsets.push(w.out.len() as u32);
                counts.push(tile.len() as u32);
                w.out.extend_from_slice(tile);
            }

            let mut entries = vec![
                (256, Value::Long(vec![level.width])),
                (257, Value::Long(vec![level.height])),
                (258, Value::Short(vec![8; level.samples_per_pixel as usize])),
                (259, Value::Short(vec![level.compression])),
                (277, Value::Short(vec![level.samples_per_pixel])),
            ];
            if level.stripped {
                entries.push((273, Value::Long(offsets)));
                entries.push((278, Value::Long(vec![level.tile])));
                entries.push((279, Value::Long(counts)));
            } else {
                entries.push((322, Value::Long(vec![level.tile])));
                entries.push((323, Value::Long(vec![level.tile])));
                entries.push((324, Value::Long(offsets)));
                entries.push((325, Value::Long(counts)));
            }
            if index == 0 {
                if let Some(ref text) = self.description {
                    entries.push((270, Value::Ascii(text.clone())));
                }
            }
            if let Some(extra) = level.extra_samples {
                entries.push((338, Value::Short(vec![extra])));
            }
            entries.sort_by_key(|(tag, _)| *tag);

            // Out-of-line values first, then the directory pointing at them.
            let encoded: Vec<(u16, u16, u64, Vec<u8>)> = entries
                .iter()
                .map(|(tag, value)| {
                    let (field_type, count, bytes) = w.encode(value);
                    (*tag, field_type, count, bytes)
                })
                .collect();
            let inline = w.inline_size();
            let mut placed = Vec::new();
            for (tag, field_type, count, bytes) in encoded {
                if bytes.len() <= inline {
                    placed.push((tag, field_type, count, bytes, None));
                } else {
                    w.align();
                    let at = w.out.len() as u64;
                    w.out.extend_from_slice(&bytes);
                    placed.push((tag, field_type, count, bytes, Some(at)));
                }
            }

            w.align();
            let ifd = w.out.len() as u64;
            w.patch_offset(link, ifd);
            if self.bigtiff {
                w.u64(placed.len() as u64);
            } else {
                w.u16(placed.len() as u16);
            }
            for (tag, field_type, count, mut bytes, at) in placed {
                w.u16(tag);
                w.u16(field_type);
                if self.bigtiff {
                    w.u64(count);
                } else {
                    w.u32(count as u32);
                }
                match at {
                    Some(at) => w.offset(at),
                    None => {
                        bytes.resize(inline, 0);
                        w.out.extend_from_slice(&bytes);
                    }
                }
            }
            link = w.out.len();
            w.offset(0);
        }
        w.out
    }
}

impl Default for TiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Writer {
    endian: Endian,
    bigtiff: bool,
    out: Vec<u8>,
}

impl Writer {
    fn u16_bytes(&self, v: u16) -> [u8; 2] {
        match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    fn u32_bytes(&self, v: u32) -> [u8; 4] {
        match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    fn u64_bytes(&self, v: u64) -> [u8; 8] {
        match self.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    fn u16(&mut self, v: u16) {
        let b = self.u16_bytes(v);
        self.out.extend_from_slice(&b);
    }

    fn u32(&mut self, v: u32) {
        let b = self.u32_bytes(v);
        self.out.extend_from_slice(&b);
    }

    fn u64(&mut self, v: u64) {
        let b = self.u64_bytes(v);
        self.out.extend_from_slice(&b);
    }

    fn offset(&mut self, v: u64) {
        if self.bigtiff {
            self.u64(v);
        } else {
            self.u32(v as u32);
        }
    }

    fn patch_offset(&mut self, at: usize, v: u64) {
        if self.bigtiff {
            let b = self.u64_bytes(v);
            self.out[at..at + 8].copy_from_slice(&b);
        } else {
            let b = self.u32_bytes(v as u32);
            self.out[at..at + 4].copy_from_slice(&b);
        }
    }

    fn inline_size(&self) -> usize {
        if self.bigtiff {
            8
        } else {
            4
        }
    }

    fn align(&mut self) {
        if self.out.len() % 2 == 1 {
            self.out.push(0);
        }
    }

    /// Field type, count and value bytes of one entry.
    fn encode(&self, value: &Value) -> (u16, u64, Vec<u8>) {
        match value {
            Value::Short(values) => (
                3,
                values.len() as u64,
                values.iter().flat_map(|&v| self.u16_bytes(v)).collect(),
            ),
            Value::Long(values) => (
                4,
                values.len() as u64,
                values.iter().flat_map(|&v| self.u32_bytes(v)).collect(),
            ),
            Value::Ascii(text) => {
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                (2, bytes.len() as u64, bytes)
            }
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Three-level RGB pyramid with edge tiles on every level.
///
/// Level sizes are 100x80, 50x40 and 25x20 with 32-pixel tiles. Every sample
/// of tile (col, row) on level `l` is `l * 100 + row * 10 + col`.
pub fn rgb_pyramid() -> Vec<u8> {
    let level = |l: u32, width, height| {
        LevelSpec::uncompressed(width, height, 32, 3, move |c, r| (l * 100 + r * 10 + c) as u8)
    };
    TiffBuilder::new()
        .description("Test pyramid|AppMag = 20")
        .level(level(0, 100, 80))
        .level(level(1, 50, 40))
        .level(level(2, 25, 20))
        .build()
}

// =============================================================================
// Streamed Frames
// =============================================================================

/// Raw gray tiles of one channel whose value is the row-major tile number.
pub fn gray_grid(
    channel: u8,
    columns: u32,
    rows: u32,
    tile: u32,
    last_width: u32,
    last_height: u32,
) -> Vec<StreamTile> {
    let mut tiles = Vec::new();
    for row in 0..rows {
        for col in 0..columns {
            let width = if col + 1 == columns { last_width } else { tile };
            let height = if row + 1 == rows { last_height } else { tile };
            let value = (row * columns + col) as u8;
            tiles.push(StreamTile {
                x: col * tile,
                y: row * tile,
                width,
                height,
                channel,
                format: TileFormat::Raw(SampleLayout::gray8()),
                payload: Bytes::from(vec![value; (width * height) as usize]),
            });
        }
    }
    tiles
}
