//! Abbreviated JPEG tile streams.
//!
//! Tiled TIFFs often store quantization and Huffman tables once in the
//! `JPEGTables` tag and leave them out of every tile. Such tiles only decode
//! after the shared tables are spliced in:
//!
//! ```text
//! tables: SOI DQT DHT EOI        tile: SOI SOS <scan> EOI
//!         └──────┬──────┘                  └──────┬──────┘
//!                ▼                                ▼
//!         SOI DQT DHT                      SOS <scan> EOI
//! ```

use std::borrow::Cow;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

const MARKER_DQT: u8 = 0xDB;
const MARKER_DHT: u8 = 0xC4;
const MARKER_SOS: u8 = 0xDA;

/// Whether a stream defines its own quantization tables before its first scan.
///
/// Walks marker segments from SOI and stops at the first scan header.
pub fn has_tables(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        match data[pos + 1] {
            MARKER_DQT | MARKER_DHT => return true,
            MARKER_SOS => return false,
            // Fill bytes and standalone markers carry no length.
            0xFF | 0x00 | 0xD0..=0xD9 => pos += 2,
            _ => {
                if pos + 3 >= data.len() {
                    return false;
                }
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length;
            }
        }
    }
    false
}

/// Splice shared tables in front of an abbreviated tile.
pub fn merge_jpeg_tables(tables: &[u8], tile: &[u8]) -> Vec<u8> {
    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile = tile.strip_prefix(&SOI).unwrap_or(tile);

    let mut merged = Vec::with_capacity(tables.len() + tile.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(tile);
    merged
}

/// Return a decodable stream, merging tables only when the tile lacks its own.
pub fn prepare_tile_jpeg<'a>(tables: Option<&[u8]>, tile: &'a [u8]) -> Cow<'a, [u8]> {
    match tables {
        Some(tables) if !tables.is_empty() && !tile.is_empty() && !has_tables(tile) => {
            Cow::Owned(merge_jpeg_tables(tables, tile))
        }
        _ => Cow::Borrowed(tile),
    }
}
