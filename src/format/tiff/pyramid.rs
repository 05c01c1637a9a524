//! Pyramid level discovery.
//!
//! A pyramidal TIFF stores one resolution level per image file directory,
//! full resolution first. Levels are the leading run of tiled directories in
//! the chain; the first untiled directory ends the pyramid.
//!
//! ```text
//! header ──▶ IFD 0 (level 0) ──▶ IFD 1 (level 1) ──▶ ... ──▶ IFD n (strip thumbnail)
//!            tiled               tiled                        ignored
//! ```
//!
//! Tile offsets and byte counts are loaded eagerly so that tile reads never
//! touch directory data again.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::warn;

use crate::error::TiffError;
use crate::geometry::{Rect, Size, TileCoord};
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::tags::{Compression, Predictor, TiffTag};
use super::values::ValueReader;

/// Upper bound on directories walked, guards against corrupt chains.
const MAX_IFDS: usize = 100;

/// Largest accepted tile edge; one decoded tile of this size stays well
/// inside a single allocation.
pub const MAX_TILE_DIMENSION: u32 = 16384;

/// Value of the PlanarConfiguration tag for separate sample planes.
const PLANAR_SEPARATE: u64 = 2;

// =============================================================================
// PyramidLevel
// =============================================================================

/// One resolution level and everything needed to fetch its tiles.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// 0 is full resolution
    pub level_index: usize,
    pub ifd_index: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub samples_per_pixel: u16,
    pub bits_per_sample: u16,
    /// Raw ExtraSamples values, empty when the tag is absent
    pub extra_samples: Vec<u16>,
    /// Raw compression code; see [`PyramidLevel::compression_scheme`]
    pub compression: u16,
    pub predictor: Predictor,
    pub byte_order: ByteOrder,
    pub tile_offsets: Vec<u64>,
    pub tile_byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl PyramidLevel {
    /// Build a level from a tiled directory.
    async fn load<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        ifd: &Ifd,
        ifd_index: usize,
        level_index: usize,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let width = read_required_u32(&values, ifd, TiffTag::ImageWidth).await?;
        let height = read_required_u32(&values, ifd, TiffTag::ImageLength).await?;
        let tile_width = read_required_u32(&values, ifd, TiffTag::TileWidth).await?;
        let tile_height = read_required_u32(&values, ifd, TiffTag::TileLength).await?;

        if width == 0 || height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::ImageWidth.name(),
                message: format!("image size {}x{} is empty", width, height),
            });
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::TileWidth.name(),
                message: format!("tile size {}x{} is empty", tile_width, tile_height),
            });
        }
        if tile_width > MAX_TILE_DIMENSION || tile_height > MAX_TILE_DIMENSION {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::TileWidth.name(),
                message: format!(
                    "tile size {}x{} exceeds {} pixels",
                    tile_width, tile_height, MAX_TILE_DIMENSION
                ),
            });
        }

        let samples_per_pixel = match ifd.get_entry_by_tag(TiffTag::SamplesPerPixel) {
            Some(entry) => {
                let spp = values.read_u32(TiffTag::SamplesPerPixel, entry).await?;
                u16::try_from(spp).map_err(|_| TiffError::InvalidTagValue {
                    tag: TiffTag::SamplesPerPixel.name(),
                    message: format!("{} samples per pixel", spp),
                })?
            }
            None => 1,
        };

        // One value per sample; the pixel path only handles uniform depths.
        let bits_per_sample = match ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
            Some(entry) => {
                let bits = values.read_u16_array(TiffTag::BitsPerSample, entry).await?;
                let first = bits.first().copied().unwrap_or(1);
                if bits.iter().any(|&b| b != first) {
                    return Err(TiffError::InvalidTagValue {
                        tag: TiffTag::BitsPerSample.name(),
                        message: format!("mixed sample depths {:?}", bits),
                    });
                }
                first
            }
            None => 1,
        };

        let extra_samples = match ifd.get_entry_by_tag(TiffTag::ExtraSamples) {
            Some(entry) => values.read_u16_array(TiffTag::ExtraSamples, entry).await?,
            None => Vec::new(),
        };

        let compression = match ifd.get_entry_by_tag(TiffTag::Compression) {
            Some(entry) => values.read_u32(TiffTag::Compression, entry).await? as u16,
            None => Compression::None as u16,
        };

        let predictor = match ifd.get_entry_by_tag(TiffTag::Predictor) {
            Some(entry) => {
                let raw = values.read_u32(TiffTag::Predictor, entry).await? as u16;
                Predictor::from_u16(raw).ok_or(TiffError::InvalidTagValue {
                    tag: TiffTag::Predictor.name(),
                    message: format!("unsupported predictor {}", raw),
                })?
            }
            None => Predictor::None,
        };

        if let Some(entry) = ifd.get_entry_by_tag(TiffTag::PlanarConfiguration) {
            let planar = values
                .read_u64_array(TiffTag::PlanarConfiguration, entry)
                .await?;
            if planar.first() == Some(&PLANAR_SEPARATE) && samples_per_pixel > 1 {
                return Err(TiffError::InvalidTagValue {
                    tag: TiffTag::PlanarConfiguration.name(),
                    message: "separate sample planes are not supported".to_string(),
                });
            }
        }

        let offsets_entry = ifd
            .get_entry_by_tag(TiffTag::TileOffsets)
            .ok_or(TiffError::MissingTag(TiffTag::TileOffsets.name()))?;
        let counts_entry = ifd
            .get_entry_by_tag(TiffTag::TileByteCounts)
            .ok_or(TiffError::MissingTag(TiffTag::TileByteCounts.name()))?;

        let tile_offsets = values
            .read_u64_array(TiffTag::TileOffsets, offsets_entry)
            .await?;
        let tile_byte_counts = values
            .read_u64_array(TiffTag::TileByteCounts, counts_entry)
            .await?;

        let tiles_x = width.div_ceil(tile_width);
        let tiles_y = height.div_ceil(tile_height);
        let expected = tiles_x as usize * tiles_y as usize;

        if tile_offsets.len() < expected || tile_byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::TileOffsets.name(),
                message: format!(
                    "level {} needs {} tiles, found {} offsets and {} byte counts",
                    level_index,
                    expected,
                    tile_offsets.len(),
                    tile_byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match ifd.get_entry_by_tag(TiffTag::JpegTables) {
            Some(entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };

        Ok(PyramidLevel {
            level_index,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
            samples_per_pixel,
            bits_per_sample,
            extra_samples,
            compression,
            predictor,
            byte_order: header.byte_order,
            tile_offsets,
            tile_byte_counts,
            jpeg_tables,
        })
    }

    pub fn image_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn tile_size(&self) -> Size {
        Size::new(self.tile_width, self.tile_height)
    }

    /// `None` for compression codes this reader does not know by name.
    pub fn compression_scheme(&self) -> Option<Compression> {
        Compression::from_u16(self.compression)
    }

    /// Row-major index of a tile, `None` when outside the grid.
    pub fn tile_index(&self, coord: TileCoord) -> Option<usize> {
        if coord.col >= self.tiles_x || coord.row >= self.tiles_y {
            return None;
        }
        Some(coord.row as usize * self.tiles_x as usize + coord.col as usize)
    }

    /// File offset and byte count of a tile.
    pub fn tile_location(&self, coord: TileCoord) -> Option<(u64, u64)> {
        let index = self.tile_index(coord)?;
        Some((self.tile_offsets[index], self.tile_byte_counts[index]))
    }

    /// Valid pixel area of a tile in level coordinates.
    ///
    /// Edge tiles are stored padded to the full tile size; the rectangle is
    /// clipped to the image.
    pub fn tile_rect(&self, coord: TileCoord) -> Option<Rect> {
        self.tile_index(coord)?;
        let x = coord.col * self.tile_width;
        let y = coord.row * self.tile_height;
        Some(Rect::new(
            x,
            y,
            self.tile_width.min(self.width - x),
            self.tile_height.min(self.height - y),
        ))
    }
}

async fn read_required_u32<R: RangeReader>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<u32, TiffError> {
    let entry = ifd
        .get_entry_by_tag(tag)
        .ok_or(TiffError::MissingTag(tag.name()))?;
    values.read_u32(tag, entry).await
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// All levels of a tiled pyramid, level 0 first.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    pub levels: Vec<PyramidLevel>,
    /// Free-form description of the first directory, when present
    pub description: Option<String>,
}

impl TiffPyramid {
    /// Parse the header and the leading run of tiled directories.
    ///
    /// Fails when the first directory is not tiled. Directories after the
    /// first untiled one are never read.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = BIGTIFF_HEADER_SIZE.min(reader.size() as usize);
        if header_len < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: reader.size(),
            });
        }
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let mut levels = Vec::new();
        let mut description = None;
        let mut visited = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && visited.len() < MAX_IFDS {
            if !visited.insert(offset) {
                warn!(
                    file = reader.identifier(),
                    offset, "IFD chain loops back on itself, stopping"
                );
                break;
            }

            let ifd = Self::read_ifd(reader, &header, offset).await?;
            let ifd_index = visited.len() - 1;

            if ifd_index == 0 {
                if !ifd.is_tiled() {
                    return Err(if ifd.is_stripped() {
                        TiffError::StripOrganization
                    } else {
                        TiffError::MissingTag(TiffTag::TileWidth.name())
                    });
                }
                if let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) {
                    description = ValueReader::new(reader, &header)
                        .read_string(entry)
                        .await
                        .ok();
                }
            } else if !ifd.is_tiled() {
                warn!(
                    file = reader.identifier(),
                    ifd_index, "untiled directory ends the pyramid"
                );
                break;
            }

            let level =
                PyramidLevel::load(reader, &header, &ifd, ifd_index, levels.len()).await?;
            levels.push(level);
            offset = ifd.next_ifd_offset;
        }

        Ok(TiffPyramid {
            header,
            levels,
            description,
        })
    }

    async fn read_ifd<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        offset: u64,
    ) -> Result<Ifd, TiffError> {
        if offset >= reader.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
        let entry_count = header.read_entry_count(&count_bytes);
        let ifd_size = Ifd::calculate_size(entry_count, header)
            .ok_or(TiffError::InvalidIfdOffset(offset))?;

        let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
        Ifd::parse(&ifd_bytes, header)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    /// Check that every level is no larger than the one before it.
    pub fn check_level_order(&self) -> Result<(), TiffError> {
        for pair in self.levels.windows(2) {
            let (previous, level) = (&pair[0], &pair[1]);
            if level.width > previous.width || level.height > previous.height {
                return Err(TiffError::LevelOrder {
                    level: level.level_index,
                    width: level.width,
                    height: level.height,
                    previous_width: previous.width,
                    previous_height: previous.height,
                });
            }
        }
        Ok(())
    }
}
