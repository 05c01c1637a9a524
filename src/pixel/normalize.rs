//! Conversion of native sample layouts into canonical pixel formats.
//!
//! | samples | extra samples      | canonical | byte mapping per pixel   |
//! |---------|--------------------|-----------|--------------------------|
//! | 1       | any                | Gray8     | `[v]`                    |
//! | 2       | associated alpha   | Argb32    | `[v, a]` to `[v, v, v, a]` |
//! | 3       | any                | Rgb888    | `[r, g, b]` unchanged    |
//! | 4       | any                | Argb32    | `[r, g, b, a]` to `[b, g, r, a]` |
//!
//! Sixteen-bit samples are reduced to their most significant byte first.

use std::borrow::Cow;

use crate::error::PixelFormatError;
use crate::format::tiff::ByteOrder;

use super::buffer::{buffer_bytes, PixelBuffer, PixelFormat};

/// ExtraSamples code for associated (premultiplied) alpha.
const EXTRA_SAMPLE_ASSOCIATED_ALPHA: u16 = 1;
const EXTRA_SAMPLE_UNASSOCIATED_ALPHA: u16 = 2;

/// Meaning of the first extra sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AlphaKind {
    /// No extra sample declared
    #[default]
    None,
    Unspecified,
    Associated,
    Unassociated,
}

impl AlphaKind {
    /// Interpret raw ExtraSamples values; only the first one matters.
    pub fn from_extra_samples(values: &[u16]) -> Self {
        match values.first() {
            None => AlphaKind::None,
            Some(&EXTRA_SAMPLE_ASSOCIATED_ALPHA) => AlphaKind::Associated,
            Some(&EXTRA_SAMPLE_UNASSOCIATED_ALPHA) => AlphaKind::Unassociated,
            Some(_) => AlphaKind::Unspecified,
        }
    }
}

/// How samples are laid out in a native, interleaved tile buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleLayout {
    pub samples_per_pixel: u16,
    pub bits_per_sample: u16,
    pub alpha: AlphaKind,
    /// Only relevant for 16-bit samples
    pub byte_order: ByteOrder,
}

impl SampleLayout {
    pub const fn new(samples_per_pixel: u16, bits_per_sample: u16, alpha: AlphaKind) -> Self {
        Self {
            samples_per_pixel,
            bits_per_sample,
            alpha,
            byte_order: ByteOrder::LittleEndian,
        }
    }

    pub const fn gray8() -> Self {
        Self::new(1, 8, AlphaKind::None)
    }

    pub const fn rgb8() -> Self {
        Self::new(3, 8, AlphaKind::None)
    }

    pub const fn rgba8() -> Self {
        Self::new(4, 8, AlphaKind::Unassociated)
    }

    pub const fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn bytes_per_sample(&self) -> Result<usize, PixelFormatError> {
        match self.bits_per_sample {
            8 => Ok(1),
            16 => Ok(2),
            other => Err(PixelFormatError::UnsupportedBitDepth(other)),
        }
    }

    /// Size of a `width` x `height` buffer in this layout.
    pub fn buffer_len(&self, width: u32, height: u32) -> Result<usize, PixelFormatError> {
        let bytes_per_pixel = self.samples_per_pixel as usize * self.bytes_per_sample()?;
        buffer_bytes(width, height, bytes_per_pixel)
    }

    /// The canonical format this layout normalizes to.
    pub fn canonical_format(&self) -> Result<PixelFormat, PixelFormatError> {
        match self.samples_per_pixel {
            1 => Ok(PixelFormat::Gray8),
            2 if self.alpha == AlphaKind::Associated => Ok(PixelFormat::Argb32),
            2 => Err(PixelFormatError::UnsupportedLayout {
                reason: format!(
                    "two samples per pixel need associated alpha, found {:?}",
                    self.alpha
                ),
            }),
            3 => Ok(PixelFormat::Rgb888),
            4 => Ok(PixelFormat::Argb32),
            samples_per_pixel => Err(PixelFormatError::UnsupportedFormat { samples_per_pixel }),
        }
    }
}

/// Decompressed tile samples in their native layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTile {
    pub width: u32,
    pub height: u32,
    pub layout: SampleLayout,
    pub data: Vec<u8>,
}

/// Convert a native tile into its canonical pixel format.
///
/// Fails without producing output when the layout is unsupported or the
/// buffer does not hold exactly `width * height` pixels.
pub fn normalize(tile: &RawTile) -> Result<PixelBuffer, PixelFormatError> {
    let layout = tile.layout;
    let format = layout.canonical_format()?;
    let expected = layout.buffer_len(tile.width, tile.height)?;
    if tile.data.len() != expected {
        return Err(PixelFormatError::BufferSize {
            expected,
            actual: tile.data.len(),
        });
    }

    let samples = reduce_to_8_bits(&tile.data, layout)?;

    let data = match layout.samples_per_pixel {
        1 | 3 => samples.into_owned(),
        2 => samples
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0], px[1]])
            .collect(),
        _ => samples
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0], px[3]])
            .collect(),
    };

    PixelBuffer::new(tile.width, tile.height, format, data)
}

/// Keep the most significant byte of every 16-bit sample.
fn reduce_to_8_bits(data: &[u8], layout: SampleLayout) -> Result<Cow<'_, [u8]>, PixelFormatError> {
    if layout.bytes_per_sample()? == 1 {
        return Ok(Cow::Borrowed(data));
    }
    let high = match layout.byte_order {
        ByteOrder::LittleEndian => 1,
        ByteOrder::BigEndian => 0,
    };
    Ok(Cow::Owned(
        data.chunks_exact(2).map(|sample| sample[high]).collect(),
    ))
}
