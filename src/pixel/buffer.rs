use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use serde::Serialize;

use crate::error::PixelFormatError;
use crate::geometry::{Rect, Size};

// =============================================================================
// PixelFormat
// =============================================================================

/// Canonical in-memory pixel formats.
///
/// `Argb32` is a 32-bit `0xAARRGGBB` word per pixel in little-endian memory
/// order, so the bytes of a pixel read `[b, g, r, a]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Gray8,
    Rgb888,
    Argb32,
}

impl PixelFormat {
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Argb32 => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Rgb888 => "rgb888",
            PixelFormat::Argb32 => "argb32",
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Argb32)
    }
}

// =============================================================================
// PixelBuffer
// =============================================================================

/// Byte size of a `width` x `height` image, or `TooLarge` when it does not fit
/// in an allocation.
pub(crate) fn buffer_bytes(
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Result<usize, PixelFormatError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(bytes_per_pixel))
        .filter(|&len| len <= isize::MAX as usize)
        .ok_or(PixelFormatError::TooLarge { width, height })
}

/// A tightly packed image in one of the canonical formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap existing bytes, checking their length against the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, PixelFormatError> {
        let expected = buffer_bytes(width, height, format.bytes_per_pixel())?;
        if data.len() != expected {
            return Err(PixelFormatError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Zero-filled buffer: black for opaque formats, transparent for `Argb32`.
    ///
    /// Only for sizes already known to be addressable, such as a level's tile
    /// size; use [`PixelBuffer::try_blank`] for anything else.
    ///
    /// # Panics
    ///
    /// Panics if the byte size overflows `usize`.
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> Self {
        match Self::try_blank(width, height, format) {
            Ok(buffer) => buffer,
            Err(err) => panic!("{}", err),
        }
    }

    /// Zero-filled buffer, failing when the size cannot be addressed.
    pub fn try_blank(width: u32, height: u32, format: PixelFormat) -> Result<Self, PixelFormatError> {
        let len = buffer_bytes(width, height, format.bytes_per_pixel())?;
        Ok(Self {
            width,
            height,
            format,
            data: vec![0; len],
        })
    }

    /// The 0x0 placeholder returned when nothing could be read.
    pub fn empty() -> Self {
        Self::blank(0, 0, PixelFormat::Argb32)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.stride() + x as usize * bpp;
        Some(&self.data[start..start + bpp])
    }

    /// Copy of the area inside `rect`, clipped to the buffer.
    pub fn crop(&self, rect: Rect) -> PixelBuffer {
        let bounds = Rect::new(0, 0, self.width, self.height);
        let Some(area) = bounds.intersection(&rect) else {
            return PixelBuffer::blank(0, 0, self.format);
        };
        if area == bounds {
            return self.clone();
        }

        let bpp = self.format.bytes_per_pixel();
        let row_len = area.width as usize * bpp;
        let mut data = Vec::with_capacity(row_len * area.height as usize);
        for y in area.y..area.y + area.height {
            let start = y as usize * self.stride() + area.x as usize * bpp;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        PixelBuffer {
            width: area.width,
            height: area.height,
            format: self.format,
            data,
        }
    }

    /// Draw `src` with its top-left corner at `(x, y)`, clipping at the edges.
    pub fn blit(&mut self, src: &PixelBuffer, x: u32, y: u32) -> Result<(), PixelFormatError> {
        if src.format != self.format {
            return Err(PixelFormatError::FormatMismatch {
                expected: self.format.name(),
                actual: src.format.name(),
            });
        }
        if x >= self.width || y >= self.height {
            return Ok(());
        }

        let bpp = self.format.bytes_per_pixel();
        let cols = src.width.min(self.width - x) as usize;
        let rows = src.height.min(self.height - y);
        let dst_stride = self.stride();
        let src_stride = src.stride();

        for row in 0..rows {
            let dst_start = (y + row) as usize * dst_stride + x as usize * bpp;
            let src_start = row as usize * src_stride;
            self.data[dst_start..dst_start + cols * bpp]
                .copy_from_slice(&src.data[src_start..src_start + cols * bpp]);
        }
        Ok(())
    }

    /// Re-express the pixels in another canonical format.
    ///
    /// Dropping alpha discards it; reducing colour to gray uses integer
    /// Rec. 601 luma weights.
    pub fn convert(&self, format: PixelFormat) -> PixelBuffer {
        if format == self.format {
            return self.clone();
        }

        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(
            self.width as usize * self.height as usize * format.bytes_per_pixel(),
        );

        for px in self.data.chunks_exact(bpp) {
            // Normalize to (r, g, b, a) first.
            let (r, g, b, a) = match self.format {
                PixelFormat::Gray8 => (px[0], px[0], px[0], 0xFF),
                PixelFormat::Rgb888 => (px[0], px[1], px[2], 0xFF),
                PixelFormat::Argb32 => (px[2], px[1], px[0], px[3]),
            };
            match format {
                PixelFormat::Gray8 => data.push(luma(r, g, b)),
                PixelFormat::Rgb888 => data.extend_from_slice(&[r, g, b]),
                PixelFormat::Argb32 => data.extend_from_slice(&[b, g, r, a]),
            }
        }

        PixelBuffer {
            width: self.width,
            height: self.height,
            format,
            data,
        }
    }

    /// Hand the pixels to the `image` crate in its own channel order.
    pub fn into_dynamic_image(self) -> Result<DynamicImage, PixelFormatError> {
        let expected = self.data.len();
        let (width, height) = (self.width, self.height);
        let mismatch = || PixelFormatError::BufferSize {
            expected,
            actual: 0,
        };

        match self.format {
            PixelFormat::Gray8 => GrayImage::from_raw(width, height, self.data)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(mismatch),
            PixelFormat::Rgb888 => RgbImage::from_raw(width, height, self.data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(mismatch),
            PixelFormat::Argb32 => {
                let mut data = self.data;
                for px in data.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                RgbaImage::from_raw(width, height, data)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(mismatch)
            }
        }
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as u8
}
