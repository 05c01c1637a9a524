//! Output encoding of tiles and images.
//!
//! Tiles leave the service as PNG (lossless, keeps alpha) or JPEG (smaller,
//! opaque). JPEG output drops the alpha channel of `Argb32` buffers.

use std::fmt;
use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;

use crate::error::TileError;
use crate::pixel::{PixelBuffer, PixelFormat};

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

pub const MIN_JPEG_QUALITY: u8 = 1;
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Requested output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageEncoding {
    Png,
    Jpeg { quality: u8 },
}

impl ImageEncoding {
    /// Encoding for a file extension such as `png` or `jpg`.
    pub fn from_extension(extension: &str, quality: u8) -> Result<Self, TileError> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageEncoding::Png),
            "jpg" | "jpeg" => Ok(ImageEncoding::Jpeg { quality }),
            _ => Err(TileError::InvalidFormat {
                extension: extension.to_string(),
            }),
        }
    }

    pub const fn content_type(self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
            ImageEncoding::Jpeg { .. } => "image/jpeg",
        }
    }

    pub const fn quality(self) -> Option<u8> {
        match self {
            ImageEncoding::Png => None,
            ImageEncoding::Jpeg { quality } => Some(quality),
        }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageEncoding::Png => f.write_str("png"),
            ImageEncoding::Jpeg { quality } => write!(f, "jpeg@{}", quality),
        }
    }
}

/// Encodes canonical pixel buffers for the wire.
#[derive(Debug, Clone, Default)]
pub struct TileEncoder {}

impl TileEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode `pixels` as PNG or JPEG.
    ///
    /// JPEG quality is clamped into range; empty buffers are rejected.
    pub fn encode(&self, pixels: &PixelBuffer, encoding: ImageEncoding) -> Result<Bytes, TileError> {
        if pixels.is_empty() {
            return Err(TileError::Encode {
                message: "cannot encode an empty image".to_string(),
            });
        }
        let encode_error = |e: image::ImageError| TileError::Encode {
            message: e.to_string(),
        };
        let pixel_error = |e: crate::error::PixelFormatError| TileError::Encode {
            message: e.to_string(),
        };

        let mut output = Vec::new();
        match encoding {
            ImageEncoding::Png => {
                let image = pixels.clone().into_dynamic_image().map_err(pixel_error)?;
                image
                    .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                    .map_err(encode_error)?;
            }
            ImageEncoding::Jpeg { quality } => {
                let opaque = match pixels.format() {
                    PixelFormat::Argb32 => pixels.convert(PixelFormat::Rgb888),
                    _ => pixels.clone(),
                };
                let image = opaque.into_dynamic_image().map_err(pixel_error)?;
                JpegEncoder::new_with_quality(&mut output, clamp_quality(quality))
                    .encode_image(&image)
                    .map_err(encode_error)?;
            }
        }
        Ok(Bytes::from(output))
    }
}

#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality into 1..=100.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
