//! Tile payload decompression.
//!
//! Turns the bytes stored for one tile into interleaved native samples of
//! exactly `tile_width * tile_height` pixels, ready for the pixel normalizer.
//!
//! ```text
//! stored bytes ──▶ decompress ──▶ undo predictor ──▶ RawTile
//!                  (none, PackBits, LZW, Deflate, JPEG)
//! ```

use std::io::{Cursor, Read};

use flate2::read::ZlibDecoder;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use weezl::LzwStatus;

use crate::error::CodecError;
use crate::format::jpeg::prepare_tile_jpeg;
use crate::format::tiff::{ByteOrder, Compression, Predictor};
use crate::pixel::{RawTile, SampleLayout};

/// How one level's tiles are encoded.
#[derive(Debug, Clone, Copy)]
pub struct TileEncoding<'a> {
    pub compression: Compression,
    pub predictor: Predictor,
    /// Shared JPEG tables, only meaningful for JPEG levels
    pub jpeg_tables: Option<&'a [u8]>,
}

/// Decode one stored tile into `width` x `height` pixels of `layout`.
///
/// Truncated payloads and decoder failures surface as
/// [`CodecError::Corrupt`]; they never panic or produce a short buffer.
pub fn decode_tile(
    data: &[u8],
    encoding: &TileEncoding<'_>,
    width: u32,
    height: u32,
    layout: SampleLayout,
) -> Result<RawTile, CodecError> {
    let expected = layout
        .buffer_len(width, height)
        .map_err(|e| CodecError::Corrupt(e.to_string()))?;

    let mut samples = match encoding.compression {
        Compression::None => data.to_vec(),
        Compression::PackBits => unpack_bits(data, expected)?,
        Compression::Deflate | Compression::AdobeDeflate => inflate(data, expected)?,
        Compression::Lzw => unpack_lzw(data, expected)?,
        Compression::Jpeg => {
            let jpeg = prepare_tile_jpeg(encoding.jpeg_tables, data);
            let image = decode_jpeg_limited(&jpeg, width, height)?;
            if (image.width(), image.height()) != (width, height) {
                return Err(CodecError::Corrupt(format!(
                    "JPEG tile is {}x{}, expected {}x{}",
                    image.width(),
                    image.height(),
                    width,
                    height
                )));
            }
            if layout.bits_per_sample != 8 {
                return Err(CodecError::Corrupt(format!(
                    "JPEG tiles carry 8-bit samples, level declares {}",
                    layout.bits_per_sample
                )));
            }
            jpeg_samples(image, layout.samples_per_pixel)
        }
        other => return Err(CodecError::Unsupported(other)),
    };

    if samples.len() < expected {
        return Err(CodecError::Corrupt(format!(
            "truncated tile: expected {} bytes, got {}",
            expected,
            samples.len()
        )));
    }
    samples.truncate(expected);

    if encoding.predictor == Predictor::Horizontal {
        undo_horizontal_predictor(&mut samples, width as usize, layout)?;
    }

    Ok(RawTile {
        width,
        height,
        layout,
        data: samples,
    })
}

/// Inflate at most `expected` bytes; anything the stream holds past that is
/// never decompressed.
fn inflate(data: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoder = ZlibDecoder::new(data).take(expected as u64);
    let mut out = Vec::with_capacity(expected);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Corrupt(format!("Deflate: {}", e)))?;
    Ok(out)
}

/// Decode TIFF-flavoured LZW into a buffer of `expected` bytes, stopping once
/// it is full.
fn unpack_lzw(data: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
    let mut out = vec![0u8; expected];
    let mut filled = 0;
    let mut input = data;

    while filled < expected {
        let result = decoder.decode_bytes(input, &mut out[filled..]);
        filled += result.consumed_out;
        input = &input[result.consumed_in..];
        match result.status {
            Ok(LzwStatus::Ok) => {}
            Ok(LzwStatus::Done) | Ok(LzwStatus::NoProgress) => break,
            Err(e) => return Err(CodecError::Corrupt(format!("LZW: {}", e))),
        }
    }

    out.truncate(filled);
    Ok(out)
}

/// Expand PackBits run-length data.
///
/// A header byte `n` in 0..=127 copies the next `n + 1` bytes literally,
/// -127..=-1 repeats the next byte `1 - n` times and -128 is skipped.
fn unpack_bits(data: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(expected);
    let mut i = 0;
    while i < data.len() && out.len() < expected {
        let n = data[i] as i8;
        i += 1;
        match n {
            0..=127 => {
                let len = n as usize + 1;
                let literal = data
                    .get(i..i + len)
                    .ok_or_else(|| CodecError::Corrupt("PackBits: literal run past end".into()))?;
                out.extend_from_slice(literal);
                i += len;
            }
            -128 => {}
            _ => {
                let value = *data
                    .get(i)
                    .ok_or_else(|| CodecError::Corrupt("PackBits: repeat run past end".into()))?;
                out.resize(out.len() + (1 - n as isize) as usize, value);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Decode a complete JPEG stream.
pub fn decode_jpeg(data: &[u8]) -> Result<DynamicImage, CodecError> {
    ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg)
        .decode()
        .map_err(|e| CodecError::Corrupt(format!("JPEG: {}", e)))
}

/// Decode a JPEG tile, refusing before allocation if its header declares more
/// than `width` x `height` pixels.
fn decode_jpeg_limited(data: &[u8], width: u32, height: u32) -> Result<DynamicImage, CodecError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(width);
    limits.max_image_height = Some(height);

    let mut reader = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg);
    reader.limits(limits);
    reader
        .decode()
        .map_err(|e| CodecError::Corrupt(format!("JPEG: {}", e)))
}

/// Interleaved 8-bit samples of a decoded JPEG with the requested sample count.
fn jpeg_samples(image: DynamicImage, samples_per_pixel: u16) -> Vec<u8> {
    match samples_per_pixel {
        1 => image.to_luma8().into_raw(),
        2 => image.to_luma_alpha8().into_raw(),
        4 => image.to_rgba8().into_raw(),
        _ => image.to_rgb8().into_raw(),
    }
}

/// The natural sample layout of a decoded JPEG.
pub fn jpeg_to_raw(image: DynamicImage) -> RawTile {
    let (width, height) = (image.width(), image.height());
    let color = image.color();
    let layout = if color.has_alpha() {
        SampleLayout::rgba8()
    } else if color.channel_count() == 1 {
        SampleLayout::gray8()
    } else {
        SampleLayout::rgb8()
    };
    RawTile {
        width,
        height,
        layout,
        data: jpeg_samples(image, layout.samples_per_pixel),
    }
}

/// Reverse horizontal differencing row by row.
///
/// Each sample was stored as the difference to the same sample of the
/// previous pixel, so the running sum restores it. Sixteen-bit samples are
/// summed as words in the file's byte order.
fn undo_horizontal_predictor(
    data: &mut [u8],
    width: usize,
    layout: SampleLayout,
) -> Result<(), CodecError> {
    let spp = layout.samples_per_pixel as usize;
    let bytes_per_sample = layout
        .bytes_per_sample()
        .map_err(|e| CodecError::Corrupt(e.to_string()))?;
    let row_bytes = width * spp * bytes_per_sample;
    if row_bytes == 0 {
        return Ok(());
    }

    for row in data.chunks_exact_mut(row_bytes) {
        match bytes_per_sample {
            1 => {
                for i in spp..row.len() {
                    row[i] = row[i].wrapping_add(row[i - spp]);
                }
            }
            _ => {
                let read = |b: &[u8]| match layout.byte_order {
                    ByteOrder::LittleEndian => u16::from_le_bytes([b[0], b[1]]),
                    ByteOrder::BigEndian => u16::from_be_bytes([b[0], b[1]]),
                };
                for i in spp..width * spp {
                    let prev = read(&row[(i - spp) * 2..]);
                    let curr = read(&row[i * 2..]);
                    let sum = curr.wrapping_add(prev);
                    let bytes = match layout.byte_order {
                        ByteOrder::LittleEndian => sum.to_le_bytes(),
                        ByteOrder::BigEndian => sum.to_be_bytes(),
                    };
                    row[i * 2..i * 2 + 2].copy_from_slice(&bytes);
                }
            }
        }
    }
    Ok(())
}
