//! Reading IFD entry values, inline or out of line.
//!
//! Arrays such as `TileOffsets` are fetched with a single positioned read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{IfdEntry, TiffHeader};
use super::tags::{FieldType, TiffTag};

/// Reads entry values respecting the header's byte order and flavour.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Raw value bytes: sliced from the entry when inline, read from the file otherwise.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let offset = entry.value_offset(self.header.byte_order);
        let size = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
            tag: "value",
            message: format!("{} bytes cannot be addressed", size),
        })?;
        Ok(self.reader.read_exact_at(offset, size).await?)
    }

    /// Every value of an integer entry, widened to u64.
    pub async fn read_u64_array(
        &self,
        tag: TiffTag,
        entry: &IfdEntry,
    ) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        let bo = self.header.byte_order;
        let width = field_type.size_in_bytes();

        let values = match field_type {
            FieldType::Byte | FieldType::Undefined => bytes.iter().map(|&b| b as u64).collect(),
            FieldType::Short => bytes
                .chunks_exact(width)
                .map(|c| bo.read_u16(c) as u64)
                .collect(),
            FieldType::Long => bytes
                .chunks_exact(width)
                .map(|c| bo.read_u32(c) as u64)
                .collect(),
            FieldType::Long8 => bytes.chunks_exact(width).map(|c| bo.read_u64(c)).collect(),
            FieldType::Ascii => {
                return Err(TiffError::InvalidTagValue {
                    tag: tag.name(),
                    message: "expected an integer type, got ASCII".to_string(),
                })
            }
        };
        Ok(values)
    }

    /// First value of an integer entry, checked to fit in u32.
    pub async fn read_u32(&self, tag: TiffTag, entry: &IfdEntry) -> Result<u32, TiffError> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }

        let values = self.read_u64_array(tag, entry).await?;
        let first = values.first().copied().ok_or(TiffError::InvalidTagValue {
            tag: tag.name(),
            message: "entry has no values".to_string(),
        })?;
        u32::try_from(first).map_err(|_| TiffError::InvalidTagValue {
            tag: tag.name(),
            message: format!("value {} does not fit in 32 bits", first),
        })
    }

    /// Every value of a Short entry, such as `BitsPerSample` or `ExtraSamples`.
    pub async fn read_u16_array(
        &self,
        tag: TiffTag,
        entry: &IfdEntry,
    ) -> Result<Vec<u16>, TiffError> {
        self.read_u64_array(tag, entry)
            .await?
            .into_iter()
            .map(|v| {
                u16::try_from(v).map_err(|_| TiffError::InvalidTagValue {
                    tag: tag.name(),
                    message: format!("value {} does not fit in 16 bits", v),
                })
            })
            .collect()
    }

    /// NUL-terminated ASCII value.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: "ascii",
                message: format!("expected ASCII, got type {}", entry.field_type_raw),
            });
        }
        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}
