use thiserror::Error;

use crate::format::tiff::Compression;

/// I/O errors raised while reading pyramid files.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The file exists but could not be opened or inspected
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// A positioned read failed
    #[error("Read error: {0}")]
    Read(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// No content with this identifier
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Errors raised while parsing the TIFF container.
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// IFD offset points outside the file
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// The first image directory is stored in strips rather than tiles
    #[error("Unsupported organization: image is stored in strips, not tiles")]
    StripOrganization,

    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// A level is larger than the level before it
    #[error("Pyramid levels are not ordered by decreasing size: level {level} is {width}x{height}, previous level is {previous_width}x{previous_height}")]
    LevelOrder {
        level: usize,
        width: u32,
        height: u32,
        previous_width: u32,
        previous_height: u32,
    },
}

/// Errors raised when a native sample layout cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PixelFormatError {
    /// Samples per pixel outside 1..=4
    #[error("Unsupported pixel format: {samples_per_pixel} samples per pixel")]
    UnsupportedFormat { samples_per_pixel: u16 },

    /// Sample count is supported but the accompanying metadata is not
    #[error("Unknown data layout: {reason}")]
    UnsupportedLayout { reason: String },

    #[error("Unsupported bit depth: {0} bits per sample")]
    UnsupportedBitDepth(u16),

    #[error("Pixel buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    /// Dimensions whose byte size cannot be addressed
    #[error("Pixel buffer of {width}x{height} is too large")]
    TooLarge { width: u32, height: u32 },

    /// Two buffers with different canonical formats were combined
    #[error("Pixel format mismatch: {expected} vs {actual}")]
    FormatMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Errors raised while decompressing a single tile payload.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("Unsupported compression: {}", .0.name())]
    Unsupported(Compression),

    /// Payload is truncated or otherwise undecodable
    #[error("Corrupt tile data: {0}")]
    Corrupt(String),
}

/// Errors raised by the pyramid store.
#[derive(Debug, Clone, Error)]
pub enum PyramidError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The file is not a usable tiled pyramid
    #[error("Format error: {0}")]
    Format(#[from] TiffError),

    #[error("Invalid level {level}: pyramid has {level_count} levels")]
    InvalidLevel { level: usize, level_count: usize },

    #[error("Tile ({col}, {row}) is outside level {level} grid of {tiles_x}x{tiles_y} tiles")]
    InvalidCoordinate {
        level: usize,
        col: u32,
        row: u32,
        tiles_x: u32,
        tiles_y: u32,
    },

    #[error("Level {level} uses unsupported compression {name}")]
    UnsupportedCompression { level: usize, name: String },

    #[error("Pixel format error: {0}")]
    Pixel(#[from] PixelFormatError),

    #[error("Failed to decode tile ({col}, {row}) @ LOD {level}: {message}")]
    Decode {
        level: usize,
        col: u32,
        row: u32,
        message: String,
    },

    /// A blocking decode task was cancelled or panicked
    #[error("Decode worker failed: {0}")]
    Worker(String),
}

/// Errors raised while assembling a streamed frame.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// A channel's tiles do not form a complete row-major grid
    #[error("Incomplete frame on channel {channel}: {reason}")]
    IncompleteFrame { channel: u8, reason: String },

    #[error("Frame cannot be assembled: {reason}")]
    EmptyFrame { reason: String },

    #[error("Tile index {index} out of range (frame has {count} tiles)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Failed to decode tile {index} on channel {channel}: {message}")]
    Decode {
        channel: u8,
        index: usize,
        message: String,
    },

    #[error("Pixel format error: {0}")]
    Pixel(#[from] PixelFormatError),

    #[error("Decode worker failed: {0}")]
    Worker(String),
}

/// Errors surfaced by the tile service and mapped to HTTP responses.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    #[error("Pyramid not found: {id}")]
    NotFound { id: String },

    #[error("Invalid level {level}: pyramid has {level_count} levels")]
    InvalidLevel { level: usize, level_count: usize },

    #[error("Tile ({col}, {row}) out of bounds for level {level} (grid is {tiles_x}x{tiles_y})")]
    TileOutOfBounds {
        level: usize,
        col: u32,
        row: u32,
        tiles_x: u32,
        tiles_y: u32,
    },

    #[error("Invalid JPEG quality {quality}: must be between 1 and 100")]
    InvalidQuality { quality: u8 },

    #[error("Unsupported output format: {extension}")]
    InvalidFormat { extension: String },

    /// Region requests must have a non-empty area inside the level
    #[error("Invalid region: {reason}")]
    InvalidRegion { reason: String },

    #[error("Pyramid error: {0}")]
    Pyramid(PyramidError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("I/O error: {0}")]
    Io(IoError),

    #[error("Failed to encode tile: {message}")]
    Encode { message: String },
}

impl From<IoError> for TileError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::NotFound(id) => TileError::NotFound { id },
            other => TileError::Io(other),
        }
    }
}

impl From<PixelFormatError> for TileError {
    fn from(err: PixelFormatError) -> Self {
        TileError::Pyramid(PyramidError::Pixel(err))
    }
}

impl From<PyramidError> for TileError {
    fn from(err: PyramidError) -> Self {
        match err {
            PyramidError::InvalidLevel { level, level_count } => {
                TileError::InvalidLevel { level, level_count }
            }
            PyramidError::InvalidCoordinate {
                level,
                col,
                row,
                tiles_x,
                tiles_y,
            } => TileError::TileOutOfBounds {
                level,
                col,
                row,
                tiles_x,
                tiles_y,
            },
            PyramidError::Io(io) => TileError::from(io),
            PyramidError::Format(TiffError::Io(io)) => TileError::from(io),
            other => TileError::Pyramid(other),
        }
    }
}
