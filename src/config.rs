//! Command-line configuration.
//!
//! Three subcommands share one binary:
//!
//! - `serve` - HTTP tile server over a directory of pyramid files
//! - `inspect` - print the level table of one file
//! - `extract` - write one tile, one full level or the thumbnail as PNG
//!
//! # Environment Variables
//!
//! Every `serve` option can be set with the `TILEWALL_` prefix:
//!
//! - `TILEWALL_ROOT` - Directory holding the pyramid files (required)
//! - `TILEWALL_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILEWALL_PORT` - Server port (default: 3000)
//! - `TILEWALL_CACHE_PYRAMIDS` - Max opened pyramids to keep (default: 64)
//! - `TILEWALL_CACHE_TILES` - Encoded tile cache size in bytes (default: 100MB)
//! - `TILEWALL_JPEG_QUALITY` - Default JPEG quality (default: 80)
//! - `TILEWALL_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `TILEWALL_CORS_ORIGINS` - Comma-separated allowed origins (default: any)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pyramid::DEFAULT_PYRAMID_CACHE_CAPACITY;
use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::tile::{is_valid_quality, DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY};

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 3000;

/// Tile engine for very large images on display walls.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilewall")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve tiles of the pyramids in a directory over HTTP
    Serve(ServeConfig),

    /// Print the levels of a pyramid file
    Inspect(InspectConfig),

    /// Write a tile, a full level or the thumbnail of a pyramid as PNG
    Extract(ExtractConfig),
}

// =============================================================================
// serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Directory holding the pyramid files (.tif, .tiff, .btf).
    #[arg(long, env = "TILEWALL_ROOT")]
    pub root: PathBuf,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILEWALL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILEWALL_PORT")]
    pub port: u16,

    /// Maximum number of opened pyramids to keep.
    #[arg(long, default_value_t = DEFAULT_PYRAMID_CACHE_CAPACITY, env = "TILEWALL_CACHE_PYRAMIDS")]
    pub cache_pyramids: usize,

    /// Size of the encoded tile cache in bytes.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "TILEWALL_CACHE_TILES")]
    pub cache_tiles: usize,

    /// Default JPEG quality for `.jpg` tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "TILEWALL_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILEWALL_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin when unset.
    #[arg(long, env = "TILEWALL_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.root.is_dir() {
            return Err(format!(
                "root {} is not a directory. Set --root or TILEWALL_ROOT",
                self.root.display()
            ));
        }
        if self.cache_pyramids == 0 {
            return Err("cache_pyramids must be greater than 0".to_string());
        }
        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// inspect / extract
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Pyramid file to inspect.
    pub file: PathBuf,

    /// Print the levels as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractConfig {
    /// Pyramid file to read.
    pub file: PathBuf,

    /// Output PNG path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Level to read from. Without --col/--row or --full, writes the thumbnail.
    #[arg(long)]
    pub level: Option<usize>,

    /// Tile column.
    #[arg(long, requires = "row")]
    pub col: Option<u32>,

    /// Tile row.
    #[arg(long, requires = "col")]
    pub row: Option<u32>,

    /// Write the whole level.
    #[arg(long, default_value_t = false, conflicts_with_all = ["col", "row"])]
    pub full: bool,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// What an extract run writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractTarget {
    Thumbnail,
    Tile { level: usize, col: u32, row: u32 },
    Level(usize),
}

impl ExtractConfig {
    pub fn target(&self) -> Result<ExtractTarget, String> {
        match (self.level, self.col, self.row, self.full) {
            (None, None, None, false) => Ok(ExtractTarget::Thumbnail),
            (level, Some(col), Some(row), false) => Ok(ExtractTarget::Tile {
                level: level.unwrap_or(0),
                col,
                row,
            }),
            (level, None, None, true) => Ok(ExtractTarget::Level(level.unwrap_or(0))),
            (Some(_), None, None, false) => {
                Err("--level needs either --col/--row or --full".to_string())
            }
            _ => Err("--col and --row must be given together, without --full".to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
