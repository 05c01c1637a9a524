//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /pyramids` - List available pyramids
//! - `GET /pyramids/{id}` - Level structure of a pyramid
//! - `GET /pyramids/{id}/select` - Level selection for a target size
//! - `GET /pyramids/{id}/region` - Composed region of one level
//! - `GET /tiles/{id}/{level}/{x}/{y}.png` - Serve a tile (`.jpg` for JPEG)
//! - `GET /thumbnails/{id}.png` - Thumbnail of a pyramid

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{PyramidError, StreamError, TileError};
use crate::geometry::{Rect, Size};
use crate::pyramid::{ContentSource, LevelPolicy};
use crate::tile::{
    ImageEncoding, LevelSelection, PyramidMetadata, TileRequest, TileService, DEFAULT_JPEG_QUALITY,
};

/// Default Cache-Control max-age: one hour.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");
const BLANK_HEADER: HeaderName = HeaderName::from_static("x-tile-blank");
const MISSING_TILES_HEADER: HeaderName = HeaderName::from_static("x-missing-tiles");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
pub struct AppState<S: ContentSource> {
    pub tile_service: Arc<TileService<S>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// JPEG quality used when a request does not name one
    pub default_quality: u8,
}

impl<S: ContentSource> AppState<S> {
    pub fn new(tile_service: TileService<S>) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            default_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    pub fn with_default_quality(mut self, quality: u8) -> Self {
        self.default_quality = quality;
        self
    }

    fn encoding(&self, extension: &str, quality: Option<u8>) -> Result<ImageEncoding, TileError> {
        ImageEncoding::from_extension(extension, quality.unwrap_or(self.default_quality))
    }

    fn image_response(&self, data: bytes::Bytes, encoding: ImageEncoding) -> ImageResponse {
        ImageResponse {
            data,
            encoding,
            cache_max_age: self.cache_max_age,
            headers: Vec::new(),
        }
    }
}

impl<S: ContentSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
            default_quality: self.default_quality,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{id}/{level}/{x}/{filename}` where filename is
/// `{y}.png`, `{y}.jpg` or a bare `{y}` (PNG).
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub id: String,
    pub level: usize,
    pub x: u32,
    pub filename: String,
}

impl TilePathParams {
    /// Row and file extension from the filename.
    pub fn row_and_extension(&self) -> Result<(u32, &str), HandlerError> {
        let (row, extension) = self
            .filename
            .split_once('.')
            .unwrap_or((self.filename.as_str(), "png"));
        let row = row.parse().map_err(|_| {
            HandlerError::BadRequest(format!("invalid tile row: {}", self.filename))
        })?;
        Ok((row, extension))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TileQueryParams {
    /// JPEG quality (1-100)
    #[serde(default)]
    pub quality: Option<u8>,

    /// Serve a blank tile when the tile data cannot be decoded
    #[serde(default)]
    pub blank: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    /// Maximum number of ids to return (default: 100, max: 1000)
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Last id of the previous page
    #[serde(default)]
    pub cursor: Option<String>,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct SelectQueryParams {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub policy: LevelPolicy,
}

#[derive(Debug, Deserialize)]
pub struct RegionQueryParams {
    #[serde(default)]
    pub level: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// `png` (default) or `jpg`
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub quality: Option<u8>,
}

fn default_format() -> String {
    "png".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct ThumbnailQueryParams {
    #[serde(default)]
    pub quality: Option<u8>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct PyramidListResponse {
    pub pyramids: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Encoded image with caching headers.
pub struct ImageResponse {
    data: bytes::Bytes,
    encoding: ImageEncoding,
    cache_max_age: u32,
    headers: Vec<(HeaderName, String)>,
}

impl ImageResponse {
    fn with_header(mut self, name: HeaderName, value: impl ToString) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }
}

impl IntoResponse for ImageResponse {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, self.encoding.content_type().to_string()),
                (
                    header::CACHE_CONTROL,
                    format!("public, max-age={}", self.cache_max_age),
                ),
            ],
            Body::from(self.data),
        )
            .into_response();

        for (name, value) in self.headers {
            if let Ok(value) = value.parse() {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Status, error type and message for a tile error.
fn classify(err: &TileError) -> (StatusCode, &'static str) {
    match err {
        TileError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        TileError::InvalidLevel { .. } => (StatusCode::BAD_REQUEST, "invalid_level"),
        TileError::TileOutOfBounds { .. } => (StatusCode::BAD_REQUEST, "tile_out_of_bounds"),
        TileError::InvalidQuality { .. } => (StatusCode::BAD_REQUEST, "invalid_quality"),
        TileError::InvalidFormat { .. } => (StatusCode::BAD_REQUEST, "invalid_format"),
        TileError::InvalidRegion { .. } => (StatusCode::BAD_REQUEST, "invalid_region"),
        TileError::Pyramid(
            PyramidError::Format(_)
            | PyramidError::UnsupportedCompression { .. }
            | PyramidError::Pixel(_),
        ) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format"),
        TileError::Pyramid(PyramidError::Decode { .. }) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "decode_error")
        }
        TileError::Pyramid(_) => (StatusCode::INTERNAL_SERVER_ERROR, "pyramid_error"),
        TileError::Stream(StreamError::IndexOutOfRange { .. }) => {
            (StatusCode::BAD_REQUEST, "tile_out_of_bounds")
        }
        TileError::Stream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "stream_error"),
        TileError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        TileError::Encode { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
    }
}

fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

/// Convert TileError to HTTP response.
///
/// 5xx errors are logged at ERROR, 404s at DEBUG and other 4xx at WARN.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = classify(&self);
        error_response(status, error_type, self.to_string())
    }
}

/// Errors a handler can return.
#[derive(Debug)]
pub enum HandlerError {
    Tile(TileError),
    /// Malformed path or query
    BadRequest(String),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Tile(err) => err.into_response(),
            HandlerError::BadRequest(message) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_request", message)
            }
        }
    }
}

impl From<TileError> for HandlerError {
    fn from(err: TileError) -> Self {
        HandlerError::Tile(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /pyramids?limit=&cursor=`
///
/// `limit` is clamped to 1..=1000.
pub async fn list_handler<S: ContentSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListQueryParams>,
) -> Result<Json<PyramidListResponse>, HandlerError> {
    let limit = query.limit.clamp(1, 1000);
    let page = state
        .tile_service
        .list(limit, query.cursor.as_deref())
        .await?;

    Ok(Json(PyramidListResponse {
        pyramids: page.ids,
        next_cursor: page.next_cursor,
    }))
}

/// `GET /pyramids/{id}`
///
/// ```json
/// {
///   "id": "wall.tif",
///   "width": 46920,
///   "height": 33600,
///   "level_count": 4,
///   "bigtiff": true,
///   "pixel_format": "rgb888",
///   "levels": [{ "level": 0, "width": 46920, "tile_width": 256, "downsample": 1.0, ... }]
/// }
/// ```
pub async fn metadata_handler<S: ContentSource>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<PyramidMetadata>, HandlerError> {
    Ok(Json(state.tile_service.metadata(&id).await?))
}

/// `GET /pyramids/{id}/select?width=&height=&policy=at_most|at_least`
pub async fn select_handler<S: ContentSource>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Query(query): Query<SelectQueryParams>,
) -> Result<Json<LevelSelection>, HandlerError> {
    let target = Size::new(query.width, query.height);
    Ok(Json(
        state
            .tile_service
            .select_level(&id, target, query.policy)
            .await?,
    ))
}

/// `GET /pyramids/{id}/region?level=&x=&y=&width=&height=&format=&quality=`
///
/// The region is clipped to the level; `X-Missing-Tiles` counts tiles that
/// could not be read and were left blank.
pub async fn region_handler<S: ContentSource>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Query(query): Query<RegionQueryParams>,
) -> Result<ImageResponse, HandlerError> {
    let encoding = state.encoding(&query.format, query.quality)?;
    let region = Rect::new(query.x, query.y, query.width, query.height);
    let response = state
        .tile_service
        .region(&id, query.level, region, encoding)
        .await?;

    Ok(state
        .image_response(response.data, encoding)
        .with_header(MISSING_TILES_HEADER, response.missing_tiles))
}

/// `GET /tiles/{id}/{level}/{x}/{y}.png`
///
/// # Query Parameters
///
/// - `quality`: JPEG quality 1-100 (`.jpg` only)
/// - `blank`: `true` to get a blank tile instead of an error when the tile
///   data is unreadable
///
/// # Headers
///
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
/// - `X-Tile-Blank: true` when a blank tile was substituted
pub async fn tile_handler<S: ContentSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
    Query(query): Query<TileQueryParams>,
) -> Result<ImageResponse, HandlerError> {
    let (row, extension) = params.row_and_extension()?;
    let encoding = state.encoding(extension, query.quality)?;
    let request = TileRequest::new(&params.id, params.level, params.x, row)
        .with_encoding(encoding)
        .with_blank_on_error(query.blank);

    let response = state.tile_service.get_tile(request).await?;

    let mut image = state
        .image_response(response.data, response.encoding)
        .with_header(CACHE_HIT_HEADER, response.cache_hit);
    if response.blank {
        image = image.with_header(BLANK_HEADER, true);
    }
    Ok(image)
}

/// `GET /thumbnails/{id}.png` (or `.jpg`)
pub async fn thumbnail_handler<S: ContentSource>(
    State(state): State<AppState<S>>,
    Path(filename): Path<String>,
    Query(query): Query<ThumbnailQueryParams>,
) -> Result<ImageResponse, HandlerError> {
    let (id, extension) = filename
        .rsplit_once('.')
        .ok_or_else(|| HandlerError::BadRequest(format!("missing image extension: {}", filename)))?;
    let encoding = state.encoding(extension, query.quality)?;
    let data = state.tile_service.thumbnail(id, encoding).await?;
    Ok(state.image_response(data, encoding))
}

// =============================================================================
// Tests
// =============================================================================
