//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                               - Health check
//! /pyramids                             - List pyramids
//! /pyramids/{id}                        - Pyramid metadata
//! /pyramids/{id}/select                 - Level selection
//! /pyramids/{id}/region                 - Composed region
//! /tiles/{id}/{level}/{x}/{y}.png       - Tile endpoint (.jpg for JPEG)
//! /thumbnails/{id}.png                  - Thumbnail
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tilewall::pyramid::{LocalContentSource, PyramidRegistry};
//! use tilewall::server::{create_router, RouterConfig};
//! use tilewall::tile::TileService;
//!
//! let registry = PyramidRegistry::new(LocalContentSource::new("/data/walls"));
//! let router = create_router(TileService::new(registry), RouterConfig::new());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_handler, list_handler, metadata_handler, region_handler, select_handler,
    thumbnail_handler, tile_handler, AppState, DEFAULT_CACHE_MAX_AGE,
};
use crate::pyramid::ContentSource;
use crate::tile::{TileService, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// JPEG quality when a request does not name one
    pub default_quality: u8,

    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Any CORS origin, one hour max-age, default quality, tracing on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            default_quality: DEFAULT_JPEG_QUALITY,
            enable_tracing: true,
        }
    }

    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_default_quality(mut self, quality: u8) -> Self {
        self.default_quality = quality;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Build the application router with CORS and, optionally, request tracing.
pub fn create_router<S>(tile_service: TileService<S>, config: RouterConfig) -> Router
where
    S: ContentSource + 'static,
{
    let app_state = AppState::new(tile_service)
        .with_cache_max_age(config.cache_max_age)
        .with_default_quality(config.default_quality);
    let cors = build_cors_layer(&config);

    // {filename} captures both "{y}" and "{y}.{ext}"
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/pyramids", get(list_handler::<S>))
        .route("/pyramids/{id}", get(metadata_handler::<S>))
        .route("/pyramids/{id}/select", get(select_handler::<S>))
        .route("/pyramids/{id}/region", get(region_handler::<S>))
        .route(
            "/tiles/{id}/{level}/{x}/{filename}",
            get(tile_handler::<S>),
        )
        .route("/thumbnails/{filename}", get(thumbnail_handler::<S>))
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
