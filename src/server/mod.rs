//! Read-only HTTP API over the pyramid tile service.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │         GET /tiles/{id}/{level}/{x}/{y}.png                     │
//! │                                                                 │
//! │  ┌─────────────────────────┐  ┌─────────────────────────────┐   │
//! │  │        handlers         │  │           routes            │   │
//! │  │ (requests, error JSON)  │  │ (router, CORS, tracing)     │   │
//! │  └─────────────────────────┘  └─────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, list_handler, metadata_handler, region_handler, select_handler,
    thumbnail_handler, tile_handler, AppState, ErrorResponse, HandlerError, HealthResponse,
    ImageResponse, PyramidListResponse, TilePathParams, TileQueryParams, DEFAULT_CACHE_MAX_AGE,
};
pub use routes::{create_router, RouterConfig};
