//! API integration tests for the HTTP layer.
//!
//! Tests verify:
//! - Tile, region and thumbnail retrieval with their headers
//! - Listing with pagination, metadata and level selection
//! - Error cases mapped to status codes and JSON bodies

use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use tilewall::pyramid::PyramidRegistry;
use tilewall::tile::TileService;
use tilewall::{create_router, RouterConfig};

use super::test_utils::{
    deflate, is_valid_jpeg, is_valid_png, rgb_pyramid, LevelSpec, MockContentSource, TiffBuilder,
};

fn broken_pyramid() -> Vec<u8> {
    let mut level = LevelSpec::uncompressed(64, 32, 32, 3, |c, _| c as u8 * 50)
        .compressed(8, deflate);
    level.tiles[1] = b"not zlib".to_vec();
    TiffBuilder::new().level(level).build()
}

fn source() -> MockContentSource {
    MockContentSource::new()
        .with_file("wall.tif", rgb_pyramid())
        .with_file("broken.tif", broken_pyramid())
        .with_file("junk.tif", b"this is not a tiff file".to_vec())
}

fn router_for(source: MockContentSource) -> Router {
    let tile_service = TileService::new(PyramidRegistry::new(source));
    create_router(tile_service, RouterConfig::new().with_tracing(false))
}

fn router() -> Router {
    router_for(source())
}

async fn get(router: &Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

async fn assert_error(router: &Router, uri: &str, status: StatusCode, error: &str) {
    let response = get(router, uri).await;
    assert_eq!(response.status(), status, "{}", uri);
    let json = body_json(response).await;
    assert_eq!(json["error"], error, "{}", uri);
    assert_eq!(json["status"], status.as_u16(), "{}", uri);
}

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_png_tile_and_cache_hit() {
    let router = router();

    let response = get(&router, "/tiles/wall.tif/0/3/2.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/png"));
    assert_eq!(header(&response, "cache-control"), Some("public, max-age=3600"));
    assert_eq!(header(&response, "x-tile-cache-hit"), Some("false"));

    let body = body_bytes(response).await;
    assert!(is_valid_png(&body));
    let image = image::load_from_memory(&body).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (4, 16));
    assert_eq!(image.get_pixel(0, 0).0, [23, 23, 23]);

    let response = get(&router, "/tiles/wall.tif/0/3/2.png").await;
    assert_eq!(header(&response, "x-tile-cache-hit"), Some("true"));
}

#[tokio::test]
async fn test_jpeg_tile_with_quality() {
    let router = router();

    let response = get(&router, "/tiles/wall.tif/1/0/0.jpg?quality=50").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/jpeg"));
    assert!(is_valid_jpeg(&body_bytes(response).await));

    // A bare row serves PNG.
    let response = get(&router, "/tiles/wall.tif/1/0/0").await;
    assert_eq!(header(&response, "content-type"), Some("image/png"));
}

#[tokio::test]
async fn test_tile_errors() {
    let router = router();

    assert_error(&router, "/tiles/nope.tif/0/0/0.png", StatusCode::NOT_FOUND, "not_found").await;
    assert_error(&router, "/tiles/wall.tif/9/0/0.png", StatusCode::BAD_REQUEST, "invalid_level")
        .await;
    assert_error(
        &router,
        "/tiles/wall.tif/0/4/0.png",
        StatusCode::BAD_REQUEST,
        "tile_out_of_bounds",
    )
    .await;
    assert_error(
        &router,
        "/tiles/wall.tif/0/0/0.jpg?quality=0",
        StatusCode::BAD_REQUEST,
        "invalid_quality",
    )
    .await;
    assert_error(&router, "/tiles/wall.tif/0/0/0.gif", StatusCode::BAD_REQUEST, "invalid_format")
        .await;
    assert_error(
        &router,
        "/tiles/junk.tif/0/0/0.png",
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "unsupported_format",
    )
    .await;
}

#[tokio::test]
async fn test_corrupt_tile_fails_alone_or_goes_blank() {
    let router = router();

    let response = get(&router, "/tiles/broken.tif/0/0/0.png").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_error(
        &router,
        "/tiles/broken.tif/0/1/0.png",
        StatusCode::INTERNAL_SERVER_ERROR,
        "decode_error",
    )
    .await;

    for _ in 0..2 {
        let response = get(&router, "/tiles/broken.tif/0/1/0.png?blank=true").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-tile-blank"), Some("true"));
        // Blank tiles are never cached.
        assert_eq!(header(&response, "x-tile-cache-hit"), Some("false"));
    }
}

// =============================================================================
// Regions and Thumbnails
// =============================================================================

#[tokio::test]
async fn test_region_is_clipped_to_level() {
    let router = router();

    let response = get(
        &router,
        "/pyramids/wall.tif/region?level=0&x=90&y=70&width=50&height=50",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-missing-tiles"), Some("0"));

    let image = image::load_from_memory(&body_bytes(response).await)
        .unwrap()
        .to_rgb8();
    assert_eq!(image.dimensions(), (10, 10));
    assert_eq!(image.get_pixel(9, 9).0, [23, 23, 23]);

    let response = get(
        &router,
        "/pyramids/broken.tif/region?x=0&y=0&width=64&height=32&format=jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-missing-tiles"), Some("1"));

    assert_error(
        &router,
        "/pyramids/wall.tif/region?x=200&y=0&width=10&height=10",
        StatusCode::BAD_REQUEST,
        "invalid_region",
    )
    .await;
}

#[tokio::test]
async fn test_thumbnail() {
    let router = router();

    let response = get(&router, "/thumbnails/wall.tif.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    let image = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert_eq!((image.width(), image.height()), (25, 20));

    let response = get(&router, "/thumbnails/wall.tif.jpg").await;
    assert_eq!(header(&response, "content-type"), Some("image/jpeg"));

    assert_error(&router, "/thumbnails/wall", StatusCode::BAD_REQUEST, "invalid_request").await;
}

// =============================================================================
// Listing and Metadata
// =============================================================================

#[tokio::test]
async fn test_health() {
    let response = get(&router(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_list_pagination() {
    let router = router();

    let json = body_json(get(&router, "/pyramids?limit=2").await).await;
    assert_eq!(json["pyramids"], serde_json::json!(["broken.tif", "junk.tif"]));
    assert_eq!(json["next_cursor"], "junk.tif");

    let json = body_json(get(&router, "/pyramids?limit=2&cursor=junk.tif").await).await;
    assert_eq!(json["pyramids"], serde_json::json!(["wall.tif"]));
    assert!(json.get("next_cursor").is_none());
}

#[tokio::test]
async fn test_metadata() {
    let source = source();
    let opens = source.open_counter();
    let router = router_for(source);

    let response = get(&router, "/pyramids/wall.tif").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["width"], 100);
    assert_eq!(json["height"], 80);
    assert_eq!(json["level_count"], 3);
    assert_eq!(json["pixel_format"], "rgb888");
    assert_eq!(json["levels"][2]["width"], 25);
    assert_eq!(json["levels"][2]["downsample"], 4.0);

    // The opened pyramid is reused by later requests.
    get(&router, "/tiles/wall.tif/0/0/0.png").await;
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    assert_error(&router, "/pyramids/nope.tif", StatusCode::NOT_FOUND, "not_found").await;
}

#[tokio::test]
async fn test_level_selection() {
    let router = router();

    let json = body_json(get(&router, "/pyramids/wall.tif/select?width=60&height=60").await).await;
    assert_eq!(json["level"], 1);
    assert_eq!(json["policy"], "at_most");

    let json = body_json(
        get(
            &router,
            "/pyramids/wall.tif/select?width=60&height=60&policy=at_least",
        )
        .await,
    )
    .await;
    assert_eq!(json["level"], 0);
    assert_eq!(json["geometry"]["width"], 100);

    assert_error(
        &router,
        "/pyramids/wall.tif/select?width=0&height=60",
        StatusCode::BAD_REQUEST,
        "invalid_region",
    )
    .await;
}
