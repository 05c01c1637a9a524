//! tilewall - tile engine for very large images on display walls.
//!
//! This binary starts the HTTP server or runs one of the file tools.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilewall::{
    config::{Cli, Command, ExtractConfig, ExtractTarget, InspectConfig, ServeConfig},
    geometry::TileCoord,
    pixel::PixelBuffer,
    pyramid::{LocalContentSource, PyramidRegistry, PyramidStore},
    server::{create_router, RouterConfig},
    tile::{ImageEncoding, TileEncoder, TileService},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Inspect(config) => run_inspect(config).await,
        Command::Extract(config) => run_extract(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("tilewall v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Root: {}", config.root.display());
    info!(
        "  Cache: {} pyramids, {}MB tiles",
        config.cache_pyramids,
        config.cache_tiles / (1024 * 1024)
    );

    let source = LocalContentSource::new(&config.root);
    match source_count(&source).await {
        Ok(0) => warn!("  No pyramid files found under {}", config.root.display()),
        Ok(count) => info!("  Found {} pyramid file(s)", count),
        Err(e) => {
            error!("  Cannot list {}: {}", config.root.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let registry = PyramidRegistry::with_capacity(source, config.cache_pyramids);
    let tile_service = TileService::with_cache_capacity(registry, config.cache_tiles);
    let router = create_router(tile_service, build_router_config(&config));

    let addr = config.bind_address();
    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/pyramids", addr);
    info!("  curl http://{}/tiles/<id>/0/0/0.png", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Number of pyramid files in the root, counted page by page.
async fn source_count(source: &LocalContentSource) -> Result<usize, tilewall::IoError> {
    use tilewall::pyramid::ContentSource;

    let mut count = 0;
    let mut cursor: Option<String> = None;
    loop {
        let page = source.list(1000, cursor.as_deref()).await?;
        count += page.ids.len();
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(count),
        }
    }
}

fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_default_quality(config.jpeg_quality)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }
    router_config
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilewall=debug,tower_http=debug"
    } else {
        "tilewall=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let store = match PyramidStore::open(&config.file).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}: {}", config.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        match serde_json::to_string_pretty(&store.levels()) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("{}", config.file.display());
    println!(
        "  {} ({} levels)",
        if store.is_bigtiff() { "BigTIFF" } else { "TIFF" },
        store.level_count()
    );
    if let Some(description) = store.description() {
        println!("  {}", description.lines().next().unwrap_or_default());
    }
    println!();
    println!(
        "  {:>5}  {:>13}  {:>9}  {:>9}  {:>10}  {:>8}",
        "level", "size", "tile", "grid", "format", "downsmpl"
    );
    for geometry in store.levels() {
        let format = store
            .pixel_format(geometry.level)
            .map(|f| f.name())
            .unwrap_or("unsupported");
        println!(
            "  {:>5}  {:>13}  {:>9}  {:>9}  {:>10}  {:>8.2}",
            geometry.level,
            geometry.image_size().to_string(),
            geometry.tile_size().to_string(),
            format!("{}x{}", geometry.tiles_x, geometry.tiles_y),
            format,
            geometry.downsample
        );
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Extract Command
// =============================================================================

async fn run_extract(config: ExtractConfig) -> ExitCode {
    init_logging(config.verbose);

    let target = match config.target() {
        Ok(target) => target,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match PyramidStore::open(&config.file).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open {}: {}", config.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let pixels = match read_target(&store, target).await {
        Ok(pixels) => pixels,
        Err(e) => {
            error!("Failed to read {:?}: {}", target, e);
            return ExitCode::FAILURE;
        }
    };

    let png = match TileEncoder::new().encode(&pixels, ImageEncoding::Png) {
        Ok(png) => png,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, &png).await {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote {} ({}, {} bytes)",
        config.output.display(),
        pixels.size(),
        png.len()
    );
    ExitCode::SUCCESS
}

async fn read_target(
    store: &PyramidStore,
    target: ExtractTarget,
) -> Result<PixelBuffer, tilewall::PyramidError> {
    match target {
        ExtractTarget::Thumbnail => store.read_thumbnail().await,
        ExtractTarget::Tile { level, col, row } => {
            let tile = store.read_tile(level, TileCoord::new(col, row)).await?;
            let rect = store.tile_rect(level, TileCoord::new(col, row))?;
            Ok(tile.crop(tilewall::geometry::Rect::new(0, 0, rect.width, rect.height)))
        }
        ExtractTarget::Level(level) => {
            let image = store.read_full_level(level).await?;
            if !image.is_complete() {
                warn!(
                    "{} tile(s) could not be read and were left blank",
                    image.missing_tiles.len()
                );
            }
            Ok(image.pixels)
        }
    }
}
