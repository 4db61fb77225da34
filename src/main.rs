use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use clap::Parser;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use imghub::{
    build_app,
    config::Config,
    metadata,
    storage::factory::{create_channel_registry, storage_config_from_env},
    swagger::swagger_router,
    AppState,
};

#[derive(Parser)]
#[command(name = "imghub")]
#[command(about = "Image hosting management API")]
struct Args {
    /// Listen address, overrides SERVER_ADDRESS
    #[arg(short, long)]
    address: Option<String>,

    /// Metadata store URL (`memory` or a sqlite URL), overrides METADATA_STORE_URL
    #[arg(long)]
    store_url: Option<String>,
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let mut parsed = Vec::new();
    for origin in allowed_origins {
        match HeaderValue::from_str(origin) {
            Ok(value) => parsed.push(value),
            Err(e) => warn!("Ignoring invalid CORS origin '{}': {}", origin, e),
        }
    }
    layer.allow_origin(parsed)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(address) = args.address {
        config.server_address = address;
    }
    if let Some(url) = args.store_url {
        config.metadata_store_url = url;
    }

    let store = metadata::connect(&config.metadata_store_url)
        .await
        .with_context(|| format!("Failed to open metadata store {}", config.metadata_store_url))?;
    info!("Metadata store: {}", store.backend_name());

    let channels = create_channel_registry(storage_config_from_env(&config)).await?;
    let cors = build_cors_layer(&config.cors_allowed_origins);
    let address = config.server_address.clone();

    let state = Arc::new(AppState::new(config, store, channels));
    let app = build_app(state).merge(swagger_router()).layer(cors);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("imghub listening on {}", address);
    info!("Swagger UI available at http://{}/swagger-ui", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
