mod config;
mod error;
mod framing;
mod layers;
mod rate_limit;
mod routes;
mod selector;
mod source;
mod transport;
mod youtube_url;

use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use tokio::{net::TcpListener, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    config::{RateLimiting, ServerConfig},
    error::ApiError,
    rate_limit::RateLimiter,
    routes::AppState,
    source::YtDlpSource,
};

const RATE_LIMIT_PRUNE_SECONDS: u64 = 60;
const DEFAULT_LOG_FILTER: &str = "yt_download_server=info,tower_http=info";

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!("{} ({})", failure.message, failure.status);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ApiError> {
    let config = ServerConfig::from_env()
        .map_err(|error| ApiError::internal(format!("Invalid configuration: {error}")))?;

    let rate_limiter = match config.rate_limiting {
        RateLimiting::Enabled {
            max_requests,
            window,
        } => {
            info!(
                "Download rate limit: {max_requests} request(s) per {}s per IP",
                window.as_secs()
            );
            let limiter = Arc::new(RateLimiter::new(max_requests, window));
            rate_limit::spawn_pruner(
                Arc::clone(&limiter),
                Duration::from_secs(RATE_LIMIT_PRUNE_SECONDS),
            );
            Some(limiter)
        }
        RateLimiting::Disabled => {
            warn!("RATE_LIMITING is off: downloads are not limited per IP.");
            None
        }
    };

    match &config.transport.proxy {
        Some(proxy) => info!("Routing YouTube traffic through proxy {proxy}"),
        None => info!("Using the default network route for YouTube traffic"),
    }
    if config.transport.cookies_file.is_some() {
        info!("Sending cookies from COOKIES_FILE with every YouTube request");
    }

    let state = AppState {
        source: Arc::new(YtDlpSource::new(
            config.yt_dlp_bin.clone(),
            config.yt_dlp_timeout,
        )),
        transport: config.transport.clone(),
        rate_limiter,
        trust_proxy_hops: config.trust_proxy_hops,
    };

    let app = layers::apply(routes::router(state), &config.allowed_origins)
        .map_err(|error| ApiError::internal(format!("Invalid configuration: {error}")))?;

    let listener = TcpListener::bind(&config.bind_addr).await.map_err(|error| {
        ApiError::internal(format!("Could not bind {}: {error}", config.bind_addr))
    })?;

    info!("Server is running on http://{}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
