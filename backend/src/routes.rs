use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    middleware,
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    error::ApiError,
    framing,
    rate_limit::{self, RateLimiter},
    selector::{self, OutputKind, Selection, SelectionTier},
    source::MediaSource,
    transport::Transport,
    youtube_url,
};

const LIVENESS_MESSAGE: &str = "YouTube Downloader Backend is running!";

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn MediaSource>,
    pub transport: Transport,
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub trust_proxy_hops: usize,
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    url: Option<String>,
    #[serde(rename = "formatType")]
    format_type: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let download_route = post(download).route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit::enforce,
    ));

    Router::new()
        .route("/", get(liveness))
        .route("/api/download", download_route)
        .with_state(state)
}

async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

async fn download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        debug!("Rejected download body: {rejection}");
        ApiError::invalid_url()
    })?;

    let url = payload
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| youtube_url::is_valid_youtube_url(url))
        .ok_or_else(ApiError::invalid_url)?;
    let kind = OutputKind::from_format_type(payload.format_type.as_deref());

    let info = state.source.fetch_info(url, &state.transport).await?;
    let title = framing::sanitize_title(&info.title);

    let rendition = match selector::select(kind, &info.renditions) {
        Selection::Chosen { rendition, tier } => {
            if tier == SelectionTier::VideoOnly {
                warn!(
                    "No muxed mp4 for {url}; serving format {} which may lack audio",
                    rendition.format_id
                );
            }
            rendition
        }
        Selection::NoneFound => return Err(ApiError::no_rendition(kind)),
    };

    let stream = state
        .source
        .open_stream(url, rendition, &state.transport)
        .await?;
    info!(
        "Sending {:?} download {title:?} (format {})",
        kind, rendition.format_id
    );

    framing::attachment(kind, &title, Body::from_stream(stream))
}
