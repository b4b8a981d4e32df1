use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::{selector::OutputKind, source::SourceError};

const INVALID_URL_MESSAGE: &str = "Invalid or missing YouTube URL provided.";
const UPSTREAM_RATE_LIMITED_MESSAGE: &str =
    "YouTube is rate-limiting requests. Please try again later.";
const TOO_MANY_REQUESTS_MESSAGE: &str =
    "Too many download requests from this IP, please try again later.";

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub retry_after_seconds: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after_seconds: None,
        }
    }

    pub fn invalid_url() -> Self {
        Self::new(StatusCode::BAD_REQUEST, INVALID_URL_MESSAGE)
    }

    pub fn no_rendition(kind: OutputKind) -> Self {
        let message = match kind {
            OutputKind::Audio => "No audio-only format found.",
            OutputKind::Video => "No downloadable MP4 format found.",
        };
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn upstream_rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, UPSTREAM_RATE_LIMITED_MESSAGE)
    }

    pub fn too_many_requests(retry_after_seconds: u64) -> Self {
        Self {
            retry_after_seconds: Some(retry_after_seconds),
            ..Self::new(StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS_MESSAGE)
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<SourceError> for ApiError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::RateLimited => {
                warn!("YouTube rate-limited the request");
                Self::upstream_rate_limited()
            }
            other => {
                error!("Error in download route: {other}");
                Self::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self
            .retry_after_seconds
            .map(|seconds| [(RETRY_AFTER, HeaderValue::from(seconds))]);
        let envelope = ErrorBody {
            success: false,
            error: self.message,
        };

        (self.status, retry_after, Json(envelope)).into_response()
    }
}
