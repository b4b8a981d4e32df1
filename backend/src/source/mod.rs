//! Metadata and byte-stream collaborators.
//!
//! The handler only talks to [`MediaSource`]; resolving a watch page into
//! renditions and pulling their bytes is left entirely to the implementation.

mod ytdlp;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::{selector::Rendition, transport::Transport};

pub use ytdlp::YtDlpSource;

/// Lazy, finite, non-restartable byte stream for one rendition.
pub type MediaStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub title: String,
    pub renditions: Vec<Rendition>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("YouTube is rate-limiting requests")]
    RateLimited,
    #[error("yt-dlp is not installed. Install yt-dlp and restart the backend.")]
    MissingBinary,
    #[error("yt-dlp did not answer within {0} seconds")]
    TimedOut(u64),
    #[error("Could not read video metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
    #[error("Could not run yt-dlp: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch_info(&self, url: &str, transport: &Transport) -> Result<MediaInfo, SourceError>;

    async fn open_stream(
        &self,
        url: &str,
        rendition: &Rendition,
        transport: &Transport,
    ) -> Result<MediaStream, SourceError>;
}
