use std::{collections::VecDeque, io::ErrorKind, path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use axum::body::Bytes;
use futures::{StreamExt, future, stream};
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStderr, Command},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::{MediaInfo, MediaSource, MediaStream, SourceError};
use crate::{
    selector::{Quality, Rendition},
    transport::Transport,
};

const STDERR_TAIL_LINES: usize = 20;
const UNTITLED: &str = "video";

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    fps: Option<f32>,
    tbr: Option<f32>,
    vbr: Option<f32>,
    abr: Option<f32>,
}

/// [`MediaSource`] backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    binary: PathBuf,
    timeout: Duration,
}

impl YtDlpSource {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn command(&self, transport: &Transport) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(["--no-playlist", "--no-warnings"])
            .args(transport.ytdlp_args())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, mut command: Command) -> Result<std::process::Output, SourceError> {
        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| SourceError::TimedOut(self.timeout.as_secs()))?
            .map_err(spawn_error)?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn fetch_info(&self, url: &str, transport: &Transport) -> Result<MediaInfo, SourceError> {
        let mut command = self.command(transport);
        command.arg("-J").args(["--", url]);

        let output = self.run(command).await?;
        let info: YtDlpVideoInfo = serde_json::from_slice(&output.stdout)?;
        let media = info.into_media_info();
        debug!(
            "yt-dlp resolved {:?} with {} rendition(s)",
            media.title,
            media.renditions.len()
        );
        Ok(media)
    }

    async fn open_stream(
        &self,
        url: &str,
        rendition: &Rendition,
        transport: &Transport,
    ) -> Result<MediaStream, SourceError> {
        let mut command = self.command(transport);
        command
            .args(["--quiet", "-f", rendition.format_id.as_str(), "-o", "-"])
            .args(["--", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Failed("yt-dlp stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SourceError::Failed("yt-dlp stderr was not captured".to_string()))?;
        let stderr_tail = tokio::spawn(drain_stderr(stderr));

        let mut chunks = ReaderStream::new(stdout);
        let first = match timeout(self.timeout, chunks.next()).await {
            Err(_) => return Err(SourceError::TimedOut(self.timeout.as_secs())),
            Ok(Some(Ok(first))) => first,
            Ok(Some(Err(error))) => return Err(error.into()),
            Ok(None) => {
                let status = child.wait().await?;
                let tail = stderr_tail.await.unwrap_or_default();
                return Err(if status.success() {
                    SourceError::Failed("yt-dlp finished without sending any data".to_string())
                } else {
                    classify_failure(&tail)
                });
            }
        };

        info!(
            "Streaming format {} ({})",
            rendition.format_id, rendition.container
        );

        let exit = stream::once(finish_download(child, stderr_tail)).filter_map(future::ready);
        Ok(Box::pin(stream::once(future::ready(Ok(first))).chain(chunks).chain(exit)))
    }
}

/// Runs after stdout is drained. A non-zero exit becomes a trailing stream
/// error. Owns the child, so dropping the stream early kills the process.
async fn finish_download(
    mut child: Child,
    stderr_tail: JoinHandle<String>,
) -> Option<std::io::Result<Bytes>> {
    let status = match child.wait().await {
        Ok(status) => status,
        Err(error) => return Some(Err(error)),
    };
    let tail = stderr_tail.await.unwrap_or_default();
    if status.success() {
        debug!("yt-dlp finished streaming");
        return None;
    }

    let failure = classify_failure(&tail);
    warn!("yt-dlp failed mid-stream ({status}): {failure}");
    Some(Err(std::io::Error::other(failure)))
}

async fn drain_stderr(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        debug!("yt-dlp: {line}");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}

fn spawn_error(error: std::io::Error) -> SourceError {
    if error.kind() == ErrorKind::NotFound {
        SourceError::MissingBinary
    } else {
        SourceError::Io(error)
    }
}

fn classify_failure(stderr: &str) -> SourceError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("http error 429") || lower.contains("too many requests") {
        return SourceError::RateLimited;
    }

    let message = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(|line| line.strip_prefix("ERROR:").unwrap_or(line).trim())
        .filter(|line| !line.is_empty())
        .unwrap_or("yt-dlp could not complete the request");

    SourceError::Failed(message.to_string())
}

impl YtDlpVideoInfo {
    fn into_media_info(self) -> MediaInfo {
        MediaInfo {
            title: self
                .title
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            renditions: self
                .formats
                .iter()
                .filter_map(YtDlpFormat::to_rendition)
                .collect(),
        }
    }
}

impl YtDlpFormat {
    fn has_video(&self) -> bool {
        matches!(self.vcodec.as_deref(), Some(value) if value != "none")
    }

    fn has_audio(&self) -> bool {
        matches!(self.acodec.as_deref(), Some(value) if value != "none")
    }

    fn to_rendition(&self) -> Option<Rendition> {
        let has_video = self.has_video();
        let has_audio = self.has_audio();
        if !has_video && !has_audio {
            return None;
        }

        Some(Rendition {
            format_id: self.format_id.clone(),
            container: container_for_ext(self.ext.as_deref()),
            has_video,
            has_audio,
            quality: Quality::new(self.video_rank(has_video), self.audio_rank(has_video, has_audio)),
        })
    }

    /// Height, then frame rate, then video bitrate.
    fn video_rank(&self, has_video: bool) -> u64 {
        if !has_video {
            return 0;
        }

        let height = u64::from(self.height.unwrap_or_default());
        let fps = positive(self.fps).map(|fps| fps.round() as u64).unwrap_or(0);
        let bitrate = positive(self.vbr.or(self.tbr))
            .map(|kbps| (kbps.round() as u64).min(9_999))
            .unwrap_or(0);

        height * 1_000_000 + fps.min(99) * 10_000 + bitrate
    }

    fn audio_rank(&self, has_video: bool, has_audio: bool) -> u64 {
        if !has_audio {
            return 0;
        }

        let bitrate = if has_video {
            self.abr
        } else {
            self.abr.or(self.tbr)
        };
        positive(bitrate)
            .map(|kbps| (kbps * 10.0).round() as u64)
            .unwrap_or(0)
    }
}

fn positive(value: Option<f32>) -> Option<f32> {
    value.filter(|value| value.is_finite() && *value > 0.0)
}

/// MPEG-4 audio (`m4a`) shares the mp4 container.
fn container_for_ext(ext: Option<&str>) -> String {
    match ext.map(str::to_ascii_lowercase).as_deref() {
        Some("m4a") | Some("mp4") => "mp4".to_string(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}
