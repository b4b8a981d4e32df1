use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};

use crate::{error::ApiError, selector::OutputKind};

const FORBIDDEN_FILENAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
const FALLBACK_STEM: &str = "download";

/// Keeps printable ASCII and drops characters that are not allowed in file
/// names. An empty result falls back to `download`.
pub fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .filter(|character| matches!(character, ' '..='~'))
        .filter(|character| !FORBIDDEN_FILENAME_CHARS.contains(character))
        .collect();

    if sanitized.trim().is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        sanitized
    }
}

pub fn content_type(kind: OutputKind) -> &'static str {
    match kind {
        OutputKind::Audio => "audio/mpeg",
        OutputKind::Video => "video/mp4",
    }
}

pub fn extension(kind: OutputKind) -> &'static str {
    match kind {
        OutputKind::Audio => "mp3",
        OutputKind::Video => "mp4",
    }
}

pub fn content_disposition(kind: OutputKind, sanitized_title: &str) -> String {
    format!(
        "attachment; filename=\"{sanitized_title}.{}\"",
        extension(kind)
    )
}

/// Download response for a chosen rendition.
pub fn attachment(kind: OutputKind, sanitized_title: &str, body: Body) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(kind)));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(kind, sanitized_title))
            .map_err(|_| ApiError::internal("Could not build the download header."))?,
    );

    Ok((headers, body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};

    #[test]
    fn strips_non_ascii_and_forbidden_characters() {
        assert_eq!(sanitize_title("Foo/Bar:Baz*?\"<>|😀"), "FooBarBaz");
        assert_eq!(sanitize_title("Café \\ Live"), "Caf  Live");
        assert_eq!(sanitize_title("tab\tand\nnewline"), "tabandnewline");
    }

    #[test]
    fn empty_title_falls_back() {
        assert_eq!(sanitize_title(""), "download");
        assert_eq!(sanitize_title("日本語"), "download");
        assert_eq!(sanitize_title("???"), "download");
    }

    #[test]
    fn disposition_uses_kind_extension() {
        assert_eq!(
            content_disposition(OutputKind::Audio, "Song"),
            "attachment; filename=\"Song.mp3\""
        );
        assert_eq!(
            content_disposition(OutputKind::Video, "Clip"),
            "attachment; filename=\"Clip.mp4\""
        );
    }

    #[tokio::test]
    async fn attachment_sets_headers_and_body() {
        let response = attachment(OutputKind::Video, "Clip", Body::from("bytes")).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"Clip.mp4\""
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"bytes");
    }
}
