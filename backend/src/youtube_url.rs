use url::Url;

const VIDEO_ID_LEN: usize = 11;

const QUERY_DOMAINS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "gaming.youtube.com",
];

const PATH_DOMAINS: [&str; 4] = [
    "youtube.com",
    "www.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];
const PATH_PREFIXES: [&str; 4] = ["embed", "v", "shorts", "live"];

pub fn is_valid_youtube_url(input: &str) -> bool {
    video_id(input).is_some()
}

/// Extracts the video id from a watch, short link, embed, shorts or live URL.
pub fn video_id(input: &str) -> Option<String> {
    let parsed = Url::parse(input.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = parsed.host_str()?.to_ascii_lowercase();

    let candidate = if host == "youtu.be" {
        parsed.path_segments()?.next().map(ToString::to_string)
    } else if let Some(id) = query_video_id(&parsed, &host) {
        Some(id)
    } else if PATH_DOMAINS.contains(&host.as_str()) {
        let mut segments = parsed.path_segments()?;
        let prefix = segments.next()?;
        if PATH_PREFIXES.contains(&prefix) {
            segments.next().map(ToString::to_string)
        } else {
            None
        }
    } else {
        None
    };

    // Anything past the first 11 characters is ignored.
    candidate
        .map(|id| id.chars().take(VIDEO_ID_LEN).collect::<String>())
        .filter(|id| is_valid_video_id(id))
}

fn query_video_id(parsed: &Url, host: &str) -> Option<String> {
    if !QUERY_DOMAINS.contains(&host) {
        return None;
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
}

fn is_valid_video_id(id: &str) -> bool {
    id.len() == VIDEO_ID_LEN
        && id
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_'))
}
