use std::cmp::Ordering;

const MP4_CONTAINER: &str = "mp4";

/// What the client asked to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Video,
    Audio,
}

impl OutputKind {
    /// `"mp3"` selects audio; anything else, including an absent value, is video.
    pub fn from_format_type(format_type: Option<&str>) -> Self {
        match format_type.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("mp3") => Self::Audio,
            _ => Self::Video,
        }
    }
}

/// Quality ranks supplied by the metadata source. Higher is better; the
/// selector only compares them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quality {
    pub video: u64,
    pub audio: u64,
}

impl Quality {
    pub fn new(video: u64, audio: u64) -> Self {
        Self { video, audio }
    }

    fn cmp_highest(&self, other: &Self) -> Ordering {
        self.video
            .cmp(&other.video)
            .then_with(|| self.audio.cmp(&other.audio))
    }

    fn cmp_highest_audio(&self, other: &Self) -> Ordering {
        self.audio
            .cmp(&other.audio)
            .then_with(|| self.video.cmp(&other.video))
    }

    fn cmp_highest_video(&self, other: &Self) -> Ordering {
        self.video.cmp(&other.video)
    }
}

/// One encoded stream the source can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub format_id: String,
    pub container: String,
    pub has_video: bool,
    pub has_audio: bool,
    pub quality: Quality,
}

impl Rendition {
    pub fn audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }

    fn is_mp4(&self) -> bool {
        self.container.eq_ignore_ascii_case(MP4_CONTAINER)
    }

    fn is_combined_mp4(&self) -> bool {
        self.has_video && self.has_audio && self.is_mp4()
    }

    fn is_video_mp4(&self) -> bool {
        self.has_video && self.is_mp4()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    AudioOnly,
    Combined,
    /// Last-resort mp4 without a guaranteed audio track.
    VideoOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    Chosen {
        rendition: &'a Rendition,
        tier: SelectionTier,
    },
    NoneFound,
}

/// Picks the rendition to serve for `kind`. Pure: the same input always
/// yields the same choice, and ties go to the earliest candidate.
pub fn select(kind: OutputKind, renditions: &[Rendition]) -> Selection<'_> {
    match kind {
        OutputKind::Audio => best(
            renditions.iter().filter(|item| item.audio_only()),
            Quality::cmp_highest_audio,
        )
        .map(|rendition| Selection::Chosen {
            rendition,
            tier: SelectionTier::AudioOnly,
        })
        .unwrap_or(Selection::NoneFound),
        OutputKind::Video => {
            if let Some(rendition) = best(
                renditions.iter().filter(|item| item.is_combined_mp4()),
                Quality::cmp_highest,
            ) {
                return Selection::Chosen {
                    rendition,
                    tier: SelectionTier::Combined,
                };
            }

            best(
                renditions.iter().filter(|item| item.is_video_mp4()),
                Quality::cmp_highest_video,
            )
            .map(|rendition| Selection::Chosen {
                rendition,
                tier: SelectionTier::VideoOnly,
            })
            .unwrap_or(Selection::NoneFound)
        }
    }
}

fn best<'a>(
    candidates: impl Iterator<Item = &'a Rendition>,
    compare: fn(&Quality, &Quality) -> Ordering,
) -> Option<&'a Rendition> {
    candidates.reduce(|current, candidate| {
        if compare(&candidate.quality, &current.quality) == Ordering::Greater {
            candidate
        } else {
            current
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendition(
        id: &str,
        container: &str,
        has_video: bool,
        has_audio: bool,
        video: u64,
        audio: u64,
    ) -> Rendition {
        Rendition {
            format_id: id.to_string(),
            container: container.to_string(),
            has_video,
            has_audio,
            quality: Quality::new(video, audio),
        }
    }

    fn audio_only(id: &str, rank: u64) -> Rendition {
        rendition(id, "webm", false, true, 0, rank)
    }

    fn combined(id: &str, rank: u64) -> Rendition {
        rendition(id, "mp4", true, true, rank, 1)
    }

    fn video_only(id: &str, rank: u64) -> Rendition {
        rendition(id, "mp4", true, false, rank, 0)
    }

    fn chosen_id(selection: Selection<'_>) -> Option<&str> {
        match selection {
            Selection::Chosen { rendition, .. } => Some(rendition.format_id.as_str()),
            Selection::NoneFound => None,
        }
    }

    #[test]
    fn format_type_mapping_defaults_to_video() {
        assert_eq!(OutputKind::from_format_type(Some("mp3")), OutputKind::Audio);
        assert_eq!(OutputKind::from_format_type(Some(" MP3 ")), OutputKind::Audio);
        assert_eq!(OutputKind::from_format_type(Some("mp4")), OutputKind::Video);
        assert_eq!(OutputKind::from_format_type(Some("flac")), OutputKind::Video);
        assert_eq!(OutputKind::from_format_type(None), OutputKind::Video);
    }

    #[test]
    fn audio_picks_highest_audio_only_candidate() {
        let list = vec![
            audio_only("low", 48),
            combined("muxed", 900),
            audio_only("high", 160),
            audio_only("mid", 128),
        ];

        let selection = select(OutputKind::Audio, &list);
        assert_eq!(chosen_id(selection), Some("high"));
        assert!(matches!(
            selection,
            Selection::Chosen {
                tier: SelectionTier::AudioOnly,
                ..
            }
        ));
    }

    #[test]
    fn audio_without_audio_only_candidates_is_none_found() {
        let list = vec![combined("muxed", 10), video_only("silent", 20)];
        assert_eq!(select(OutputKind::Audio, &list), Selection::NoneFound);
    }

    #[test]
    fn audio_ties_resolve_to_first_candidate() {
        let list = vec![audio_only("first", 128), audio_only("second", 128)];
        assert_eq!(chosen_id(select(OutputKind::Audio, &list)), Some("first"));
        assert_eq!(chosen_id(select(OutputKind::Audio, &list)), Some("first"));
    }

    #[test]
    fn video_prefers_combined_over_higher_video_only() {
        let list = vec![video_only("2160p", 2160), combined("360p", 360)];

        let selection = select(OutputKind::Video, &list);
        assert_eq!(chosen_id(selection), Some("360p"));
        assert!(matches!(
            selection,
            Selection::Chosen {
                tier: SelectionTier::Combined,
                ..
            }
        ));
    }

    #[test]
    fn video_combined_tier_requires_mp4() {
        let list = vec![
            rendition("webm-muxed", "webm", true, true, 1080, 160),
            combined("mp4-muxed", 360),
        ];
        assert_eq!(chosen_id(select(OutputKind::Video, &list)), Some("mp4-muxed"));
    }

    #[test]
    fn video_combined_tier_breaks_video_ties_on_audio() {
        let list = vec![
            rendition("quiet", "mp4", true, true, 720, 64),
            rendition("loud", "mp4", true, true, 720, 128),
        ];
        assert_eq!(chosen_id(select(OutputKind::Video, &list)), Some("loud"));
    }

    #[test]
    fn video_falls_back_to_best_mp4_video() {
        let list = vec![
            video_only("480p", 480),
            rendition("webm-1080p", "webm", true, false, 1080, 0),
            video_only("1080p", 1080),
            audio_only("audio", 160),
        ];

        let selection = select(OutputKind::Video, &list);
        assert_eq!(chosen_id(selection), Some("1080p"));
        assert!(matches!(
            selection,
            Selection::Chosen {
                tier: SelectionTier::VideoOnly,
                ..
            }
        ));
    }

    #[test]
    fn video_fallback_never_serves_audio_only_mp4() {
        let list = vec![
            rendition("140", "mp4", false, true, 0, 1290),
            rendition("webm-1080p", "webm", true, false, 1080, 0),
        ];
        assert_eq!(select(OutputKind::Video, &list), Selection::NoneFound);

        let with_video = vec![
            rendition("140", "mp4", false, true, 0, 1290),
            video_only("360p", 360),
        ];
        assert_eq!(chosen_id(select(OutputKind::Video, &with_video)), Some("360p"));
    }

    #[test]
    fn video_without_mp4_is_none_found() {
        let list = vec![
            rendition("webm", "webm", true, true, 1080, 160),
            audio_only("opus", 160),
        ];
        assert_eq!(select(OutputKind::Video, &list), Selection::NoneFound);
        assert_eq!(select(OutputKind::Video, &[]), Selection::NoneFound);
    }

    #[test]
    fn selection_does_not_depend_on_input_order() {
        let forward = vec![combined("a", 360), combined("b", 720), combined("c", 480)];
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(chosen_id(select(OutputKind::Video, &forward)), Some("b"));
        assert_eq!(chosen_id(select(OutputKind::Video, &reversed)), Some("b"));
    }

    #[test]
    fn selection_is_idempotent_and_leaves_input_untouched() {
        let list = vec![video_only("v", 1080), combined("c", 720), audio_only("a", 128)];
        let snapshot = list.clone();

        for kind in [OutputKind::Video, OutputKind::Audio] {
            assert_eq!(select(kind, &list), select(kind, &list));
        }
        assert_eq!(list, snapshot);
    }
}
