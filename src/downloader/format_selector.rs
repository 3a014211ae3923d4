// FormatSelector - interactive format selection logic
//
// Turns a MediaDescriptor into a numbered menu and a menu pick into a backend
// format selector string. Terminal I/O lives with the caller (see cli.rs); this
// module is pure so it can be tested.
//
// Menu order:
// - Video + Audio (recommended)
// - Video-only (best audio is merged automatically)
// - Audio-only (needs explicit confirmation)
// - Other formats

use serde::{Deserialize, Serialize};

use super::models::{FormatVariant, MediaDescriptor};
use super::utils::fmt_size;

/// Used when nothing (or nothing valid) was picked
pub const DEFAULT_SELECTOR: &str = "bestvideo+bestaudio/best";

/// Formats smaller than this are previews, not media
const JUNK_SIZE_LIMIT: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatCategory {
    VideoAudio,
    VideoOnly,
    AudioOnly,
    Other,
}

impl FormatCategory {
    pub fn title(&self) -> &'static str {
        match self {
            Self::VideoAudio => "Video + Audio (recommended)",
            Self::VideoOnly => "Video-only (will auto-add audio)",
            Self::AudioOnly => "Audio-only (explicit - requires confirmation)",
            Self::Other => "Other formats",
        }
    }

    fn of(format: &FormatVariant) -> Self {
        match (format.has_video, format.has_audio) {
            (true, true) => Self::VideoAudio,
            (true, false) => Self::VideoOnly,
            (false, true) => Self::AudioOnly,
            (false, false) => Self::Other,
        }
    }
}

/// One numbered menu line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityOption {
    /// 1-based menu number
    pub number: usize,
    pub format_id: String,
    pub label: String,
    /// e.g. "12.34 MB" or "Unknown"
    pub size: String,
    pub fps: Option<f32>,
    pub category: FormatCategory,
}

/// What a menu answer means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuPick {
    /// Empty, invalid or unknown answer
    Default,
    /// Selector usable as-is
    Direct(String),
    /// Video-only format; an audio track still has to be merged in
    NeedsAudio { video_id: String },
    /// Audio-only format; only used after confirmation
    NeedsConfirmation { audio_id: String, label: String, size: String },
}

#[derive(Debug, Clone, Default)]
pub struct FormatMenu {
    pub options: Vec<QualityOption>,
    /// Audio-only tracks offered for merging with a video-only pick
    pub audio_tracks: Vec<QualityOption>,
}

impl FormatMenu {
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::from("\nAvailable formats:\n");
        for category in [
            FormatCategory::VideoAudio,
            FormatCategory::VideoOnly,
            FormatCategory::AudioOnly,
            FormatCategory::Other,
        ] {
            let items: Vec<&QualityOption> = self
                .options
                .iter()
                .filter(|o| o.category == category)
                .collect();
            if items.is_empty() {
                continue;
            }
            out.push_str(&format!("\n{}:\n", category.title()));
            for item in items {
                let has_audio = matches!(item.category, FormatCategory::VideoAudio | FormatCategory::AudioOnly);
                out.push_str(&format!(
                    " {:2}. {:<12} | Audio: {:<3} | {:<8} | {}fps\n",
                    item.number,
                    item.label,
                    if has_audio { "Yes" } else { "No" },
                    item.size,
                    item.fps.map_or_else(|| "?".to_string(), |f| format!("{}", f)),
                ));
            }
        }
        out.push_str("\nOptions:\n");
        out.push_str(" - Enter the number to choose that format.\n");
        out.push_str(" - Press Enter to select the default (BEST video+audio).\n");
        out
    }

    pub fn render_audio_tracks(&self) -> String {
        let mut out = String::new();
        for (i, track) in self.audio_tracks.iter().enumerate() {
            out.push_str(&format!(" {:2}. {:<12} | {}\n", i + 1, track.label, track.size));
        }
        out
    }

    /// Interpret the operator's answer to the main menu
    pub fn pick(&self, answer: &str) -> MenuPick {
        let Ok(n) = answer.trim().parse::<usize>() else {
            return MenuPick::Default;
        };
        let Some(option) = self.options.iter().find(|o| o.number == n) else {
            return MenuPick::Default;
        };
        match option.category {
            FormatCategory::VideoOnly => MenuPick::NeedsAudio {
                video_id: option.format_id.clone(),
            },
            FormatCategory::AudioOnly => MenuPick::NeedsConfirmation {
                audio_id: option.format_id.clone(),
                label: option.label.clone(),
                size: option.size.clone(),
            },
            _ => MenuPick::Direct(option.format_id.clone()),
        }
    }

    /// Selector merging `video_id` with the chosen audio track (1-based), or best audio
    pub fn merge_audio(&self, video_id: &str, answer: &str) -> String {
        let track = answer
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.audio_tracks.get(i));
        match track {
            Some(t) => format!("{}+{}", video_id, t.format_id),
            None => FormatSelector::with_best_audio(video_id),
        }
    }
}

/// Format selector with junk filtering and categorization
pub struct FormatSelector;

impl FormatSelector {
    /// Storyboards, thumbnails and tiny previews
    pub fn is_junk(format: &FormatVariant) -> bool {
        let id = format.format_id.to_lowercase();
        id.contains("storyboard")
            || id.contains("thumbnail")
            || format.approx_size.map_or(false, |s| s < JUNK_SIZE_LIMIT)
    }

    pub fn build_menu(descriptor: &MediaDescriptor) -> FormatMenu {
        let usable: Vec<&FormatVariant> = descriptor
            .formats
            .iter()
            .filter(|f| !Self::is_junk(f))
            .collect();

        let mut options = Vec::new();
        for category in [
            FormatCategory::VideoAudio,
            FormatCategory::VideoOnly,
            FormatCategory::AudioOnly,
            FormatCategory::Other,
        ] {
            for format in usable.iter().filter(|f| FormatCategory::of(f) == category) {
                options.push(Self::option(options.len() + 1, format));
            }
        }

        let audio_tracks = descriptor
            .formats
            .iter()
            .filter(|f| FormatCategory::of(f) == FormatCategory::AudioOnly)
            .enumerate()
            .map(|(i, f)| Self::option(i + 1, f))
            .collect();

        FormatMenu {
            options,
            audio_tracks,
        }
    }

    fn option(number: usize, format: &FormatVariant) -> QualityOption {
        QualityOption {
            number,
            format_id: format.format_id.clone(),
            label: if format.label.is_empty() {
                format.format_id.clone()
            } else {
                format.label.clone()
            },
            size: fmt_size(format.approx_size),
            fps: format.fps,
            category: FormatCategory::of(format),
        }
    }

    pub fn with_best_audio(video_id: &str) -> String {
        format!("{}+bestaudio/best", video_id)
    }

    /// Whether the operator picked something other than the default selector
    pub fn is_custom(selector: &str) -> bool {
        selector != DEFAULT_SELECTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(id: &str, video: bool, audio: bool, size: Option<u64>) -> FormatVariant {
        FormatVariant {
            format_id: id.to_string(),
            has_video: video,
            has_audio: audio,
            label: format!("{}-label", id),
            approx_size: size,
            fps: if video { Some(30.0) } else { None },
        }
    }

    fn descriptor() -> MediaDescriptor {
        MediaDescriptor {
            formats: vec![
                fmt("sb0", true, false, None),
                fmt("140", false, true, Some(3_000_000)),
                fmt("137", true, false, Some(90_000_000)),
                fmt("18", true, true, Some(20_000_000)),
                fmt("tiny", true, true, Some(1500)),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_junk_filtered() {
        assert!(FormatSelector::is_junk(&fmt("storyboard-1", true, false, None)));
        assert!(FormatSelector::is_junk(&fmt("x", true, true, Some(100))));
        assert!(!FormatSelector::is_junk(&fmt("22", true, true, None)));
    }

    #[test]
    fn test_menu_is_grouped_and_numbered() {
        let menu = FormatSelector::build_menu(&descriptor());
        let ids: Vec<_> = menu.options.iter().map(|o| o.format_id.as_str()).collect();
        // sb0 survives: its id is not a storyboard marker
        assert_eq!(ids, vec!["18", "sb0", "137", "140"]);
        assert_eq!(menu.options[0].number, 1);
        assert_eq!(menu.options[0].category, FormatCategory::VideoAudio);
        assert!(menu.render().contains("Video + Audio (recommended)"));
    }

    #[test]
    fn test_pick_variants() {
        let menu = FormatSelector::build_menu(&descriptor());
        assert_eq!(menu.pick(""), MenuPick::Default);
        assert_eq!(menu.pick("abc"), MenuPick::Default);
        assert_eq!(menu.pick("99"), MenuPick::Default);
        assert_eq!(menu.pick("1"), MenuPick::Direct("18".to_string()));
        assert_eq!(
            menu.pick("3"),
            MenuPick::NeedsAudio {
                video_id: "137".to_string()
            }
        );
        assert!(matches!(menu.pick("4"), MenuPick::NeedsConfirmation { .. }));
    }

    #[test]
    fn test_merge_audio() {
        let menu = FormatSelector::build_menu(&descriptor());
        assert_eq!(menu.merge_audio("137", ""), "137+bestaudio/best");
        assert_eq!(menu.merge_audio("137", "1"), "137+140");
        assert_eq!(menu.merge_audio("137", "7"), "137+bestaudio/best");
    }

    #[test]
    fn test_custom_selector_detection() {
        assert!(!FormatSelector::is_custom(DEFAULT_SELECTOR));
        assert!(FormatSelector::is_custom("137+bestaudio/best"));
    }
}
