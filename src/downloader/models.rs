// Common data models for the acquisition pipeline

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Which canonical root a file belongs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaClass {
    Video,
    Image,
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// One format variant reported by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatVariant {
    /// Format ID (e.g., "137", "hls-720p")
    pub format_id: String,
    pub has_video: bool,
    pub has_audio: bool,
    /// format_note, resolution or height-derived label
    pub label: String,
    /// Exact or approximate size in bytes
    pub approx_size: Option<u64>,
    pub fps: Option<f32>,
}

/// Backend-reported metadata for a URL
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Which extractor resolved the URL ("generic" means no real support)
    pub extractor: Option<String>,
    pub formats: Vec<FormatVariant>,
    /// Playlist entries, if any
    pub entry_count: usize,
    pub webpage_url: Option<String>,
}

impl MediaDescriptor {
    pub fn is_generic(&self) -> bool {
        self.extractor
            .as_deref()
            .map_or(false, |e| e.to_lowercase().contains("generic"))
    }

    pub fn has_media(&self) -> bool {
        !self.formats.is_empty() || self.entry_count > 0
    }
}

/// Outcome of `ExtractionBackend::probe`
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub supported: bool,
    pub descriptor: Option<MediaDescriptor>,
}

impl ProbeResult {
    pub fn unsupported() -> Self {
        Self::default()
    }

    /// Supported only with real media AND a non-generic extractor
    pub fn from_descriptor(descriptor: MediaDescriptor) -> Self {
        let supported = !descriptor.is_generic() && descriptor.has_media();
        Self {
            supported,
            descriptor: Some(descriptor),
        }
    }
}

/// One parameter configuration attempted against the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionVariant {
    pub name: &'static str,
    /// Value passed as `--extractor-args`; `None` lets the backend pick
    pub extractor_args: Option<&'static str>,
}

impl ExtractionVariant {
    pub const fn new(name: &'static str, extractor_args: Option<&'static str>) -> Self {
        Self {
            name,
            extractor_args,
        }
    }
}

impl fmt::Display for ExtractionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Fixed priority: backend default first, then named player clients
pub const DEFAULT_VARIANTS: &[ExtractionVariant] = &[
    ExtractionVariant::new("default", None),
    ExtractionVariant::new("android", Some("youtube:player_client=android")),
    ExtractionVariant::new("android_embed", Some("youtube:player_client=android_embed")),
    ExtractionVariant::new("web", Some("youtube:player_client=web")),
    ExtractionVariant::new("safari", Some("youtube:player_client=safari")),
    ExtractionVariant::new("tv", Some("youtube:player_client=tv")),
    ExtractionVariant::new("client_default", Some("youtube:player_client=default")),
];

/// Backend options for one `extract` call
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub continue_partial: bool,
    pub concurrent_fragments: u32,
    pub retries: u32,
    pub fragment_retries: u32,
    pub socket_timeout_secs: u32,
    /// Passed through as e.g. "512K"
    pub buffer_size: String,
    pub http_chunk_size: String,
    pub allow_overwrite: bool,
    pub referer: Option<String>,
    pub user_agent: String,
    pub cookie_file: Option<PathBuf>,
    /// Output naming template, relative to the output directory
    pub output_template: String,
    pub merge_format: String,
    /// Hard limit on one backend run
    pub run_timeout_secs: u64,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            continue_partial: true,
            concurrent_fragments: 10,
            retries: 10,
            fragment_retries: 10,
            socket_timeout_secs: 30,
            buffer_size: "512K".to_string(),
            http_chunk_size: "5M".to_string(),
            allow_overwrite: false,
            referer: None,
            user_agent: String::new(),
            cookie_file: None,
            output_template: "%(title)s.%(id)s.%(ext)s".to_string(),
            merge_format: "mp4".to_string(),
            run_timeout_secs: 6 * 60 * 60,
        }
    }
}

/// Everything one variant attempt needs
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub url: &'a str,
    pub variant: ExtractionVariant,
    pub format_selector: &'a str,
    pub output_dir: &'a Path,
    pub options: &'a ExtractionOptions,
}

/// What the backend says it produced
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    /// Claimed output path; may be stale, wrong or missing
    pub claimed_path: Option<PathBuf>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub webpage_url: Option<String>,
    pub elapsed: Duration,
}

/// Best-effort identification of the file an attempt produced
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    /// Extension was added by content sniffing
    pub extension_inferred: bool,
    pub class: MediaClass,
    /// Placed under its canonical root; the path no longer changes
    pub finalized: bool,
}

impl ResolvedFile {
    pub fn from_path(path: &Path, class: MediaClass) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            modified: meta.modified().unwrap_or_else(|_| SystemTime::now()),
            extension_inferred: false,
            class,
            finalized: false,
        })
    }

    /// Follow a rename/move
    pub fn relocate(&mut self, to: PathBuf) {
        if let Ok(meta) = std::fs::metadata(&to) {
            self.size = meta.len();
            if let Ok(modified) = meta.modified() {
                self.modified = modified;
            }
        }
        self.path = to;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    Video,
    Image,
}

/// URL found during page scanning
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveredLink {
    pub url: String,
    pub kind: LinkKind,
}

impl DiscoveredLink {
    pub fn video(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: LinkKind::Video,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: LinkKind::Image,
        }
    }
}

/// Drop repeated URLs, keeping first-seen order
pub fn dedup_links(links: Vec<DiscoveredLink>) -> Vec<DiscoveredLink> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|l| !l.url.is_empty() && seen.insert(l.url.clone()))
        .collect()
}

/// Keep first occurrence of each non-empty string
pub fn dedup_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| !u.is_empty() && seen.insert(u.clone()))
        .collect()
}

/// Output of an ffprobe-style inspection
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaProbe {
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_audio: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioPresence {
    Yes,
    No,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// One line of the download summary; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub timestamp: String,
    pub path: String,
    pub size_bytes: u64,
    pub media_duration_seconds: Option<f64>,
    pub resolution: Resolution,
    pub has_audio: AudioPresence,
    pub elapsed_seconds: Option<f64>,
    pub source_url: Option<String>,
}

/// Single-line transfer progress
#[derive(Debug, Clone, Default)]
pub struct TransferProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
    /// Backend-provided text when bytes are unknown (e.g. "12.5%")
    pub percent_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_extractor_is_unsupported() {
        let descriptor = MediaDescriptor {
            extractor: Some("Generic".to_string()),
            formats: vec![FormatVariant::default()],
            ..Default::default()
        };
        assert!(!ProbeResult::from_descriptor(descriptor).supported);
    }

    #[test]
    fn test_entries_count_as_media() {
        let descriptor = MediaDescriptor {
            extractor: Some("youtube:tab".to_string()),
            entry_count: 3,
            ..Default::default()
        };
        assert!(ProbeResult::from_descriptor(descriptor).supported);
    }

    #[test]
    fn test_no_formats_is_unsupported() {
        let descriptor = MediaDescriptor {
            extractor: Some("vimeo".to_string()),
            ..Default::default()
        };
        assert!(!ProbeResult::from_descriptor(descriptor).supported);
    }

    #[test]
    fn test_dedup_keeps_order() {
        let links = vec![
            DiscoveredLink::video("https://a/1.mp4"),
            DiscoveredLink::image("https://a/x.jpg"),
            DiscoveredLink::video("https://a/1.mp4"),
            DiscoveredLink::video("https://a/2.mp4"),
        ];
        let urls: Vec<_> = dedup_links(links).into_iter().map(|l| l.url).collect();
        assert_eq!(urls, vec!["https://a/1.mp4", "https://a/x.jpg", "https://a/2.mp4"]);
    }

    #[test]
    fn test_links_hash_by_url_and_kind() {
        let set: std::collections::HashSet<_> = [
            DiscoveredLink::video("https://a/1.gif"),
            DiscoveredLink::image("https://a/1.gif"),
            DiscoveredLink::video("https://a/1.gif"),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_default_variant_first() {
        assert_eq!(DEFAULT_VARIANTS[0].extractor_args, None);
        assert!(DEFAULT_VARIANTS.len() > 1);
    }
}
