// Container normalization: give extension-less outputs the extension their bytes imply

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{MediaProbe, ResolvedFile};
use super::tools::{ToolManager, ToolType};
use super::traits::ContainerProbe;
use super::utils::{run_output_with_timeout, unique_path};

const SNIFF_LEN: usize = 64;
const EBML_MAGIC: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Extension (without dot) implied by the leading bytes, if any signature matches
pub fn sniff_bytes(head: &[u8]) -> Option<&'static str> {
    if contains(head, b"ftyp") {
        return Some("mp4");
    }
    if head.starts_with(EBML_MAGIC) {
        // The EBML DocType tells the two apart
        return Some(if contains(head, b"matroska") { "mkv" } else { "webm" });
    }
    if head.starts_with(b"ID3") {
        return Some("mp3");
    }
    if head.starts_with(b"RIFF") && head.len() >= 12 {
        match &head[8..12] {
            b"WAVE" => return Some("wav"),
            b"WEBP" => return Some("webp"),
            _ => {}
        }
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }
    if head.starts_with(b"\x89PNG") {
        return Some("png");
    }
    if head.starts_with(b"GIF8") {
        return Some("gif");
    }
    if contains(head, b"matroska") {
        return Some("mkv");
    }
    None
}

pub fn sniff_extension(path: &Path) -> Option<&'static str> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    std::fs::File::open(path)
        .ok()?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .ok()?;
    sniff_bytes(&head)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerNormalizer;

impl ContainerNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Append a sniffed extension to an extension-less file. Best effort: on any
    /// failure the file keeps its current name.
    pub fn normalize(&self, file: &mut ResolvedFile, allow_overwrite: bool) {
        if file.path.extension().is_some() {
            return;
        }
        let Some(ext) = sniff_extension(&file.path) else {
            tracing::debug!(path = %file.path.display(), "no container signature matched");
            return;
        };

        match Self::rename_with_extension(&file.path, ext, allow_overwrite) {
            Ok(renamed) => {
                tracing::info!(from = %file.path.display(), to = %renamed.display(), "added sniffed extension");
                file.relocate(renamed);
                file.extension_inferred = true;
            }
            Err(e) => {
                tracing::warn!(path = %file.path.display(), error = %e, "could not rename after sniffing");
            }
        }
    }

    fn rename_with_extension(
        path: &Path,
        ext: &str,
        allow_overwrite: bool,
    ) -> Result<PathBuf, DownloadError> {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        let target = PathBuf::from(name);
        let target = if allow_overwrite { target } else { unique_path(&target) };
        std::fs::rename(path, &target)?;
        Ok(target)
    }
}

/// Container inspection through ffprobe
pub struct FfprobeProbe {
    ffprobe_path: String,
    timeout_secs: u64,
}

impl FfprobeProbe {
    pub fn new() -> Self {
        Self {
            ffprobe_path: ToolManager::new().locate_or_name(ToolType::Ffprobe),
            timeout_secs: 20,
        }
    }

    /// Pull duration, first video stream size and audio presence from `-print_format json`
    pub fn parse_json(stdout: &[u8]) -> Option<MediaProbe> {
        let json: serde_json::Value = serde_json::from_slice(stdout).ok()?;

        let duration_seconds = json["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok())
            .or_else(|| json["format"]["duration"].as_f64());

        let streams = json["streams"].as_array().cloned().unwrap_or_default();
        let video = streams
            .iter()
            .find(|s| s["codec_type"].as_str() == Some("video"));
        let has_audio = streams
            .iter()
            .any(|s| s["codec_type"].as_str() == Some("audio"));

        Some(MediaProbe {
            duration_seconds,
            width: video.and_then(|v| v["width"].as_u64()).map(|w| w as u32),
            height: video.and_then(|v| v["height"].as_u64()).map(|h| h as u32),
            has_audio,
        })
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerProbe for FfprobeProbe {
    async fn probe_file(&self, path: &Path) -> Option<MediaProbe> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format:stream".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            path.to_string_lossy().to_string(),
        ];
        match run_output_with_timeout(&self.ffprobe_path, args, self.timeout_secs).await {
            Ok(out) if out.status.success() => Self::parse_json(&out.stdout),
            Ok(out) => {
                tracing::debug!(
                    path = %path.display(),
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "ffprobe failed"
                );
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "ffprobe unavailable");
                None
            }
        }
    }
}
