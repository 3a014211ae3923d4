// Output resolution: recover the file an extraction actually produced
//
// The backend's claimed path is checked first, then the same path with the merge
// container suffix, then a recency scan of the output directory ranked by
// identifier and title matches before modification time.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::models::{ExtractionOutput, MediaClass, ResolvedFile};

/// Names the backend uses for in-progress files
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".tmp"];

#[derive(Debug, Clone)]
pub struct OutputResolver {
    /// Files smaller than this are ignored in the directory scan
    pub min_size: u64,
    /// Only files modified within this window are candidates
    pub recency_window: Duration,
    /// Suffix tried when the claimed path is missing
    pub container_ext: String,
}

impl Default for OutputResolver {
    fn default() -> Self {
        Self {
            min_size: 512,
            recency_window: Duration::from_secs(15 * 60),
            container_ext: "mp4".to_string(),
        }
    }
}

impl OutputResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, output: &ExtractionOutput, output_dir: &Path) -> Option<ResolvedFile> {
        if let Some(claimed) = &output.claimed_path {
            if claimed.is_file() {
                return ResolvedFile::from_path(claimed, MediaClass::Video);
            }
            let with_container = claimed.with_extension(&self.container_ext);
            if with_container.is_file() {
                tracing::debug!(path = %with_container.display(), "claimed path missing, found container variant");
                return ResolvedFile::from_path(&with_container, MediaClass::Video);
            }
        }

        let chosen = self.scan_recent(output_dir, output.id.as_deref(), output.title.as_deref())?;
        tracing::debug!(path = %chosen.display(), "resolved output by directory scan");
        ResolvedFile::from_path(&chosen, MediaClass::Video)
    }

    /// Most plausible recently produced file in `dir`
    pub fn scan_recent(&self, dir: &Path, id: Option<&str>, title: Option<&str>) -> Option<PathBuf> {
        let threshold = SystemTime::now()
            .checked_sub(self.recency_window)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut candidates: Vec<(SystemTime, PathBuf)> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let meta = entry.metadata().ok()?;
                if !meta.is_file() || meta.len() < self.min_size {
                    return None;
                }
                let name = path.file_name()?.to_string_lossy().to_lowercase();
                if PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                    return None;
                }
                let modified = meta.modified().ok()?;
                (modified >= threshold).then_some((modified, path))
            })
            .collect();

        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let file_name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        };

        let id = id.filter(|s| !s.is_empty());
        if let Some(id) = id {
            if let Some((_, p)) = candidates.iter().find(|(_, p)| file_name(p).contains(id)) {
                return Some(p.clone());
            }
        }

        let token = title.and_then(|t| t.split_whitespace().next());
        if let Some(token) = token {
            if let Some((_, p)) = candidates.iter().find(|(_, p)| file_name(p).contains(token)) {
                return Some(p.clone());
            }
        }

        candidates.into_iter().next().map(|(_, p)| p)
    }
}
