// Summary reporting
//
// A file is reported at most once per process, keyed by its canonical path. The
// reporter probes the file, builds one `SummaryEntry` and hands it to every sink.
// Sinks are best effort: a failing sink is logged and skipped.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::errors::DownloadError;
use super::models::{AudioPresence, Resolution, SummaryEntry};
use super::traits::{ContainerProbe, SummarySink};
use super::utils::{fmt_hms, fmt_size, timestamp_human};

fn canonical_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Canonical paths that already produced a summary entry
#[derive(Debug, Default)]
pub struct ReportedSet {
    inner: Mutex<HashSet<PathBuf>>,
}

impl ReportedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-insert in one step; `true` when `key` was not yet present
    pub fn claim(&self, key: &Path) -> bool {
        match self.inner.lock() {
            Ok(mut set) => set.insert(key.to_path_buf()),
            Err(poisoned) => poisoned.into_inner().insert(key.to_path_buf()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transfer time per output path, written when a transfer ends and read at finalization
#[derive(Debug, Default)]
pub struct ElapsedTable {
    inner: Mutex<HashMap<PathBuf, Duration>>,
}

impl ElapsedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &Path, elapsed: Duration) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(path.to_path_buf(), elapsed);
        }
    }

    pub fn get(&self, path: &Path) -> Option<Duration> {
        self.inner.lock().ok()?.get(path).copied()
    }

    /// Re-key after a rename or move
    pub fn rekey(&self, from: &Path, to: &Path) {
        if from == to {
            return;
        }
        if let Ok(mut map) = self.inner.lock() {
            if let Some(d) = map.remove(from) {
                map.insert(to.to_path_buf(), d);
            }
        }
    }
}

pub struct SummaryReporter {
    sinks: Vec<Box<dyn SummarySink>>,
    probe: Option<Arc<dyn ContainerProbe>>,
}

impl SummaryReporter {
    pub fn new(sinks: Vec<Box<dyn SummarySink>>, probe: Option<Arc<dyn ContainerProbe>>) -> Self {
        Self { sinks, probe }
    }

    /// No sinks, no probe
    pub fn silent() -> Self {
        Self::new(Vec::new(), None)
    }

    /// Emit one entry for `path` unless it was already reported or does not exist
    pub async fn report(
        &self,
        reported: &ReportedSet,
        path: &Path,
        source_url: Option<&str>,
        elapsed: Option<Duration>,
    ) -> Option<SummaryEntry> {
        let key = canonical_key(path);
        let size_bytes = match std::fs::metadata(&key) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                tracing::debug!(path = %key.display(), "not reporting missing file");
                return None;
            }
        };
        if !reported.claim(&key) {
            tracing::debug!(path = %key.display(), "already reported");
            return None;
        }

        let probed = match &self.probe {
            Some(probe) => probe.probe_file(&key).await,
            None => None,
        };

        let entry = SummaryEntry {
            timestamp: timestamp_human(),
            path: key.to_string_lossy().to_string(),
            size_bytes,
            media_duration_seconds: probed.and_then(|p| p.duration_seconds),
            resolution: Resolution {
                width: probed.and_then(|p| p.width),
                height: probed.and_then(|p| p.height),
            },
            has_audio: match probed {
                Some(p) if p.has_audio => AudioPresence::Yes,
                Some(_) => AudioPresence::No,
                None => AudioPresence::Unknown,
            },
            elapsed_seconds: elapsed.map(|d| d.as_secs_f64()),
            source_url: source_url.map(str::to_string),
        };

        for sink in &self.sinks {
            if let Err(e) = sink.append(&entry) {
                tracing::warn!(sink = sink.name(), error = %e, "summary sink failed");
            }
        }
        Some(entry)
    }
}

impl AudioPresence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
            Self::Unknown => "Unknown",
        }
    }
}

impl SummaryEntry {
    /// Operator-facing block
    pub fn render_block(&self) -> String {
        let duration = self
            .media_duration_seconds
            .filter(|d| *d > 0.0)
            .map(|d| fmt_hms(Some(d)))
            .unwrap_or_else(|| "Unknown".to_string());
        let or_unknown = |v: Option<u32>| v.map_or_else(|| "Unknown".to_string(), |v| v.to_string());
        format!(
            "\nDownload Summary\n\
             ----------------\n\
             Saved to : {}\n\
             Size      : {}\n\
             Duration  : {}\n\
             Total time taken: {}\n\
             Resolution: {}p (width {})\n\
             Audio     : {}\n\
             ----------------\n",
            self.path,
            fmt_size(Some(self.size_bytes)),
            duration,
            fmt_hms(self.elapsed_seconds),
            or_unknown(self.resolution.height),
            or_unknown(self.resolution.width),
            self.has_audio.as_str(),
        )
    }

    /// One row of the text table, plus the source line when known
    pub fn render_row(&self) -> String {
        let q = |v: Option<u32>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
        let mut row = format!(
            "{:<19}  {:8.2}  {:>9}  {:>8}  {:>11}  {:>5}  {}\n",
            self.timestamp,
            self.size_bytes as f64 / 1_048_576.0,
            fmt_hms(self.elapsed_seconds),
            fmt_hms(self.media_duration_seconds),
            format!("{}x{}", q(self.resolution.width), q(self.resolution.height)),
            self.has_audio.as_str(),
            self.path
        );
        if let Some(src) = &self.source_url {
            row.push_str("    Source: ");
            row.push_str(src);
            row.push('\n');
        }
        row
    }
}

fn open_append(path: &Path) -> Result<std::fs::File, DownloadError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// One JSON object per line
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SummarySink for JsonlSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn append(&self, entry: &SummaryEntry) -> Result<(), DownloadError> {
        let line = serde_json::to_string(entry)
            .map_err(|e| DownloadError::ParseError(format!("summary serialization: {}", e)))?;
        let mut file = open_append(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Fixed-width table, header written when the file is new
pub struct TextSink {
    path: PathBuf,
}

impl TextSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn header() -> String {
        format!(
            "{:<19}  {:>8}  {:>9}  {:>8}  {:>11}  {:>5}  {}\n{}\n",
            "Timestamp",
            "SizeMB",
            "Elapsed",
            "Duration",
            "Resolution",
            "Audio",
            "Path",
            "-".repeat(120)
        )
    }
}

impl SummarySink for TextSink {
    fn name(&self) -> &'static str {
        "text"
    }

    fn append(&self, entry: &SummaryEntry) -> Result<(), DownloadError> {
        let need_header = !self.path.exists();
        let mut file = open_append(&self.path)?;
        if need_header {
            file.write_all(Self::header().as_bytes())?;
        }
        file.write_all(entry.render_row().as_bytes())?;
        Ok(())
    }
}

/// Prints the summary block to stdout
pub struct ConsoleSink;

impl SummarySink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn append(&self, entry: &SummaryEntry) -> Result<(), DownloadError> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(entry.render_block().as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::downloader::models::MediaProbe;

    struct FixedProbe;

    #[async_trait]
    impl ContainerProbe for FixedProbe {
        async fn probe_file(&self, _path: &Path) -> Option<MediaProbe> {
            Some(MediaProbe {
                duration_seconds: Some(12.0),
                width: Some(1280),
                height: Some(720),
                has_audio: true,
            })
        }
    }

    struct FailingSink;

    impl SummarySink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn append(&self, _entry: &SummaryEntry) -> Result<(), DownloadError> {
            Err(DownloadError::Io("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_report_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, vec![1u8; 1000]).unwrap();
        let jsonl = dir.path().join("out.jsonl");

        let reporter = SummaryReporter::new(vec![Box::new(JsonlSink::new(&jsonl))], None);
        let reported = ReportedSet::new();

        let first = reporter.report(&reported, &file, Some("https://x/1"), None).await;
        // Same file through a non-canonical spelling
        let alias = dir.path().join(".").join("clip.mp4");
        let second = reporter.report(&reported, &alias, Some("https://x/1"), None).await;

        assert!(first.is_some());
        assert!(second.is_none());
        let lines = std::fs::read_to_string(&jsonl).unwrap();
        assert_eq!(lines.lines().count(), 1);
        assert_eq!(reported.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = SummaryReporter::silent();
        let reported = ReportedSet::new();
        let entry = reporter
            .report(&reported, &dir.path().join("nope.mp4"), None, None)
            .await;
        assert!(entry.is_none());
        assert!(reported.is_empty());
    }

    #[tokio::test]
    async fn test_probe_fills_entry_and_sink_failure_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, vec![1u8; 2048]).unwrap();
        let txt = dir.path().join("out.txt");

        let reporter = SummaryReporter::new(
            vec![Box::new(FailingSink), Box::new(TextSink::new(&txt))],
            Some(Arc::new(FixedProbe)),
        );
        let entry = reporter
            .report(&ReportedSet::new(), &file, Some("https://x/2"), Some(Duration::from_secs(3)))
            .await
            .unwrap();

        assert_eq!(entry.size_bytes, 2048);
        assert_eq!(entry.has_audio, AudioPresence::Yes);
        assert_eq!(entry.resolution.height, Some(720));
        assert_eq!(entry.elapsed_seconds, Some(3.0));

        let text = std::fs::read_to_string(&txt).unwrap();
        assert!(text.starts_with("Timestamp"));
        assert!(text.contains("1280x720"));
        assert!(text.contains("    Source: https://x/2"));
    }

    #[test]
    fn test_jsonl_shape() {
        let entry = SummaryEntry {
            timestamp: "2024-01-01 00:00:00".to_string(),
            path: "/v/a.mp4".to_string(),
            size_bytes: 10,
            media_duration_seconds: None,
            resolution: Resolution::default(),
            has_audio: AudioPresence::Unknown,
            elapsed_seconds: None,
            source_url: None,
        };
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["has_audio"], "Unknown");
        assert!(json["resolution"]["width"].is_null());
    }

    #[test]
    fn test_elapsed_rekey() {
        let table = ElapsedTable::new();
        table.record(Path::new("/tmp/a"), Duration::from_secs(5));
        table.rekey(Path::new("/tmp/a"), Path::new("/v/a.mp4"));
        assert_eq!(table.get(Path::new("/tmp/a")), None);
        assert_eq!(table.get(Path::new("/v/a.mp4")), Some(Duration::from_secs(5)));
    }
}
