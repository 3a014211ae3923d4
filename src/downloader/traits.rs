// Collaborator seams of the acquisition pipeline

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{
    DiscoveredLink, ExtractionOutput, ExtractionRequest, MediaDescriptor, MediaProbe, ProbeResult,
    SummaryEntry, TransferProgress,
};
use super::utils::{fmt_hms, fmt_size};

/// Trait for media-extraction backends
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Best-effort support check; failures mean "unsupported", never an error
    async fn probe(&self, url: &str, cookie_file: Option<&Path>) -> ProbeResult;

    /// Download with one variant; progress goes to `progress`
    async fn extract(
        &self,
        request: &ExtractionRequest<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<ExtractionOutput, DownloadError>;

    /// Full-verbosity re-run written to `log_dir`; `None` when the backend cannot produce one
    async fn verbose_trace(&self, url: &str, log_dir: &Path, reason: &str) -> Option<PathBuf>;
}

/// Finds embedded media on an HTML page. Never fails: errors yield an empty list.
#[async_trait]
pub trait PageScanner: Send + Sync {
    async fn scan(&self, page_url: &str) -> Vec<DiscoveredLink>;
}

/// Precise container inspection (duration, streams); optional
#[async_trait]
pub trait ContainerProbe: Send + Sync {
    async fn probe_file(&self, path: &Path) -> Option<MediaProbe>;
}

/// Append-only record sink for summary entries
pub trait SummarySink: Send + Sync {
    fn name(&self) -> &'static str;

    fn append(&self, entry: &SummaryEntry) -> Result<(), DownloadError>;
}

/// Receives transfer progress
pub trait ProgressSink: Send + Sync {
    fn update(&self, progress: &TransferProgress);

    /// Transfer ended (finished, failed or canceled)
    fn finish(&self) {}
}

/// Lets an operator pick a format; `None` keeps the default selector
pub trait FormatChooser: Send + Sync {
    fn choose(&self, descriptor: &MediaDescriptor) -> Option<String>;
}

/// Discards progress
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn update(&self, _progress: &TransferProgress) {}
}

/// Single-line `\r` progress on stderr
pub struct ConsoleProgress {
    last_draw: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            last_draw: Mutex::new(None),
            min_interval: Duration::from_millis(250),
        }
    }

    pub fn render(progress: &TransferProgress) -> String {
        let speed = progress
            .speed
            .map(|s| format!("{:5.2} MB/s", s / 1_048_576.0))
            .unwrap_or_else(|| "  ?  MB/s".to_string());
        let elapsed = fmt_hms(Some(progress.elapsed.as_secs_f64()));

        match (progress.total_bytes, &progress.percent_text) {
            (Some(total), _) if total > 0 => {
                let eta = progress
                    .eta
                    .map(|e| format!(" ETA {}", fmt_hms(Some(e.as_secs_f64()))))
                    .unwrap_or_default();
                format!(
                    "Downloading: {:6.2}/{:6.2} MB @ {}{} Elapsed {}",
                    progress.downloaded_bytes as f64 / 1_048_576.0,
                    total as f64 / 1_048_576.0,
                    speed,
                    eta,
                    elapsed
                )
            }
            (_, Some(pct)) => format!("Downloading: {} @ {} Elapsed {}", pct, speed, elapsed),
            _ => format!(
                "Downloading: {} @ {} Elapsed {}",
                fmt_size(Some(progress.downloaded_bytes)),
                speed,
                elapsed
            ),
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn update(&self, progress: &TransferProgress) {
        let Ok(mut last) = self.last_draw.lock() else {
            return;
        };
        if last.map_or(false, |t| t.elapsed() < self.min_interval) {
            return;
        }
        *last = Some(Instant::now());

        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{:<100}", Self::render(progress));
        let _ = stderr.flush();
    }

    fn finish(&self) {
        if let Ok(mut last) = self.last_draw.lock() {
            if last.take().is_some() {
                eprintln!();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_total() {
        let line = ConsoleProgress::render(&TransferProgress {
            downloaded_bytes: 1_048_576,
            total_bytes: Some(2_097_152),
            speed: Some(1_048_576.0),
            elapsed: Duration::from_secs(1),
            ..Default::default()
        });
        assert!(line.contains("1.00/  2.00 MB"));
        assert!(line.contains("Elapsed 00:01"));
    }

    #[test]
    fn test_render_percent_only() {
        let line = ConsoleProgress::render(&TransferProgress {
            percent_text: Some("42.0%".to_string()),
            ..Default::default()
        });
        assert!(line.starts_with("Downloading: 42.0%"));
    }
}
