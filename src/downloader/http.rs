// Direct stream downloader
//
// Plain HTTP GET streamed to disk, used for direct media/image URLs and as the last
// fallback when the extraction backend gives up. Retries with linear backoff, then
// hands over to curl. Bytes land in `<name>.part` and replace the destination only
// once complete. Cancellation removes the partial file and yields
// `FetchOutcome::Canceled`, which callers treat as "no result", not as a failure.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use super::errors::DownloadError;
use super::models::{MediaClass, ResolvedFile, TransferProgress};
use super::summary::ElapsedTable;
use super::tools::{ToolManager, ToolType};
use super::traits::ProgressSink;
use super::utils::{request_headers, run_output_with_timeout, safe_filename_from_url, unique_path};

const CHUNK_SIZE: usize = 1024 * 1024;

/// One direct fetch
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub out_dir: &'a Path,
    pub class: MediaClass,
    /// An existing destination is returned as-is instead of being fetched again
    pub reuse_existing: bool,
    pub allow_overwrite: bool,
    pub max_retries: u32,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Saved(ResolvedFile),
    /// Destination already existed and was reused
    Existing(ResolvedFile),
    Canceled,
}

impl FetchOutcome {
    /// `None` when canceled
    pub fn into_file(self) -> Option<ResolvedFile> {
        match self {
            Self::Saved(f) | Self::Existing(f) => Some(f),
            Self::Canceled => None,
        }
    }
}

enum AttemptError {
    Canceled,
    Failed(DownloadError),
}

impl From<DownloadError> for AttemptError {
    fn from(e: DownloadError) -> Self {
        Self::Failed(e)
    }
}

pub struct DirectStreamDownloader {
    client: Client,
    backoff_unit: Duration,
    read_timeout: Duration,
    curl_fallback: bool,
    curl_timeout_secs: u64,
    tools: ToolManager,
}

impl DirectStreamDownloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            backoff_unit: Duration::from_secs(1),
            read_timeout: Duration::from_secs(60),
            curl_fallback: true,
            curl_timeout_secs: 3600,
            tools: ToolManager::new(),
        }
    }

    /// Base of the linear backoff: attempt `n` waits `(n + 1) * unit`
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_curl_fallback(mut self, enabled: bool) -> Self {
        self.curl_fallback = enabled;
        self
    }

    /// Destination path for `url` in `out_dir`, honoring the overwrite policy
    pub fn destination(url: &str, out_dir: &Path, allow_overwrite: bool) -> PathBuf {
        let dest = out_dir.join(safe_filename_from_url(url));
        if allow_overwrite {
            dest
        } else {
            unique_path(&dest)
        }
    }

    pub async fn fetch(
        &self,
        request: &FetchRequest<'_>,
        progress: &dyn ProgressSink,
        elapsed: &ElapsedTable,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, DownloadError> {
        tokio::fs::create_dir_all(request.out_dir).await?;

        let natural = request.out_dir.join(safe_filename_from_url(request.url));
        if request.reuse_existing && !request.allow_overwrite && natural.is_file() {
            tracing::info!(path = %natural.display(), "file already exists, skipping download");
            if let Some(file) = ResolvedFile::from_path(&natural, request.class) {
                return Ok(FetchOutcome::Existing(file));
            }
        }
        let dest = Self::destination(request.url, request.out_dir, request.allow_overwrite);
        let part = partial_path(&dest);

        let mut last_error = DownloadError::Unknown("no attempts made".to_string());
        let attempts = request.max_retries.max(1);
        for attempt in 1..=attempts {
            let started = Instant::now();
            let result = self.stream_to_file(request.url, &part, progress, cancel).await;
            progress.finish();

            match result {
                Ok(_) => {
                    commit(&part, &dest).await?;
                    elapsed.record(&dest, started.elapsed());
                    return Self::saved(&dest, request.class);
                }
                Err(AttemptError::Canceled) => {
                    tracing::info!(url = request.url, "download canceled by user");
                    remove_quietly(&part).await;
                    return Ok(FetchOutcome::Canceled);
                }
                Err(AttemptError::Failed(e)) => {
                    tracing::warn!(url = request.url, attempt, error = %e, "direct download attempt failed");
                    remove_quietly(&part).await;
                    let retryable = is_retryable(&e);
                    last_error = e;
                    if !retryable || attempt == attempts {
                        break;
                    }
                    let wait = self.backoff_unit * (attempt + 1);
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(FetchOutcome::Canceled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        if self.curl_fallback && is_retryable(&last_error) {
            let started = Instant::now();
            match self.curl_to(request.url, &dest, cancel).await {
                Ok(true) => {
                    elapsed.record(&dest, started.elapsed());
                    return Self::saved(&dest, request.class);
                }
                Ok(false) => return Ok(FetchOutcome::Canceled),
                Err(e) => tracing::debug!(url = request.url, error = %e, "curl fallback failed"),
            }
        }

        Err(last_error)
    }

    /// External-tool fetch into `out_dir`, without trying the primary transport first
    pub async fn curl_fetch(
        &self,
        url: &str,
        out_dir: &Path,
        class: MediaClass,
        allow_overwrite: bool,
        elapsed: &ElapsedTable,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, DownloadError> {
        if !self.curl_fallback {
            return Err(DownloadError::ToolNotFound("curl (disabled)".to_string()));
        }
        tokio::fs::create_dir_all(out_dir).await?;
        let dest = Self::destination(url, out_dir, allow_overwrite);
        let started = Instant::now();
        if self.curl_to(url, &dest, cancel).await? {
            elapsed.record(&dest, started.elapsed());
            Self::saved(&dest, class)
        } else {
            Ok(FetchOutcome::Canceled)
        }
    }

    fn saved(dest: &Path, class: MediaClass) -> Result<FetchOutcome, DownloadError> {
        ResolvedFile::from_path(dest, class)
            .map(FetchOutcome::Saved)
            .ok_or(DownloadError::NoOutputProduced)
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64, AttemptError> {
        let send = self.client.get(url).headers(request_headers(Some(url))).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AttemptError::Canceled),
            r = send => r.map_err(DownloadError::from)?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let total = response.content_length().filter(|t| *t > 0);
        let file = tokio::fs::File::create(dest).await.map_err(DownloadError::from)?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let mut stream = response.bytes_stream();

        let started = Instant::now();
        let mut downloaded: u64 = 0;
        let mut sample = (started, 0u64);
        let mut speed = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AttemptError::Canceled),
                n = tokio::time::timeout(self.read_timeout, stream.next()) => n,
            };
            let chunk = match next {
                Err(_) => {
                    return Err(DownloadError::NetworkTimeout(format!(
                        "no data for {}s from {}",
                        self.read_timeout.as_secs(),
                        url
                    ))
                    .into())
                }
                Ok(None) => break,
                Ok(Some(chunk)) => chunk.map_err(DownloadError::from)?,
            };

            writer.write_all(&chunk).await.map_err(DownloadError::from)?;
            downloaded += chunk.len() as u64;

            let window = sample.0.elapsed();
            if window >= Duration::from_millis(250) {
                speed = Some((downloaded - sample.1) as f64 / window.as_secs_f64());
                sample = (Instant::now(), downloaded);
            }
            let elapsed = started.elapsed();
            progress.update(&TransferProgress {
                downloaded_bytes: downloaded,
                total_bytes: total,
                speed,
                elapsed,
                eta: match (total, speed) {
                    (Some(t), Some(s)) if s > 0.0 && t > downloaded => {
                        Some(Duration::from_secs_f64((t - downloaded) as f64 / s))
                    }
                    _ => None,
                },
                percent_text: None,
            });
        }

        writer.flush().await.map_err(DownloadError::from)?;
        tracing::info!(
            url,
            path = %dest.display(),
            size_mb = downloaded as f64 / 1_048_576.0,
            "direct download complete"
        );
        Ok(downloaded)
    }

    /// `Ok(false)` means canceled
    async fn curl_to(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<bool, DownloadError> {
        let curl = self
            .tools
            .locate(ToolType::Curl)
            .ok_or_else(|| DownloadError::ToolNotFound("curl".to_string()))?;
        let part = partial_path(dest);

        let mut args = vec![
            "-L".to_string(),
            "-f".to_string(),
            "-s".to_string(),
            "-o".to_string(),
            part.to_string_lossy().to_string(),
        ];
        for (name, value) in request_headers(Some(url)).iter() {
            if let Ok(v) = value.to_str() {
                args.push("-H".to_string());
                args.push(format!("{}: {}", name.as_str(), v));
            }
        }
        args.push(url.to_string());

        tracing::info!(url, "trying curl fallback");
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                remove_quietly(&part).await;
                return Ok(false);
            }
            out = run_output_with_timeout(&curl, args, self.curl_timeout_secs) => out,
        };

        match output {
            Ok(out) if out.status.success() && part.is_file() => {
                commit(&part, dest).await?;
                Ok(true)
            }
            Ok(out) => {
                remove_quietly(&part).await;
                Err(DownloadError::ExecutionError(format!(
                    "curl exited with {}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                )))
            }
            Err(e) => {
                remove_quietly(&part).await;
                Err(e)
            }
        }
    }
}

/// Sibling the transfer writes to until it completes
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Move a completed transfer over its destination
async fn commit(part: &Path, dest: &Path) -> Result<(), DownloadError> {
    if let Err(e) = tokio::fs::rename(part, dest).await {
        remove_quietly(part).await;
        return Err(e.into());
    }
    Ok(())
}

/// Client errors other than timeouts and rate limiting are not worth repeating
fn is_retryable(error: &DownloadError) -> bool {
    match error {
        DownloadError::Http { status, .. } => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            !status.is_client_error()
                || status == StatusCode::REQUEST_TIMEOUT
                || status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::FORBIDDEN
        }
        DownloadError::Io(_) => false,
        _ => true,
    }
}

async fn remove_quietly(path: &Path) {
    if tokio::fs::remove_file(path).await.is_ok() {
        tracing::debug!(path = %path.display(), "removed partial file");
    }
}
