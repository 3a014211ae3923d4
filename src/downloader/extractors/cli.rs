// yt-dlp extraction backend
//
// Runs yt-dlp as a subprocess:
// - probe:   `--dump-single-json --flat-playlist`, parsed into a MediaDescriptor
// - extract: one run per variant; progress lines are parsed as they arrive and the
//            final file path is printed as JSON after the move stage
//
// Two launch modes share the same arguments:
// - native binary (`yt-dlp`, located by ToolManager)
// - Python module (`python3 -m yt_dlp`, interpreter from YTDLP_PYTHON)

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use super::diagnostics::{analyze_failure, write_verbose_trace};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{
    ExtractionOutput, ExtractionRequest, FormatVariant, MediaDescriptor, ProbeResult,
    TransferProgress,
};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::{ExtractionBackend, ProgressSink};
use crate::downloader::utils::{origin_of, random_user_agent, run_output_with_timeout};

lazy_static::lazy_static! {
    // [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
    static ref PROGRESS_RE: Regex = Regex::new(
        r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)(?:\s+at\s+(\d+\.?\d*\s*\w+)/s)?(?:\s+ETA\s+(\S+))?"
    ).unwrap();
    static ref SIZE_RE: Regex = Regex::new(r"^(\d+\.?\d*)\s*([KMGT]?i?B)$").unwrap();
}

/// Fields printed after the file reaches its final location
const RESULT_TEMPLATE: &str = "after_move:%(.{id,title,webpage_url,filepath})j";

pub struct YtDlpBackend {
    program: String,
    prefix_args: Vec<String>,
    probe_timeout_secs: u64,
}

impl YtDlpBackend {
    /// Native binary
    pub fn new() -> Self {
        Self::with_command(ToolManager::new().locate_or_name(ToolType::YtDlp), Vec::new())
    }

    /// `python3 -m yt_dlp`
    pub fn python_module() -> Self {
        let python = std::env::var("YTDLP_PYTHON").unwrap_or_else(|_| "python3".to_string());
        Self::with_command(python, vec!["-m".to_string(), "yt_dlp".to_string()])
    }

    pub fn with_command(program: impl Into<String>, prefix_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args,
            probe_timeout_secs: 60,
        }
    }

    fn probe_args(&self, url: &str, cookie_file: Option<&Path>) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "--dump-single-json".to_string(),
            "--flat-playlist".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ]);
        if let Some(path) = cookie_file {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }
        args.push(url.to_string());
        args
    }

    /// Full argument list for one variant attempt
    pub fn build_extract_args(&self, request: &ExtractionRequest<'_>) -> Vec<String> {
        let opts = request.options;
        let mut args = self.prefix_args.clone();
        args.extend([
            "-f".to_string(),
            request.format_selector.to_string(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "-P".to_string(),
            request.output_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            opts.output_template.clone(),
            "--merge-output-format".to_string(),
            opts.merge_format.clone(),
            "--concurrent-fragments".to_string(),
            opts.concurrent_fragments.to_string(),
            "--retries".to_string(),
            opts.retries.to_string(),
            "--fragment-retries".to_string(),
            opts.fragment_retries.to_string(),
            "--socket-timeout".to_string(),
            opts.socket_timeout_secs.to_string(),
            "--buffer-size".to_string(),
            opts.buffer_size.clone(),
            "--http-chunk-size".to_string(),
            opts.http_chunk_size.clone(),
            "-O".to_string(),
            RESULT_TEMPLATE.to_string(),
        ]);

        args.push(if opts.continue_partial { "--continue" } else { "--no-continue" }.to_string());
        args.push(if opts.allow_overwrite { "--force-overwrites" } else { "--no-overwrites" }.to_string());

        let user_agent = if opts.user_agent.is_empty() {
            random_user_agent().to_string()
        } else {
            opts.user_agent.clone()
        };
        args.push("--user-agent".to_string());
        args.push(user_agent);

        if let Some(referer) = opts.referer.clone().or_else(|| origin_of(request.url)) {
            args.push("--add-header".to_string());
            args.push(format!("Referer: {}", referer));
        }

        if let Some(path) = &opts.cookie_file {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }

        if let Some(extractor_args) = request.variant.extractor_args {
            args.push("--extractor-args".to_string());
            args.push(extractor_args.to_string());
        }

        args.push(request.url.to_string());
        args
    }

    /// Parse `--dump-single-json` output
    pub fn parse_descriptor(stdout: &[u8]) -> Result<MediaDescriptor, DownloadError> {
        let json: serde_json::Value = serde_json::from_slice(stdout)
            .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

        let str_field = |key: &str| json[key].as_str().map(|s| s.to_string());

        Ok(MediaDescriptor {
            id: str_field("id"),
            title: str_field("title"),
            extractor: str_field("extractor_key").or_else(|| str_field("extractor")),
            formats: Self::parse_formats(&json),
            entry_count: json["entries"].as_array().map_or(0, |e| e.len()),
            webpage_url: str_field("webpage_url"),
        })
    }

    fn parse_formats(json: &serde_json::Value) -> Vec<FormatVariant> {
        let Some(formats) = json["formats"].as_array() else {
            return Vec::new();
        };

        let present = |codec: &serde_json::Value| codec.as_str().map_or(false, |c| !c.is_empty() && c != "none");

        formats
            .iter()
            .map(|f| {
                let label = f["format_note"]
                    .as_str()
                    .or_else(|| f["format"].as_str())
                    .map(|s| s.to_string())
                    .or_else(|| f["height"].as_u64().map(|h| format!("{}p", h)))
                    .or_else(|| f["ext"].as_str().map(|s| s.to_string()))
                    .unwrap_or_default();

                FormatVariant {
                    format_id: f["format_id"].as_str().unwrap_or("").to_string(),
                    has_video: present(&f["vcodec"]),
                    has_audio: present(&f["acodec"]),
                    label,
                    approx_size: f["filesize"].as_u64().or_else(|| f["filesize_approx"].as_u64()),
                    fps: f["fps"].as_f64().map(|fps| fps as f32),
                }
            })
            .collect()
    }

    /// "310.04MiB" → bytes
    pub fn parse_size(text: &str) -> Option<f64> {
        let caps = SIZE_RE.captures(text.trim())?;
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let multiplier = match caps.get(2)?.as_str() {
            "B" => 1.0,
            "KiB" => 1024.0,
            "MiB" => 1024.0 * 1024.0,
            "GiB" => 1024.0 * 1024.0 * 1024.0,
            "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
            "KB" => 1e3,
            "MB" => 1e6,
            "GB" => 1e9,
            "TB" => 1e12,
            _ => return None,
        };
        Some(value * multiplier)
    }

    /// "11:59" or "1:02:03" → duration
    fn parse_eta(text: &str) -> Option<Duration> {
        let mut secs: u64 = 0;
        for part in text.split(':') {
            secs = secs * 60 + part.parse::<u64>().ok()?;
        }
        Some(Duration::from_secs(secs))
    }

    /// Parse one `--newline` progress line
    pub fn parse_progress_line(line: &str, elapsed: Duration) -> Option<TransferProgress> {
        let caps = PROGRESS_RE.captures(line)?;
        let percent: f64 = caps.get(1)?.as_str().parse().ok()?;
        let total = caps.get(2).and_then(|m| Self::parse_size(m.as_str()));

        Some(TransferProgress {
            downloaded_bytes: total.map_or(0, |t| (t * percent / 100.0) as u64),
            total_bytes: total.map(|t| t as u64),
            speed: caps.get(3).and_then(|m| Self::parse_size(m.as_str())),
            elapsed,
            eta: caps.get(4).and_then(|m| Self::parse_eta(m.as_str())),
            percent_text: Some(format!("{:.1}%", percent)),
        })
    }

    /// Parse the JSON line printed by the `after_move` template
    pub fn parse_result_line(line: &str) -> Option<ExtractionOutput> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let json: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        let str_field = |key: &str| json[key].as_str().filter(|s| !s.is_empty()).map(|s| s.to_string());

        Some(ExtractionOutput {
            claimed_path: str_field("filepath").map(PathBuf::from),
            id: str_field("id"),
            title: str_field("title"),
            webpage_url: str_field("webpage_url"),
            elapsed: Duration::ZERO,
        })
    }

    /// Condensed failure text: ERROR lines, else the last non-empty lines
    fn failure_text(stderr: &str) -> String {
        let errors: Vec<&str> = stderr
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("ERROR:"))
            .collect();
        if !errors.is_empty() {
            return errors.join(" | ");
        }
        let tail: Vec<&str> = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .rev()
            .take(3)
            .collect();
        if tail.is_empty() {
            "yt-dlp failed without output".to_string()
        } else {
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        }
    }

    /// Run one extraction, forwarding progress from both pipes as it arrives
    async fn run_streaming(
        &self,
        args: Vec<String>,
        progress: &dyn ProgressSink,
    ) -> Result<(std::process::ExitStatus, Option<ExtractionOutput>, String), DownloadError> {
        let mut child = TokioCommand::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DownloadError::ToolNotFound(self.program.clone()),
                _ => DownloadError::ExecutionError(format!("Failed to start {}: {}", self.program, e)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stderr".to_string()))?;

        let started = Instant::now();
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_done, mut err_done) = (false, false);
        let mut result = None;
        let mut stderr_text = String::new();

        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line {
                    Ok(Some(line)) => {
                        if let Some(p) = Self::parse_progress_line(&line, started.elapsed()) {
                            progress.update(&p);
                        } else if let Some(r) = Self::parse_result_line(&line) {
                            result = Some(r);
                        }
                    }
                    _ => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line {
                    Ok(Some(line)) => {
                        if let Some(p) = Self::parse_progress_line(&line, started.elapsed()) {
                            progress.update(&p);
                        } else {
                            tracing::trace!(target: "yt-dlp", "{}", line);
                            stderr_text.push_str(&line);
                            stderr_text.push('\n');
                        }
                    }
                    _ => err_done = true,
                },
            }
        }

        let status = child.wait().await?;
        if let Some(r) = result.as_mut() {
            r.elapsed = started.elapsed();
        }
        Ok((status, result, stderr_text))
    }
}

impl Default for YtDlpBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str, cookie_file: Option<&Path>) -> ProbeResult {
        let args = self.probe_args(url, cookie_file);
        tracing::debug!(url, "probing with {}", self.program);

        match run_output_with_timeout(&self.program, args, self.probe_timeout_secs).await {
            Ok(out) if out.status.success() => match Self::parse_descriptor(&out.stdout) {
                Ok(descriptor) => {
                    let result = ProbeResult::from_descriptor(descriptor);
                    tracing::debug!(url, supported = result.supported, "probe finished");
                    result
                }
                Err(e) => {
                    tracing::debug!(url, error = %e, "probe output unreadable");
                    ProbeResult::unsupported()
                }
            },
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                tracing::debug!(url, error = %Self::failure_text(&stderr), "probe rejected URL");
                ProbeResult::unsupported()
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "probe could not run");
                ProbeResult::unsupported()
            }
        }
    }

    async fn extract(
        &self,
        request: &ExtractionRequest<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<ExtractionOutput, DownloadError> {
        let args = self.build_extract_args(request);
        tracing::debug!(variant = %request.variant, "{} {}", self.program, args.join(" "));

        let timeout = Duration::from_secs(request.options.run_timeout_secs);
        let (status, result, stderr) = tokio::time::timeout(timeout, self.run_streaming(args, progress))
            .await
            .map_err(|_| {
                DownloadError::NetworkTimeout(format!("yt-dlp timed out after {}s", timeout.as_secs()))
            })??;

        if status.success() {
            // A run without the result line still counts; the resolver looks for the file
            return Ok(result.unwrap_or_default());
        }

        let text = Self::failure_text(&stderr);
        let diag = analyze_failure(&stderr);
        tracing::debug!(
            variant = %request.variant,
            patterns = ?diag.matched_patterns,
            context = diag.context.as_deref().unwrap_or("-"),
            "yt-dlp failed"
        );
        Err(DownloadError::from(text))
    }

    async fn verbose_trace(&self, url: &str, log_dir: &Path, reason: &str) -> Option<PathBuf> {
        match write_verbose_trace(&self.program, &self.prefix_args, url, log_dir, reason).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(url, error = %e, "could not write verbose trace");
                None
            }
        }
    }
}
