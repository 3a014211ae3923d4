// Failure diagnostics - classifies backend errors and captures debug traces
//
// Analyzes error messages to determine:
// - Whether another client variant is worth trying
// - Whether the transport itself is failing (escalation must stop)
// - Which patterns matched, for the exhaustion report

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::downloader::errors::{DownloadError, FailureKind};
use crate::downloader::utils::{run_output_with_timeout, timestamp_compact};

/// Stream-negotiation failures that a different player client may avoid
const INCOMPATIBILITY_PATTERNS: &[&str] = &[
    "failed to extract any player response",
    "sabr",
    "extraction failed",
    "po token",
    "requested format is not available",
];

/// Socket-level failures; retrying other variants over the same link is pointless
const TRANSPORT_PATTERNS: &[&str] = &[
    "connectionreset",
    "connection reset by peer",
    "connection reset",
    "read timed out",
    "timed out",
    "connection refused",
    "network is unreachable",
];

const CANCEL_PATTERNS: &[&str] = &["keyboardinterrupt", "interrupted by user"];

/// Analyze error message and return how the pipeline should treat it
pub fn diagnose_failure(error: &str) -> FailureKind {
    let lower = error.to_lowercase();

    if CANCEL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::Canceled;
    }

    // Incompatibility first: "extraction failed ... timed out" is still a client problem
    if INCOMPATIBILITY_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::TransientIncompatibility;
    }

    if TRANSPORT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::Transport;
    }

    if lower.contains("did not produce a final file") {
        return FailureKind::NoOutput;
    }

    FailureKind::Other
}

/// Detailed diagnostics information
#[derive(Debug, Clone, Serialize)]
pub struct FailureDiagnostics {
    /// First line that looks like the actual error
    pub context: Option<String>,

    /// Raw error patterns that matched
    pub matched_patterns: Vec<String>,
}

/// Full diagnostic analysis of an error
pub fn analyze_failure(error: &str) -> FailureDiagnostics {
    let lower = error.to_lowercase();

    let matched_patterns = INCOMPATIBILITY_PATTERNS
        .iter()
        .chain(TRANSPORT_PATTERNS)
        .chain(["403", "429", "forbidden", "geo", "private", "unavailable"].iter())
        .filter(|p| lower.contains(*p))
        .map(|p| p.to_string())
        .collect();

    let context = error
        .lines()
        .find(|line| {
            let l = line.trim().to_lowercase();
            l.starts_with("error:") || l.contains("forbidden") || l.contains("unavailable")
        })
        .map(|s| s.trim().to_string());

    FailureDiagnostics {
        context,
        matched_patterns,
    }
}

/// Re-run the backend at full verbosity and keep the combined output for offline debugging.
pub async fn write_verbose_trace(
    program: &str,
    prefix_args: &[String],
    url: &str,
    log_dir: &Path,
    reason: &str,
) -> Result<PathBuf, DownloadError> {
    let logfile = log_dir.join(format!("yt_dlp_verbose_{}.log", timestamp_compact()));
    let mut args = prefix_args.to_vec();
    args.extend([
        "-v".to_string(),
        "-o".to_string(),
        "%(title)s.%(id)s.%(ext)s".to_string(),
        url.to_string(),
    ]);

    tokio::fs::create_dir_all(log_dir).await?;

    let mut contents = format!("# url: {}\n# reason: {}\n\n", url, reason).into_bytes();
    match run_output_with_timeout(program, args, 240).await {
        Ok(output) => {
            contents.extend_from_slice(&output.stdout);
            contents.extend_from_slice(&output.stderr);
        }
        Err(e) => {
            contents.extend_from_slice(format!("verbose run failed: {}\n", e).as_bytes());
        }
    }

    tokio::fs::write(&logfile, contents).await?;
    tracing::debug!(log = %logfile.display(), reason, "wrote verbose backend trace");
    Ok(logfile)
}
