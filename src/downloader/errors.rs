// Error types for the acquisition pipeline

use thiserror::Error;

use super::extractors::diagnostics::diagnose_failure;

/// How a failure should steer the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend could not negotiate streams with this client strategy; another variant may work
    TransientIncompatibility,
    /// Connection reset / timeout; escalation stops and transport-level fallback takes over
    Transport,
    /// The backend claimed success but no file could be found
    NoOutput,
    /// Operator interrupt
    Canceled,
    /// Anything else
    Other,
}

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// Player response / SABR / stream negotiation failure
    #[error("Extraction incompatible with this client: {0}")]
    ExtractionIncompatible(String),

    /// Socket or read timeout
    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    /// Connection reset or refused
    #[error("Connection error: {0}")]
    ConnectionReset(String),

    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    /// yt-dlp, ffprobe or curl not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// URL the backend does not understand
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// Failed to parse backend JSON output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Command execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Backend reported success but produced no output file")]
    NoOutputProduced,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Canceled by user")]
    Canceled,

    /// Unknown error with details
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DownloadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ExtractionIncompatible(_) => FailureKind::TransientIncompatibility,
            Self::NetworkTimeout(_) | Self::ConnectionReset(_) => FailureKind::Transport,
            Self::NoOutputProduced => FailureKind::NoOutput,
            Self::Canceled => FailureKind::Canceled,
            _ => FailureKind::Other,
        }
    }
}

// Backend stderr arrives as plain text; classify it by pattern
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        match diagnose_failure(&s) {
            FailureKind::TransientIncompatibility => Self::ExtractionIncompatible(s),
            FailureKind::Transport => {
                let lower = s.to_lowercase();
                if lower.contains("timed out") || lower.contains("timeout") {
                    Self::NetworkTimeout(s)
                } else {
                    Self::ConnectionReset(s)
                }
            }
            FailureKind::Canceled => Self::Canceled,
            FailureKind::NoOutput => Self::NoOutputProduced,
            FailureKind::Other => {
                let lower = s.to_lowercase();
                if lower.contains("command not found") || lower.contains("no such file") {
                    Self::ToolNotFound(s)
                } else if lower.contains("unsupported url") {
                    Self::UnsupportedUrl(s)
                } else if lower.contains("json") {
                    Self::ParseError(s)
                } else {
                    Self::Unknown(s)
                }
            }
        }
    }
}

impl From<&str> for DownloadError {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::TimedOut => Self::NetworkTimeout(e.to_string()),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                Self::ConnectionReset(e.to_string())
            }
            _ => Self::Io(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::NetworkTimeout(e.to_string());
        }
        if let Some(status) = e.status() {
            return Self::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        if e.is_connect() || e.is_body() || e.is_request() {
            return Self::ConnectionReset(e.to_string());
        }
        Self::Unknown(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_response_is_incompatibility() {
        let err = DownloadError::from("ERROR: [youtube] abc: Failed to extract any player response".to_string());
        assert_eq!(err.kind(), FailureKind::TransientIncompatibility);
    }

    #[test]
    fn connection_reset_is_transport() {
        let err = DownloadError::from("ConnectionResetError(104, 'Connection reset by peer')");
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(matches!(err, DownloadError::ConnectionReset(_)));
    }

    #[test]
    fn read_timeout_is_transport() {
        let err = DownloadError::from("HTTPSConnectionPool: Read timed out. (read timeout=30)");
        assert!(matches!(err, DownloadError::NetworkTimeout(_)));
    }

    #[test]
    fn unsupported_url_is_other() {
        let err = DownloadError::from("ERROR: Unsupported URL: https://example.com/page");
        assert_eq!(err.kind(), FailureKind::Other);
        assert!(matches!(err, DownloadError::UnsupportedUrl(_)));
    }

    #[test]
    fn io_timeout_maps_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(DownloadError::from(io).kind(), FailureKind::Transport);
    }
}
