// Extraction backends - protocol-aware media extraction
//
// - cli: yt-dlp as a subprocess (native binary or `python3 -m yt_dlp`)
// - diagnostics: failure classification and verbose traces for offline debugging

mod cli;
pub mod diagnostics;

pub use cli::YtDlpBackend;
pub use diagnostics::{analyze_failure, diagnose_failure, FailureDiagnostics};
