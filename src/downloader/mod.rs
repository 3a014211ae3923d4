// Downloader module - acquisition pipeline and its collaborators

pub mod classifier;
pub mod container;
pub mod errors;
pub mod escalation;
pub mod extractors;
pub mod format_selector;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod placement;
pub mod resolver;
pub mod scanner;
pub mod summary;
pub mod tools;
pub mod traits;
pub mod utils;

pub use errors::{DownloadError, FailureKind};
pub use models::{DiscoveredLink, MediaClass, MediaDescriptor, ResolvedFile, SummaryEntry};
pub use orchestrator::{BatchReport, MediaDownloader, UrlOutcome};
pub use traits::{ExtractionBackend, FormatChooser, PageScanner, ProgressSink, SummarySink};
