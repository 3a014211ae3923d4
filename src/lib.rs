pub mod cli;
pub mod config;
pub mod downloader;

pub use config::Settings;
pub use downloader::{DownloadError, MediaDownloader, UrlOutcome};
