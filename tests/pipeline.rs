// End-to-end runs of MediaDownloader against a local HTTP server and a scripted backend

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use media_grabber::downloader::escalation::{EscalationPolicy, VariantEscalation};
use media_grabber::downloader::http::DirectStreamDownloader;
use media_grabber::downloader::models::{
    ExtractionOutput, ExtractionRequest, ProbeResult, SummaryEntry, TransferProgress,
};
use media_grabber::downloader::scanner::HtmlPageScanner;
use media_grabber::downloader::summary::SummaryReporter;
use media_grabber::downloader::{DownloadError, ExtractionBackend, ProgressSink, SummarySink};
use media_grabber::{MediaDownloader, Settings, UrlOutcome};

/// Backend that knows nothing; counts how often it was asked
#[derive(Default)]
struct UnsupportedBackend {
    probes: AtomicUsize,
    extracts: AtomicUsize,
}

#[async_trait]
impl ExtractionBackend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    async fn probe(&self, _url: &str, _cookie_file: Option<&Path>) -> ProbeResult {
        self.probes.fetch_add(1, Ordering::SeqCst);
        ProbeResult::unsupported()
    }

    async fn extract(
        &self,
        _request: &ExtractionRequest<'_>,
        _progress: &dyn ProgressSink,
    ) -> Result<ExtractionOutput, DownloadError> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        Err(DownloadError::UnsupportedUrl("scripted".to_string()))
    }

    async fn verbose_trace(&self, _url: &str, _log_dir: &Path, _reason: &str) -> Option<PathBuf> {
        None
    }
}

struct Collect(Arc<Mutex<Vec<SummaryEntry>>>);

impl SummarySink for Collect {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn append(&self, entry: &SummaryEntry) -> Result<(), DownloadError> {
        self.0.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

struct CancelOnProgress(CancellationToken);

impl ProgressSink for CancelOnProgress {
    fn update(&self, _progress: &TransferProgress) {
        self.0.cancel();
    }
}

struct Harness {
    _root: tempfile::TempDir,
    videos: PathBuf,
    images: PathBuf,
    backend: Arc<UnsupportedBackend>,
    entries: Arc<Mutex<Vec<SummaryEntry>>>,
    downloader: MediaDownloader,
}

fn harness() -> Harness {
    let root = tempfile::tempdir().unwrap();
    let videos = root.path().join("videos");
    let images = root.path().join("images");
    let settings = Settings::default()
        .with_videos_dir(&videos)
        .with_images_dir(&images)
        .with_diagnostics_dir(root.path());
    settings.ensure_dirs().unwrap();

    let client = Client::new();
    let backend = Arc::new(UnsupportedBackend::default());
    let entries = Arc::new(Mutex::new(Vec::new()));
    let downloader = MediaDownloader::new(
        settings,
        backend.clone(),
        Arc::new(HtmlPageScanner::new(client.clone())),
        client.clone(),
    )
    .with_direct_downloader(
        DirectStreamDownloader::new(client.clone())
            .with_backoff_unit(Duration::ZERO)
            .with_read_timeout(Duration::from_secs(10))
            .with_curl_fallback(false),
    )
    .with_reporter(SummaryReporter::new(vec![Box::new(Collect(entries.clone()))], None))
    .with_escalation(VariantEscalation::default().with_policy(EscalationPolicy::immediate()));

    Harness {
        videos: videos.canonicalize().unwrap(),
        images: images.canonicalize().unwrap(),
        _root: root,
        backend,
        entries,
        downloader,
    }
}

#[tokio::test]
async fn direct_image_lands_in_images_root() {
    let mut server = mockito::Server::new_async().await;
    let body = vec![0xAB_u8; 12_345];
    let _m = server
        .mock("GET", "/pics/cat.jpg")
        .with_status(200)
        .with_header("content-type", "image/jpeg")
        .with_body(body.clone())
        .create_async()
        .await;

    let h = harness();
    let outcome = h
        .downloader
        .process(&format!("{}/pics/cat.jpg", server.url()), true)
        .await;

    let saved = outcome.saved().to_vec();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].canonicalize().unwrap().starts_with(&h.images));

    let entries = h.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].size_bytes, body.len() as u64);
    assert!(entries[0].path.ends_with("cat.jpg"));
    assert_eq!(h.backend.probes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsupported_page_downloads_every_discovered_link() {
    let mut server = mockito::Server::new_async().await;
    let page = r#"<html><body>
        <video src="/media/one.mp4"></video>
        <a href="/media/two.webm">second clip</a>
        <img src="/media/poster.png">
    </body></html>"#;
    let _page = server
        .mock("GET", "/gallery")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page)
        .create_async()
        .await;
    let _one = server
        .mock("GET", "/media/one.mp4")
        .with_status(200)
        .with_body(vec![1u8; 2048])
        .create_async()
        .await;
    let _two = server
        .mock("GET", "/media/two.webm")
        .with_status(200)
        .with_body(vec![2u8; 4096])
        .create_async()
        .await;
    let _png = server
        .mock("GET", "/media/poster.png")
        .with_status(200)
        .with_body(vec![3u8; 512])
        .create_async()
        .await;

    let h = harness();
    let outcome = h
        .downloader
        .process(&format!("{}/gallery", server.url()), true)
        .await;

    assert_eq!(outcome.saved().len(), 3);
    assert_eq!(h.backend.probes.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.extracts.load(Ordering::SeqCst), 0);

    let entries = h.entries.lock().unwrap();
    assert_eq!(entries.len(), 3);
    let in_videos = entries
        .iter()
        .filter(|e| Path::new(&e.path).starts_with(&h.videos))
        .count();
    let in_images = entries
        .iter()
        .filter(|e| Path::new(&e.path).starts_with(&h.images))
        .count();
    assert_eq!((in_videos, in_images), (2, 1));
}

#[tokio::test]
async fn page_without_media_reports_nothing_found() {
    let mut server = mockito::Server::new_async().await;
    let _page = server
        .mock("GET", "/empty")
        .with_status(200)
        .with_body("<html><body><p>just text</p></body></html>")
        .create_async()
        .await;

    let h = harness();
    let outcome = h
        .downloader
        .process(&format!("{}/empty", server.url()), true)
        .await;

    assert!(matches!(outcome, UrlOutcome::NothingFound));
    assert!(h.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancel_mid_stream_leaves_nothing_behind() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/movie.mp4")
        .with_status(200)
        .with_chunked_body(|w| {
            for _ in 0..64 {
                std::io::Write::write_all(w, &[9u8; 64 * 1024])?;
            }
            Ok(())
        })
        .create_async()
        .await;

    let h = harness();
    let cancel = h.downloader.cancel_token();
    let downloader = h
        .downloader
        .with_progress(Arc::new(CancelOnProgress(cancel.clone())));

    let urls = vec![
        format!("{}/movie.mp4", server.url()),
        format!("{}/never.jpg", server.url()),
    ];
    let report = downloader.run_queue(&urls, true).await;

    assert!(report.canceled);
    assert_eq!(report.processed, 1);
    assert!(report.saved.is_empty());
    assert_eq!(std::fs::read_dir(&h.videos).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(&h.images).unwrap().count(), 0);
    assert!(h.entries.lock().unwrap().is_empty());
}
