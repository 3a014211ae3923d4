// Orchestrator with fallback logic
//
// Per URL: classify → direct fetch | backend probe → variant escalation → page scan.
// Anything that produced a file goes through normalize → place → report.
// Discovered links get one level of the same treatment, never a second scan.
// Only operator cancellation stops the queue.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::classifier::{ContentClassifier, Route};
use super::container::{ContainerNormalizer, FfprobeProbe};
use super::errors::DownloadError;
use super::escalation::{EscalationJob, EscalationOutcome, VariantEscalation};
use super::extractors::YtDlpBackend;
use super::format_selector::{FormatSelector, DEFAULT_SELECTOR};
use super::http::{DirectStreamDownloader, FetchOutcome, FetchRequest};
use super::models::{
    DiscoveredLink, ExtractionOptions, LinkKind, MediaClass, MediaDescriptor, ResolvedFile,
};
use super::placement::place;
use super::scanner::HtmlPageScanner;
use super::summary::{
    ConsoleSink, ElapsedTable, JsonlSink, ReportedSet, SummaryReporter, TextSink,
};
use super::tools::{ToolManager, ToolType};
use super::traits::{
    ConsoleProgress, ContainerProbe, ExtractionBackend, FormatChooser, PageScanner, ProgressSink,
    SilentProgress, SummarySink,
};
use super::utils::{has_extension, origin_of, random_user_agent};
use crate::config::Settings;

/// Direct-stream extensions for links found on a page
const DISCOVERED_DIRECT_EXTS: &[&str] = &[".mp4", ".webm", ".mkv", ".mov", ".ts"];
const PLAYLIST_EXTS: &[&str] = &[".m3u8"];

const DIRECT_RETRIES: u32 = 3;
const DISCOVERED_RETRIES: u32 = 2;

/// What happened to one input URL
#[derive(Debug)]
pub enum UrlOutcome {
    /// Final paths of every file this URL produced
    Saved(Vec<PathBuf>),
    /// Page scan found no media links
    NothingFound,
    Failed(DownloadError),
    Canceled,
}

impl UrlOutcome {
    pub fn saved(&self) -> &[PathBuf] {
        match self {
            Self::Saved(paths) => paths,
            _ => &[],
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub saved: Vec<PathBuf>,
    pub nothing_found: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub canceled: bool,
}

/// Sequential acquisition pipeline over one backend
pub struct MediaDownloader {
    settings: Settings,
    backend: Arc<dyn ExtractionBackend>,
    scanner: Arc<dyn PageScanner>,
    classifier: ContentClassifier,
    direct: DirectStreamDownloader,
    escalation: VariantEscalation,
    normalizer: ContainerNormalizer,
    reporter: SummaryReporter,
    chooser: Option<Arc<dyn FormatChooser>>,
    progress: Arc<dyn ProgressSink>,
    base_options: ExtractionOptions,
    reported: ReportedSet,
    elapsed: ElapsedTable,
    cancel: CancellationToken,
}

impl MediaDownloader {
    /// Silent pipeline; sinks, chooser and progress are added with `with_*`
    pub fn new(
        settings: Settings,
        backend: Arc<dyn ExtractionBackend>,
        scanner: Arc<dyn PageScanner>,
        client: Client,
    ) -> Self {
        Self {
            settings,
            backend,
            scanner,
            classifier: ContentClassifier::new(client.clone()),
            direct: DirectStreamDownloader::new(client),
            escalation: VariantEscalation::default(),
            normalizer: ContainerNormalizer::new(),
            reporter: SummaryReporter::silent(),
            chooser: None,
            progress: Arc::new(SilentProgress),
            base_options: ExtractionOptions::default(),
            reported: ReportedSet::new(),
            elapsed: ElapsedTable::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Production wiring: yt-dlp, HTML scanner, console progress, JSONL + text + console summaries
    pub fn standard(settings: Settings, backend: YtDlpBackend) -> Result<Self, DownloadError> {
        let client = Client::builder().build()?;

        let probe: Option<Arc<dyn ContainerProbe>> = ToolManager::new()
            .locate(ToolType::Ffprobe)
            .map(|_| Arc::new(FfprobeProbe::new()) as Arc<dyn ContainerProbe>);
        if probe.is_none() {
            tracing::info!("ffprobe not found; media details in summaries will be unknown");
        }
        let sinks: Vec<Box<dyn SummarySink>> = vec![
            Box::new(JsonlSink::new(&settings.summary_jsonl)),
            Box::new(TextSink::new(&settings.summary_txt)),
            Box::new(ConsoleSink),
        ];

        Ok(Self::new(
            settings,
            Arc::new(backend),
            Arc::new(HtmlPageScanner::new(client.clone())),
            client,
        )
        .with_reporter(SummaryReporter::new(sinks, probe))
        .with_progress(Arc::new(ConsoleProgress::new())))
    }

    pub fn with_reporter(mut self, reporter: SummaryReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_chooser(mut self, chooser: Arc<dyn FormatChooser>) -> Self {
        self.chooser = Some(chooser);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_escalation(mut self, escalation: VariantEscalation) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn with_direct_downloader(mut self, direct: DirectStreamDownloader) -> Self {
        self.direct = direct;
        self
    }

    pub fn with_classifier(mut self, classifier: ContentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_extraction_options(mut self, options: ExtractionOptions) -> Self {
        self.base_options = options;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn reported(&self) -> &ReportedSet {
        &self.reported
    }

    /// Process URLs one after another; a cancel stops the rest of the queue
    pub async fn run_queue(&self, urls: &[String], batch_mode: bool) -> BatchReport {
        let mut report = BatchReport::default();
        if let Err(e) = self.settings.ensure_dirs() {
            tracing::warn!(error = %e, "could not create output directories");
        }

        for (idx, url) in urls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.canceled = true;
                break;
            }
            println!("\n[{}/{}] Processing: {}\n", idx + 1, urls.len(), url);
            report.processed += 1;

            match self.process(url, batch_mode).await {
                UrlOutcome::Saved(paths) => report.saved.extend(paths),
                UrlOutcome::NothingFound => report.nothing_found.push(url.clone()),
                UrlOutcome::Failed(e) => {
                    tracing::error!(url = url.as_str(), error = %e, "giving up on URL");
                    report.failed.push((url.clone(), e.to_string()));
                }
                UrlOutcome::Canceled => {
                    println!("\nCanceled by user.");
                    report.canceled = true;
                    break;
                }
            }
        }
        report
    }

    /// Full pipeline for one input URL
    pub async fn process(&self, url: &str, batch_mode: bool) -> UrlOutcome {
        let url = url.trim();
        if url.is_empty() {
            return UrlOutcome::Failed(DownloadError::UnsupportedUrl("empty URL".to_string()));
        }
        if self.cancel.is_cancelled() {
            return UrlOutcome::Canceled;
        }

        match self.classifier.classify(url).await {
            Route::DirectImage => {
                tracing::info!(url, "direct image");
                return self.fetch_direct(url, MediaClass::Image, false, DIRECT_RETRIES).await;
            }
            Route::DirectMediaFile => {
                tracing::info!(url, "direct media file, streaming");
                match self.fetch_direct(url, MediaClass::Video, false, DIRECT_RETRIES).await {
                    UrlOutcome::Failed(e) => {
                        tracing::warn!(url, error = %e, "direct stream failed, trying the backend");
                    }
                    done => return done,
                }
            }
            Route::ProbeBackend => {}
        }

        let probe = self
            .backend
            .probe(url, self.settings.cookie_file.as_deref())
            .await;
        let Some(descriptor) = probe.descriptor.filter(|_| probe.supported) else {
            tracing::info!(url, backend = self.backend.name(), "not supported by backend, scanning page");
            return self.scan_page(url, batch_mode).await;
        };

        let selector = self.choose_format(&descriptor, batch_mode);
        match self.extract(url, &selector).await {
            EscalationOutcome::Succeeded(file) => {
                let allow_overwrite = self.allow_overwrite(&selector);
                return UrlOutcome::Saved(vec![self.finalize(file, url, allow_overwrite).await]);
            }
            EscalationOutcome::Canceled => return UrlOutcome::Canceled,
            EscalationOutcome::ExhaustedAllVariants {
                attempts,
                last_error,
            } => {
                tracing::warn!(url, attempts, error = %last_error, "all variants failed");
                self.capture_trace(url, &last_error).await;
            }
            EscalationOutcome::AbortedTransportError(e) => {
                tracing::warn!(url, error = %e, "transport error, trying external fetch");
                if let Some(outcome) = self.external_fetch(url).await {
                    return outcome;
                }
            }
        }

        self.scan_page(url, batch_mode).await
    }

    fn allow_overwrite(&self, selector: &str) -> bool {
        self.settings.force_overwrite || FormatSelector::is_custom(selector)
    }

    fn choose_format(&self, descriptor: &MediaDescriptor, batch_mode: bool) -> String {
        if batch_mode || descriptor.formats.is_empty() {
            return DEFAULT_SELECTOR.to_string();
        }
        self.chooser
            .as_ref()
            .and_then(|c| c.choose(descriptor))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SELECTOR.to_string())
    }

    fn options_for(&self, url: &str, allow_overwrite: bool) -> ExtractionOptions {
        let mut options = self.base_options.clone();
        options.allow_overwrite = allow_overwrite;
        options.referer = origin_of(url);
        if options.user_agent.is_empty() {
            options.user_agent = random_user_agent().to_string();
        }
        if options.cookie_file.is_none() {
            options.cookie_file = self.settings.cookie_file.clone();
        }
        options
    }

    async fn extract(&self, url: &str, selector: &str) -> EscalationOutcome {
        let options = self.options_for(url, self.allow_overwrite(selector));
        let job = EscalationJob {
            url,
            format_selector: selector,
            output_dir: &self.settings.videos_dir,
            options: &options,
        };
        self.escalation
            .run(
                self.backend.as_ref(),
                &job,
                self.progress.as_ref(),
                &self.elapsed,
                &self.cancel,
            )
            .await
    }

    async fn capture_trace(&self, url: &str, error: &DownloadError) {
        let reason = error.to_string();
        match self
            .backend
            .verbose_trace(url, &self.settings.diagnostics_dir, &reason)
            .await
        {
            Some(path) => tracing::info!(path = %path.display(), "verbose debug log saved"),
            None => tracing::debug!(url, "no verbose debug log produced"),
        }
    }

    /// `None` means keep falling back
    async fn external_fetch(&self, url: &str) -> Option<UrlOutcome> {
        let allow_overwrite = self.settings.force_overwrite;
        let result = self
            .direct
            .curl_fetch(
                url,
                &self.settings.videos_dir,
                MediaClass::Video,
                allow_overwrite,
                &self.elapsed,
                &self.cancel,
            )
            .await;
        match result.map(FetchOutcome::into_file) {
            Ok(Some(file)) => Some(UrlOutcome::Saved(vec![
                self.finalize(file, url, allow_overwrite).await,
            ])),
            Ok(None) => Some(UrlOutcome::Canceled),
            Err(e) => {
                tracing::debug!(url, error = %e, "external fetch failed");
                None
            }
        }
    }

    async fn scan_page(&self, url: &str, batch_mode: bool) -> UrlOutcome {
        let links = self.scanner.scan(url).await;
        if links.is_empty() {
            println!("No media found on the page.");
            return UrlOutcome::NothingFound;
        }

        let videos = links.iter().filter(|l| l.kind == LinkKind::Video).count();
        tracing::info!(url, videos, images = links.len() - videos, "processing discovered links");

        let mut saved = Vec::new();
        let mut last_error = None;
        for link in &links {
            if self.cancel.is_cancelled() {
                return UrlOutcome::Canceled;
            }
            match self.process_discovered(link, batch_mode).await {
                UrlOutcome::Saved(paths) => saved.extend(paths),
                UrlOutcome::Canceled => return UrlOutcome::Canceled,
                UrlOutcome::NothingFound => {}
                UrlOutcome::Failed(e) => {
                    tracing::warn!(link = link.url.as_str(), error = %e, "discovered link failed");
                    last_error = Some(e);
                }
            }
        }

        match (saved.is_empty(), last_error) {
            (false, _) => UrlOutcome::Saved(saved),
            (true, Some(e)) => UrlOutcome::Failed(e),
            (true, None) => UrlOutcome::NothingFound,
        }
    }

    async fn process_discovered(&self, link: &DiscoveredLink, batch_mode: bool) -> UrlOutcome {
        let url = link.url.as_str();
        if link.kind == LinkKind::Image {
            return self.fetch_direct(url, MediaClass::Image, true, DIRECT_RETRIES).await;
        }

        if has_extension(url, DISCOVERED_DIRECT_EXTS) {
            return self.fetch_direct(url, MediaClass::Video, false, DISCOVERED_RETRIES).await;
        }

        let selector = if has_extension(url, PLAYLIST_EXTS) {
            DEFAULT_SELECTOR.to_string()
        } else {
            let probe = self
                .backend
                .probe(url, self.settings.cookie_file.as_deref())
                .await;
            match probe.descriptor.filter(|_| probe.supported) {
                Some(descriptor) => self.choose_format(&descriptor, batch_mode),
                None => {
                    return self.fetch_direct(url, MediaClass::Video, false, DISCOVERED_RETRIES).await;
                }
            }
        };

        match self.extract(url, &selector).await {
            EscalationOutcome::Succeeded(file) => {
                let allow_overwrite = self.allow_overwrite(&selector);
                UrlOutcome::Saved(vec![self.finalize(file, url, allow_overwrite).await])
            }
            EscalationOutcome::Canceled => UrlOutcome::Canceled,
            EscalationOutcome::ExhaustedAllVariants { attempts, last_error } => {
                tracing::warn!(link = url, attempts, error = %last_error, "all variants failed");
                self.capture_trace(url, &last_error).await;
                UrlOutcome::Failed(last_error)
            }
            EscalationOutcome::AbortedTransportError(e) => UrlOutcome::Failed(e),
        }
    }

    async fn fetch_direct(
        &self,
        url: &str,
        class: MediaClass,
        reuse_existing: bool,
        max_retries: u32,
    ) -> UrlOutcome {
        let allow_overwrite = self.settings.force_overwrite;
        let roots = self.settings.roots();
        let request = FetchRequest {
            url,
            out_dir: roots.root_for(class),
            class,
            reuse_existing,
            allow_overwrite,
            max_retries,
        };
        let result = self
            .direct
            .fetch(&request, self.progress.as_ref(), &self.elapsed, &self.cancel)
            .await;
        match result.map(FetchOutcome::into_file) {
            Ok(Some(file)) => UrlOutcome::Saved(vec![self.finalize(file, url, allow_overwrite).await]),
            Ok(None) => UrlOutcome::Canceled,
            Err(e) => UrlOutcome::Failed(e),
        }
    }

    /// Normalize → place → report; returns the final path
    async fn finalize(&self, mut file: ResolvedFile, source_url: &str, allow_overwrite: bool) -> PathBuf {
        let produced = file.path.clone();
        self.normalizer.normalize(&mut file, allow_overwrite);
        place(&mut file, &self.settings.roots(), allow_overwrite);
        self.elapsed.rekey(&produced, &file.path);

        let elapsed = self.elapsed.get(&file.path);
        self.reporter
            .report(&self.reported, &file.path, Some(source_url), elapsed)
            .await;
        file.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::escalation::EscalationPolicy;
    use crate::downloader::models::{
        ExtractionOutput, ExtractionRequest, FormatVariant, ProbeResult, SummaryEntry,
    };
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Supports everything; writes `<id>.mp4` into the output dir on each extract
    struct WritingBackend {
        supported: bool,
        fail_with: Option<DownloadError>,
        selectors: Mutex<Vec<String>>,
        traces: Mutex<usize>,
    }

    impl WritingBackend {
        fn new(supported: bool, fail_with: Option<DownloadError>) -> Self {
            Self {
                supported,
                fail_with,
                selectors: Mutex::new(Vec::new()),
                traces: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for WritingBackend {
        fn name(&self) -> &'static str {
            "writing"
        }

        async fn probe(&self, _url: &str, _cookie_file: Option<&Path>) -> ProbeResult {
            if !self.supported {
                return ProbeResult::unsupported();
            }
            ProbeResult::from_descriptor(MediaDescriptor {
                id: Some("abc123".to_string()),
                title: Some("Clip".to_string()),
                extractor: Some("Vimeo".to_string()),
                formats: vec![FormatVariant {
                    format_id: "22".to_string(),
                    has_video: true,
                    has_audio: true,
                    label: "720p".to_string(),
                    approx_size: Some(5_000_000),
                    fps: Some(30.0),
                }],
                entry_count: 0,
                webpage_url: None,
            })
        }

        async fn extract(
            &self,
            request: &ExtractionRequest<'_>,
            _progress: &dyn ProgressSink,
        ) -> Result<ExtractionOutput, DownloadError> {
            self.selectors
                .lock()
                .unwrap()
                .push(request.format_selector.to_string());
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            let path = request.output_dir.join("Clip.abc123.mp4");
            std::fs::create_dir_all(request.output_dir).unwrap();
            std::fs::write(&path, vec![7u8; 4096]).unwrap();
            Ok(ExtractionOutput {
                claimed_path: Some(path),
                id: Some("abc123".to_string()),
                ..Default::default()
            })
        }

        async fn verbose_trace(&self, _url: &str, _log_dir: &Path, _reason: &str) -> Option<PathBuf> {
            *self.traces.lock().unwrap() += 1;
            None
        }
    }

    struct NoLinks;

    #[async_trait]
    impl PageScanner for NoLinks {
        async fn scan(&self, _page_url: &str) -> Vec<DiscoveredLink> {
            Vec::new()
        }
    }

    struct FixedLinks(Vec<DiscoveredLink>);

    #[async_trait]
    impl PageScanner for FixedLinks {
        async fn scan(&self, _page_url: &str) -> Vec<DiscoveredLink> {
            self.0.clone()
        }
    }

    struct FixedChooser(&'static str);

    impl FormatChooser for FixedChooser {
        fn choose(&self, _descriptor: &MediaDescriptor) -> Option<String> {
            Some(self.0.to_string())
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

    fn downloader(
        root: &Path,
        backend: Arc<WritingBackend>,
    ) -> (MediaDownloader, Arc<Mutex<Vec<SummaryEntry>>>) {
        downloader_with_scanner(root, backend, Arc::new(NoLinks))
    }

    fn downloader_with_scanner(
        root: &Path,
        backend: Arc<WritingBackend>,
        scanner: Arc<dyn PageScanner>,
    ) -> (MediaDownloader, Arc<Mutex<Vec<SummaryEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let settings = Settings::default()
            .with_videos_dir(root.join("videos"))
            .with_images_dir(root.join("images"))
            .with_diagnostics_dir(root);
        let client = Client::new();
        let dl = MediaDownloader::new(settings, backend, scanner, client.clone())
            .with_direct_downloader(
                DirectStreamDownloader::new(client)
                    .with_backoff_unit(Duration::ZERO)
                    .with_curl_fallback(false),
            )
            .with_reporter(SummaryReporter::new(
                vec![Box::new(Collect(entries.clone()))],
                None,
            ))
            .with_escalation(VariantEscalation::default().with_policy(EscalationPolicy::immediate()));
        (dl, entries)
    }

    // Port 9 is discard; HEAD fails fast and the URL falls through to the backend
    const PAGE_URL: &str = "http://127.0.0.1:9/watch?v=abc123";

    #[tokio::test]
    async fn test_supported_url_is_extracted_and_reported_once() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(WritingBackend::new(true, None));
        let (dl, entries) = downloader(root.path(), backend.clone());

        let outcome = dl.process(PAGE_URL, true).await;
        let saved = outcome.saved().to_vec();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].starts_with(root.path().join("videos")));

        // Same file again: no second entry
        dl.process(PAGE_URL, true).await;
        assert_eq!(entries.lock().unwrap().len(), 1);
        assert_eq!(
            entries.lock().unwrap()[0].source_url.as_deref(),
            Some(PAGE_URL)
        );
    }

    #[tokio::test]
    async fn test_batch_mode_skips_format_choice() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(WritingBackend::new(true, None));
        let (dl, _) = downloader(root.path(), backend.clone());
        let dl = dl.with_chooser(Arc::new(FixedChooser("22")));

        dl.process(PAGE_URL, true).await;
        dl.process(PAGE_URL, false).await;
        assert_eq!(
            *backend.selectors.lock().unwrap(),
            vec![DEFAULT_SELECTOR.to_string(), "22".to_string()]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_captures_trace_then_scans() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(WritingBackend::new(
            true,
            Some(DownloadError::ExtractionIncompatible("Failed to extract any player response".into())),
        ));
        let (dl, entries) = downloader(root.path(), backend.clone());

        let outcome = dl.process(PAGE_URL, true).await;
        assert!(matches!(outcome, UrlOutcome::NothingFound));
        assert_eq!(backend.selectors.lock().unwrap().len(), 7);
        assert_eq!(*backend.traces.lock().unwrap(), 1);
        assert!(entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_discovered_link_captures_trace() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(WritingBackend::new(
            true,
            Some(DownloadError::ExtractionIncompatible("Failed to extract any player response".into())),
        ));
        let scanner = Arc::new(FixedLinks(vec![DiscoveredLink::video(
            "http://127.0.0.1:9/embed/abc123",
        )]));
        let (dl, entries) = downloader_with_scanner(root.path(), backend.clone(), scanner);

        let outcome = dl.process(PAGE_URL, true).await;
        assert!(matches!(
            outcome,
            UrlOutcome::Failed(DownloadError::ExtractionIncompatible(_))
        ));
        // Page URL and embedded link each run all 7 variants and leave one trace
        assert_eq!(backend.selectors.lock().unwrap().len(), 14);
        assert_eq!(*backend.traces.lock().unwrap(), 2);
        assert!(entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_skips_trace_and_scans() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(WritingBackend::new(
            true,
            Some(DownloadError::ConnectionReset("Connection reset by peer".into())),
        ));
        let (dl, entries) = downloader(root.path(), backend.clone());

        let outcome = dl.process(PAGE_URL, true).await;
        assert!(matches!(outcome, UrlOutcome::NothingFound));
        assert_eq!(backend.selectors.lock().unwrap().len(), 1);
        assert_eq!(*backend.traces.lock().unwrap(), 0);
        assert!(entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_media_stream_falls_back_to_backend() {
        let mut server = mockito::Server::new_async().await;
        let head = server
            .mock("HEAD", "/stream")
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .create_async()
            .await;
        let get = server
            .mock("GET", "/stream")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(WritingBackend::new(true, None));
        let (dl, entries) = downloader(root.path(), backend.clone());

        let url = format!("{}/stream", server.url());
        let outcome = dl.process(&url, true).await;

        head.assert_async().await;
        get.assert_async().await;
        let saved = outcome.saved().to_vec();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].ends_with("Clip.abc123.mp4"));
        assert_eq!(backend.selectors.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(root.path().join("videos")).unwrap().count(), 1);
        assert_eq!(entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_without_links_reports_nothing() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(WritingBackend::new(false, None));
        let (dl, entries) = downloader(root.path(), backend.clone());

        let outcome = dl.process(PAGE_URL, true).await;
        assert!(matches!(outcome, UrlOutcome::NothingFound));
        assert!(backend.selectors.lock().unwrap().is_empty());
        assert!(entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_queue() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(WritingBackend::new(true, None));
        let (dl, entries) = downloader(root.path(), backend.clone());
        dl.cancel_token().cancel();

        let report = dl
            .run_queue(&[PAGE_URL.to_string(), PAGE_URL.to_string()], true)
            .await;
        assert!(report.canceled);
        assert_eq!(report.processed, 0);
        assert!(backend.selectors.lock().unwrap().is_empty());
        assert!(entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_format_allows_overwrite() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(WritingBackend::new(true, None));
        let (dl, _) = downloader(root.path(), backend);

        assert!(!dl.allow_overwrite(DEFAULT_SELECTOR));
        assert!(dl.allow_overwrite("137+bestaudio/best"));
        let options = dl.options_for("https://vimeo.com/1", true);
        assert!(options.allow_overwrite);
        assert_eq!(options.referer.as_deref(), Some("https://vimeo.com"));
        assert!(!options.user_agent.is_empty());
    }
}
