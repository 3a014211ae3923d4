// Content classification: decides which acquisition path a URL takes
//
// Policy, in order:
// 1. path ends with a known image extension → image
// 2. path ends with a direct video extension (not YouTube) → direct media file
// 3. bounded HEAD request; `image/*` → image, `video/*` / `audio/*` → direct media file
// 4. anything else (including HEAD failures) → probe the backend

use std::time::Duration;

use reqwest::Client;

use super::utils::{has_extension, is_youtube_url, request_headers, DIRECT_VIDEO_EXTS, IMAGE_EXTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    DirectImage,
    DirectMediaFile,
    ProbeBackend,
}

pub struct ContentClassifier {
    client: Client,
    head_timeout: Duration,
}

impl ContentClassifier {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            head_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_head_timeout(mut self, timeout: Duration) -> Self {
        self.head_timeout = timeout;
        self
    }

    /// Decision from the URL text alone; `None` means a network check is needed
    pub fn classify_offline(url: &str) -> Option<Route> {
        if has_extension(url, IMAGE_EXTS) {
            return Some(Route::DirectImage);
        }
        if has_extension(url, DIRECT_VIDEO_EXTS) && !is_youtube_url(url) {
            return Some(Route::DirectMediaFile);
        }
        None
    }

    pub async fn classify(&self, url: &str) -> Route {
        if let Some(route) = Self::classify_offline(url) {
            tracing::debug!(url, ?route, "classified by extension");
            return route;
        }

        match self.head_content_type(url).await {
            Some(ctype) if ctype.starts_with("image/") => Route::DirectImage,
            Some(ctype) if ctype.starts_with("video/") || ctype.starts_with("audio/") => {
                Route::DirectMediaFile
            }
            _ => Route::ProbeBackend,
        }
    }

    async fn head_content_type(&self, url: &str) -> Option<String> {
        let response = self
            .client
            .head(url)
            .headers(request_headers(Some(url)))
            .timeout(self.head_timeout)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let ctype = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)?
                    .to_str()
                    .ok()?
                    .to_lowercase();
                tracing::debug!(url, content_type = %ctype, "HEAD classification");
                Some(ctype)
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "HEAD request failed, deferring to backend");
                None
            }
        }
    }
}
