// HTML page scanner: embedded video and image URLs from a page the backend cannot handle

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use super::models::{dedup_links, DiscoveredLink};
use super::traits::PageScanner;
use super::utils::{has_extension, request_headers, IMAGE_EXTS, VIDEO_EXTS};

lazy_static::lazy_static! {
    static ref VIDEO_SEL: Selector = Selector::parse("video").unwrap();
    static ref SOURCE_SEL: Selector = Selector::parse("source[src]").unwrap();
    static ref ANCHOR_SEL: Selector = Selector::parse("a[href]").unwrap();
    static ref IMG_SEL: Selector = Selector::parse("img").unwrap();
    static ref OG_IMAGE_SEL: Selector = Selector::parse(r#"meta[property="og:image"]"#).unwrap();
    static ref JSON_LD_SEL: Selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    // Media extension followed by end of string or a query
    static ref VIDEO_HREF_RE: Regex = Regex::new(r"(?i)\.(?:mp4|webm|m3u8|mkv|mov)(?:$|\?)").unwrap();
    static ref RAW_VIDEO_RE: Regex =
        Regex::new(r#"(?i)https?://[^\s"'<>]+\.(?:mp4|m3u8|webm|mkv|mov)"#).unwrap();
}

pub struct HtmlPageScanner {
    client: Client,
    timeout: Duration,
}

impl HtmlPageScanner {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(12),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_html(&self, page_url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(page_url)
            .headers(request_headers(Some(page_url)))
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl PageScanner for HtmlPageScanner {
    async fn scan(&self, page_url: &str) -> Vec<DiscoveredLink> {
        match self.fetch_html(page_url).await {
            Ok(html) => {
                let links = extract_links(page_url, &html);
                tracing::info!(page_url, found = links.len(), "page scan finished");
                links
            }
            Err(e) => {
                tracing::debug!(page_url, error = %e, "page scan failed");
                Vec::new()
            }
        }
    }
}

/// Videos first, then images; each list de-duplicated in insertion order
pub fn extract_links(page_url: &str, html: &str) -> Vec<DiscoveredLink> {
    let base = Url::parse(page_url).ok();
    let resolve = |raw: &str| -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with("data:") || raw.starts_with("javascript:") {
            return None;
        }
        match &base {
            Some(base) => base.join(raw).ok().map(|u| u.to_string()),
            None => Url::parse(raw).ok().map(|u| u.to_string()),
        }
    };

    let document = Html::parse_document(html);
    let mut videos = Vec::new();
    let mut images = Vec::new();

    for video in document.select(&VIDEO_SEL) {
        if let Some(src) = video.value().attr("src").and_then(resolve) {
            videos.push(src);
        }
        for source in video.select(&SOURCE_SEL) {
            if let Some(src) = source.value().attr("src").and_then(resolve) {
                videos.push(src);
            }
        }
    }

    for anchor in document.select(&ANCHOR_SEL) {
        let Some(href) = anchor.value().attr("href").and_then(resolve) else {
            continue;
        };
        if has_extension(&href, VIDEO_EXTS) || VIDEO_HREF_RE.is_match(&href) {
            videos.push(href.clone());
        }
        if has_extension(&href, IMAGE_EXTS) {
            images.push(href);
        }
    }

    for img in document.select(&IMG_SEL) {
        let attrs = img.value();
        let src = attrs
            .attr("src")
            .or_else(|| attrs.attr("data-src"))
            .or_else(|| attrs.attr("data-lazy-src"));
        if let Some(src) = src.and_then(resolve) {
            images.push(src);
        }
        if let Some(srcset) = attrs.attr("srcset") {
            images.extend(
                srcset
                    .split(',')
                    .filter_map(|candidate| candidate.split_whitespace().next())
                    .filter_map(resolve),
            );
        }
    }

    for meta in document.select(&OG_IMAGE_SEL) {
        if let Some(content) = meta.value().attr("content").and_then(resolve) {
            images.push(content);
        }
    }

    for script in document.select(&JSON_LD_SEL) {
        let text: String = script.text().collect();
        let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) else {
            continue;
        };
        match &json["image"] {
            serde_json::Value::String(s) => images.extend(resolve(s.as_str())),
            serde_json::Value::Array(items) => {
                images.extend(items.iter().filter_map(|i| i.as_str()).filter_map(resolve))
            }
            _ => {}
        }
    }

    videos.extend(RAW_VIDEO_RE.find_iter(html).map(|m| m.as_str().to_string()));

    let mut links: Vec<DiscoveredLink> = videos.into_iter().map(DiscoveredLink::video).collect();
    links.extend(images.into_iter().map(DiscoveredLink::image));
    dedup_links(links)
}
