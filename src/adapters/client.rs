// Shared HTTP infrastructure for vendor adapters: a pooled client with a
// service User-Agent, bounded retries on 429/5xx, and the PDF discovery
// helper used by adapters whose vendors only publish document pages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Response, StatusCode};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::errors::VendorError;
use crate::pipeline::rate_limit::VendorRateLimiter;
use crate::types::Vendor;

const USER_AGENT: &str = concat!(
    "engagic/",
    env!("CARGO_PKG_VERSION"),
    " (civic agenda indexer; +https://engagic.org)"
);

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Download size cap shared with the text extractor.
pub const MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Pooled HTTP client for one adapter session.
#[derive(Debug, Clone)]
pub struct AdapterClient {
    client: reqwest::Client,
    throttle: Option<(Arc<VendorRateLimiter>, Vendor)>,
}

impl AdapterClient {
    pub fn new(timeout: Duration) -> Result<Self, VendorError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| VendorError::Http {
                url: "<client construction>".into(),
                source: e,
            })?;
        Ok(Self {
            client,
            throttle: None,
        })
    }

    /// Route every request through the shared per-vendor token bucket.
    pub fn with_throttle(mut self, limiter: Arc<VendorRateLimiter>, vendor: Vendor) -> Self {
        self.throttle = Some((limiter, vendor));
        self
    }

    /// GET returning the response body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, VendorError> {
        let response = self.get_with_retry(url).await?;
        response.text().await.map_err(|e| VendorError::Http {
            url: url.to_string(),
            source: e,
        })
    }

    /// GET returning a deserialized JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, VendorError> {
        let response = self.get_with_retry(url).await?;
        let body = response.text().await.map_err(|e| VendorError::Http {
            url: url.to_string(),
            source: e,
        })?;
        serde_json::from_str(&body)
            .map_err(|e| VendorError::Parsing(format!("invalid JSON from {url}: {e}")))
    }

    /// GET returning raw bytes plus the reported content type, enforcing
    /// the download cap. Used by the text extractor.
    pub async fn get_document(&self, url: &str) -> Result<(Vec<u8>, Option<String>), VendorError> {
        let response = self.get_with_retry(url).await?;
        if let Some(length) = response.content_length() {
            if length > MAX_DOWNLOAD_BYTES {
                return Err(VendorError::Parsing(format!(
                    "document at {url} reports {length} bytes, over the cap"
                )));
            }
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await.map_err(|e| VendorError::Http {
            url: url.to_string(),
            source: e,
        })?;
        if bytes.len() as u64 > MAX_DOWNLOAD_BYTES {
            return Err(VendorError::Parsing(format!(
                "document at {url} exceeded the download cap"
            )));
        }
        Ok((bytes.to_vec(), content_type))
    }

    /// One GET with up to MAX_RETRIES additional attempts on 429 and 5xx,
    /// exponential backoff capped at 30s, honouring Retry-After.
    async fn get_with_retry(&self, url: &str) -> Result<Response, VendorError> {
        let mut attempt = 0u32;
        loop {
            if let Some((limiter, vendor)) = &self.throttle {
                limiter.acquire(*vendor).await;
            }
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if !is_retryable_status(status) {
                        return Err(VendorError::HttpStatus {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                    let retry_after = parse_retry_after(&response);
                    if let (Some((limiter, vendor)), Some(delay)) = (&self.throttle, retry_after) {
                        limiter.penalize(*vendor, delay).await;
                    }
                    if attempt >= MAX_RETRIES {
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            return Err(VendorError::RateLimited { retry_after });
                        }
                        return Err(VendorError::HttpStatus {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                    let delay = retry_after.unwrap_or_else(|| backoff_delay(attempt));
                    debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying vendor request");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect();
                    if !transient || attempt >= MAX_RETRIES {
                        return Err(VendorError::Http {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    let delay = backoff_delay(attempt);
                    debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying vendor request");
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }

    /// Walk an HTML page to `depth` levels collecting PDF-style links
    /// (`.pdf`, `View.ashx`, agenda viewer endpoints). Only same-host pages
    /// are followed, and each page is visited once.
    pub async fn discover_pdf_links(
        &self,
        page_url: &str,
        depth: u32,
    ) -> Result<Vec<String>, VendorError> {
        let base = Url::parse(page_url)
            .map_err(|e| VendorError::Parsing(format!("bad url {page_url}: {e}")))?;
        let mut found: Vec<String> = Vec::new();
        let mut seen_pages: HashSet<String> = HashSet::new();
        let mut frontier = vec![page_url.to_string()];

        for _ in 0..depth.max(1) {
            let mut next_frontier = Vec::new();
            for page in frontier {
                if !seen_pages.insert(page.clone()) {
                    continue;
                }
                let html = match self.get_text(&page).await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!(url = %page, error = %e, "skipping unreachable page during PDF discovery");
                        continue;
                    }
                };
                let (pdfs, pages) = scan_links(&html, &base);
                for pdf in pdfs {
                    if !found.contains(&pdf) {
                        found.push(pdf);
                    }
                }
                next_frontier.extend(pages);
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }
        Ok(found)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(BACKOFF_CAP)
}

/// Split a page's anchors into PDF-style document links and same-host
/// candidate pages for the next discovery level.
fn scan_links(html: &str, base: &Url) -> (Vec<String>, Vec<String>) {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("static selector");
    let mut pdfs = Vec::new();
    let mut pages = Vec::new();
    for element in document.select(&anchors) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let resolved = resolved.to_string();
        if looks_like_pdf_link(&resolved) {
            pdfs.push(resolved);
        } else if is_same_host(base, &resolved) && looks_like_document_page(&resolved) {
            pages.push(resolved);
        }
    }
    (pdfs, pages)
}

/// Heuristic for links that serve a PDF document directly.
pub fn looks_like_pdf_link(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    path.ends_with(".pdf")
        || lower.contains("view.ashx")
        || lower.contains("displayagendapdf")
        || lower.contains("showdocument.aspx")
        || lower.contains("compiledocument")
        || lower.contains("filestream")
}

fn is_same_host(base: &Url, candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => url.host_str() == base.host_str(),
        Err(_) => false,
    }
}

fn looks_like_document_page(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("agenda") || lower.contains("packet") || lower.contains("meeting")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn pdf_link_heuristic_covers_vendor_shapes() {
        assert!(looks_like_pdf_link("https://x.gov/files/agenda.pdf"));
        assert!(looks_like_pdf_link("https://x.gov/Agenda.PDF?x=1"));
        assert!(looks_like_pdf_link("https://x.novusagenda.com/agendapublic/DisplayAgendaPDF.ashx?MeetingID=9"));
        assert!(looks_like_pdf_link("https://x.civicclerk.com/v1/Meetings/GetMeetingFileStream(fileId=1)"));
        assert!(!looks_like_pdf_link("https://x.gov/AgendaCenter"));
    }

    #[test]
    fn scan_links_separates_documents_from_pages() {
        let html = r##"
            <html><body>
              <a href="/files/packet.pdf">Packet</a>
              <a href="/AgendaCenter/ViewFile/Agenda/_07222025-123">Agenda</a>
              <a href="https://elsewhere.example.net/agenda">Off-host</a>
              <a href="/contact-us">Contact</a>
            </body></html>
        "##;
        let base = Url::parse("https://www.city.gov/AgendaCenter").unwrap();
        let (pdfs, pages) = scan_links(html, &base);
        assert_eq!(pdfs, vec!["https://www.city.gov/files/packet.pdf"]);
        assert_eq!(
            pages,
            vec!["https://www.city.gov/AgendaCenter/ViewFile/Agenda/_07222025-123"]
        );
    }
}
