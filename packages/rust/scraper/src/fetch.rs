//! Single-page fetching and visible-text extraction.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::{ElementRef, Html};
use sha2::{Digest, Sha256};
use tracing::debug;

use towscout_shared::{Result, ScrapeConfig, TowScoutError};

/// User-Agent string for scrape requests.
const USER_AGENT: &str = concat!("TowScout/", env!("CARGO_PKG_VERSION"));

/// A fetched company website page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    /// Raw response body.
    pub html: String,
    /// Visible text, one text node per line.
    pub text: String,
    /// SHA-256 of the raw body, for change detection across refreshes.
    pub content_hash: String,
    pub status_code: u16,
    pub fetched_at: DateTime<Utc>,
}

/// Fetch seam for the batch scraper. Tests substitute in-memory fakes.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedPage>> + Send;
}

/// Real HTTP fetcher backed by reqwest.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| TowScoutError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        debug!(%url, "fetching website");

        let parsed = url::Url::parse(url)
            .map_err(|e| TowScoutError::Fetch(format!("{url}: invalid URL: {e}")))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| TowScoutError::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(TowScoutError::Fetch(format!("{url}: HTTP {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| TowScoutError::Fetch(format!("{url}: body read failed: {e}")))?;

        let text = extract_visible_text(&html);
        let content_hash = compute_hash(&html);

        Ok(FetchedPage {
            url: final_url,
            html,
            text,
            content_hash,
            status_code: status.as_u16(),
            fetched_at: Utc::now(),
        })
    }
}

/// Extract the visible text of a document, one text node per line.
///
/// Script, style, noscript, and template subtrees are skipped; everything
/// else contributes its trimmed text nodes. The newline separation matters:
/// the hours extractor treats lines as records.
pub fn extract_visible_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut lines = Vec::new();
    collect_text(doc.root_element(), &mut lines);
    lines.join("\n")
}

fn collect_text(element: ElementRef, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        } else if let Some(child_el) = ElementRef::wrap(child) {
            match child_el.value().name() {
                "script" | "style" | "noscript" | "template" => {}
                _ => collect_text(child_el, out),
            }
        }
    }
}

/// SHA-256 hex digest of the raw body.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_text_skips_scripts_and_styles() {
        let html = r#"<html><head>
            <title>Ace Towing</title>
            <style>body { color: red; }</style>
            <script>analytics.track("load");</script>
        </head><body>
            <h1>Ace Towing</h1>
            <p>24/7 towing and impound services.</p>
            <noscript>Enable JavaScript</noscript>
        </body></html>"#;

        let text = extract_visible_text(html);
        assert!(text.contains("Ace Towing"));
        assert!(text.contains("24/7 towing and impound services."));
        assert!(!text.contains("analytics"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("Enable JavaScript"));
    }

    #[test]
    fn visible_text_is_line_separated() {
        let html = r#"<html><body>
            <div>Monday: 8am - 6pm</div>
            <div>Tuesday: 8am - 6pm</div>
        </body></html>"#;

        let text = extract_visible_text(html);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["Monday: 8am - 6pm", "Tuesday: 8am - 6pm"]);
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let hash = compute_hash("hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(hash, compute_hash("hello world"));
        assert_ne!(hash, compute_hash("hello worlds"));
    }

    #[tokio::test]
    async fn http_fetcher_reads_page() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("<html><body><h1>Ace Towing</h1></body></html>"),
            )
            .mount(&server)
            .await;

        let config = ScrapeConfig {
            concurrency: 2,
            fetch_timeout_secs: 5,
        };
        let fetcher = HttpFetcher::new(&config).expect("build fetcher");
        let page = fetcher.fetch(&server.uri()).await.expect("fetch");

        assert_eq!(page.status_code, 200);
        assert!(page.html.contains("<h1>Ace Towing</h1>"));
        assert!(page.text.contains("Ace Towing"));
        assert_eq!(page.content_hash.len(), 64);
    }

    #[tokio::test]
    async fn http_fetcher_rejects_invalid_url() {
        let config = ScrapeConfig {
            concurrency: 2,
            fetch_timeout_secs: 5,
        };
        let fetcher = HttpFetcher::new(&config).expect("build fetcher");
        let err = fetcher.fetch("not a url").await.expect_err("should fail");
        assert!(err.to_string().contains("invalid URL"));
    }

    #[tokio::test]
    async fn http_fetcher_rejects_error_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = ScrapeConfig {
            concurrency: 2,
            fetch_timeout_secs: 5,
        };
        let fetcher = HttpFetcher::new(&config).expect("build fetcher");
        let err = fetcher.fetch(&server.uri()).await.expect_err("should fail");
        assert!(err.to_string().contains("500"));
    }
}
