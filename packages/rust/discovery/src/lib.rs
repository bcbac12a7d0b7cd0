//! Maps-listing discovery via the Apify actor API.
//!
//! The pipeline consumes discovery through the [`DiscoveryClient`] trait;
//! [`ApifyMapsClient`] is the production implementation. It starts an actor
//! run for a location + search query, polls until the run finishes, then
//! reads the run's dataset items and maps them into typed [`RawListing`]
//! records at the boundary — untyped JSON never escapes this crate.

mod listing;

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use towscout_shared::{ApifyConfig, Result, TowScoutError};

pub use listing::{Address, RawListing};

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("TowScout/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// DiscoveryClient
// ---------------------------------------------------------------------------

/// Capability interface for maps-listing discovery.
///
/// A failure here is fatal to the crawl that triggered it: without listings
/// there is nothing to enrich.
pub trait DiscoveryClient: Send + Sync {
    /// Search for business listings near `location` matching `query`.
    fn search(
        &self,
        location: &str,
        query: &str,
        max_results: u32,
    ) -> impl Future<Output = Result<Vec<RawListing>>> + Send;
}

// ---------------------------------------------------------------------------
// ApifyMapsClient
// ---------------------------------------------------------------------------

/// Discovery client backed by Apify's Google Maps scraper actor.
pub struct ApifyMapsClient {
    config: ApifyConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    data: RunData,
}

#[derive(Debug, Deserialize)]
struct RunData {
    id: String,
    status: String,
    #[serde(rename = "statusMessage")]
    status_message: Option<String>,
}

impl ApifyMapsClient {
    /// Create a client from the Apify config section and an API token.
    pub fn new(config: ApifyConfig, api_token: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_token}"))
            .map_err(|e| TowScoutError::config(format!("invalid API token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| TowScoutError::Discovery(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Start an actor run and return its id.
    async fn start_run(&self, location: &str, query: &str, max_results: u32) -> Result<String> {
        let url = format!(
            "{}/acts/{}/runs",
            self.config.base_url, self.config.actor_id
        );
        let input = serde_json::json!({
            "searchStringsArray": [format!("{query} {location}")],
            "maxCrawledPlacesPerSearch": max_results,
            "language": "en",
            "includeWebResults": true,
        });

        let response = self
            .client
            .post(&url)
            .json(&input)
            .send()
            .await
            .map_err(|e| TowScoutError::Discovery(format!("actor run start: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TowScoutError::Discovery(format!(
                "actor run start: HTTP {status}"
            )));
        }

        let envelope: RunEnvelope = response
            .json()
            .await
            .map_err(|e| TowScoutError::Discovery(format!("actor run response: {e}")))?;

        debug!(run_id = %envelope.data.id, "actor run started");
        Ok(envelope.data.id)
    }

    /// Poll the run until it succeeds, fails, or the wait budget runs out.
    async fn wait_for_run(&self, run_id: &str) -> Result<()> {
        let url = format!("{}/actor-runs/{run_id}", self.config.base_url);
        let poll_interval = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut elapsed = Duration::ZERO;
        let max_wait = Duration::from_secs(self.config.max_wait_secs);

        loop {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| TowScoutError::Discovery(format!("run status: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TowScoutError::Discovery(format!(
                    "run status: HTTP {status}"
                )));
            }

            let envelope: RunEnvelope = response
                .json()
                .await
                .map_err(|e| TowScoutError::Discovery(format!("run status response: {e}")))?;

            match envelope.data.status.as_str() {
                "SUCCEEDED" => return Ok(()),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    let message = envelope
                        .data
                        .status_message
                        .unwrap_or_else(|| "unknown error".into());
                    return Err(TowScoutError::Discovery(format!(
                        "actor run {}: {message}",
                        envelope.data.status.to_lowercase()
                    )));
                }
                other => {
                    debug!(run_id, status = other, "actor run still in progress");
                }
            }

            if elapsed >= max_wait {
                return Err(TowScoutError::Discovery(format!(
                    "actor run timed out after {}s",
                    max_wait.as_secs()
                )));
            }
            tokio::time::sleep(poll_interval).await;
            elapsed += poll_interval;
        }
    }

    /// Read the run's dataset and map items into typed listings.
    async fn fetch_items(&self, run_id: &str) -> Result<Vec<RawListing>> {
        let url = format!(
            "{}/actor-runs/{run_id}/dataset/items",
            self.config.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TowScoutError::Discovery(format!("dataset read: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TowScoutError::Discovery(format!(
                "dataset read: HTTP {status}"
            )));
        }

        // Items arrive either as a bare array or wrapped in {"items": [...]}.
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TowScoutError::Discovery(format!("dataset response: {e}")))?;

        let items = match body {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map.remove("items") {
                Some(serde_json::Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        let listings: Vec<RawListing> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<RawListing>(item) {
                Ok(listing) => Some(listing),
                Err(e) => {
                    debug!(error = %e, "skipping unmappable dataset item");
                    None
                }
            })
            .collect();

        Ok(listings)
    }
}

impl DiscoveryClient for ApifyMapsClient {
    #[instrument(skip(self))]
    async fn search(
        &self,
        location: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<RawListing>> {
        info!(location, query, max_results, "starting maps discovery");

        let run_id = self.start_run(location, query, max_results).await?;
        self.wait_for_run(&run_id).await?;
        let listings = self.fetch_items(&run_id).await?;

        info!(run_id, listings = listings.len(), "maps discovery complete");
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> ApifyConfig {
        ApifyConfig {
            api_token_env: "APIFY_TOKEN".into(),
            actor_id: "apify/google-maps-scraper".into(),
            base_url: base_url.to_string(),
            poll_interval_secs: 1,
            max_wait_secs: 10,
        }
    }

    async fn mount_run_start(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/acts/apify/google-maps-scraper/runs"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "run-1", "status": "RUNNING" }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn search_happy_path() {
        let server = MockServer::start().await;
        mount_run_start(&server).await;

        Mock::given(method("GET"))
            .and(path("/actor-runs/run-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "run-1", "status": "SUCCEEDED" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/actor-runs/run-1/dataset/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "title": "Ace Towing",
                    "address": "100 Main St, Dallas, TX 75201",
                    "phone": "555-0100",
                    "website": "https://acetowing.example.com",
                    "url": "https://maps.example.com/ace",
                    "rating": 4.6,
                    "reviewsCount": 120,
                    "openingHours": [{"day": "Monday", "hours": "8am-6pm"}]
                },
                {
                    "title": "Budget Tow",
                    "url": "https://maps.example.com/budget"
                }
            ])))
            .mount(&server)
            .await;

        let client = ApifyMapsClient::new(test_config(&server.uri()), "test-token").unwrap();
        let listings = client.search("Dallas, TX", "towing company", 50).await.unwrap();

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].title, "Ace Towing");
        assert_eq!(listings[0].rating, Some(4.6));
        assert_eq!(listings[0].reviews_count, Some(120));
        assert_eq!(
            listings[1].listing_url.as_deref(),
            Some("https://maps.example.com/budget")
        );
    }

    #[tokio::test]
    async fn search_polls_until_succeeded() {
        let server = MockServer::start().await;
        mount_run_start(&server).await;

        // First poll reports RUNNING, second reports SUCCEEDED.
        Mock::given(method("GET"))
            .and(path("/actor-runs/run-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "run-1", "status": "RUNNING" }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/actor-runs/run-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "run-1", "status": "SUCCEEDED" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/actor-runs/run-1/dataset/items"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })),
            )
            .mount(&server)
            .await;

        let client = ApifyMapsClient::new(test_config(&server.uri()), "test-token").unwrap();
        let listings = client.search("Dallas", "towing company", 10).await.unwrap();
        assert!(listings.is_empty());
    }

    #[tokio::test]
    async fn failed_run_is_fatal() {
        let server = MockServer::start().await;
        mount_run_start(&server).await;

        Mock::given(method("GET"))
            .and(path("/actor-runs/run-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "run-1", "status": "FAILED", "statusMessage": "quota exceeded" }
            })))
            .mount(&server)
            .await;

        let client = ApifyMapsClient::new(test_config(&server.uri()), "test-token").unwrap();
        let err = client
            .search("Dallas", "towing company", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, TowScoutError::Discovery(_)));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn transport_error_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/acts/apify/google-maps-scraper/runs"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = ApifyMapsClient::new(test_config(&server.uri()), "bad-token").unwrap();
        let err = client
            .search("Dallas", "towing company", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, TowScoutError::Discovery(_)));
    }

    #[tokio::test]
    async fn unmappable_items_are_skipped() {
        let server = MockServer::start().await;
        mount_run_start(&server).await;

        Mock::given(method("GET"))
            .and(path("/actor-runs/run-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "run-1", "status": "SUCCEEDED" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/actor-runs/run-1/dataset/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "title": "Valid Tow", "url": "https://maps.example.com/valid" },
                "not an object"
            ])))
            .mount(&server)
            .await;

        let client = ApifyMapsClient::new(test_config(&server.uri()), "test-token").unwrap();
        let listings = client.search("Dallas", "towing company", 10).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].title, "Valid Tow");
    }
}
