//! End-to-end crawl pipeline: zone → discovery → upsert → scrape → profile.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use towscout_discovery::{DiscoveryClient, RawListing};
use towscout_scraper::{BatchOutcome, BatchScraper, PageFetcher};
use towscout_shared::{
    Company, CompanyId, EnrichmentSnapshot, Result, SnapshotSource, Stage, StageEvent,
    TowScoutError, ZoneId, next_stage,
};
use towscout_storage::{Storage, StatusCounts};

use crate::profile::{NoopProfileEnricher, ProfileEnricher};

// ---------------------------------------------------------------------------
// Options and stats
// ---------------------------------------------------------------------------

/// Per-crawl options, merged from config defaults and CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlZoneOptions {
    /// Search query sent to the maps actor.
    pub query: String,
    /// Upper bound on listings fetched per search.
    pub max_results: u32,
    /// Discovery-only crawl: upsert listings but skip the website batch.
    pub skip_websites: bool,
    /// Run the profile pass after the website batch.
    pub enrich_profiles: bool,
}

impl Default for CrawlZoneOptions {
    fn default() -> Self {
        Self {
            query: "towing company".into(),
            max_results: 100,
            skip_websites: false,
            enrich_profiles: false,
        }
    }
}

/// Summary of one completed zone crawl.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStats {
    /// Raw listings returned by discovery, before any filtering.
    pub companies_found: usize,
    pub companies_new: usize,
    pub companies_updated: usize,
    pub websites_scraped: usize,
    pub websites_failed: usize,
    pub websites_skipped: usize,
    pub profiles_scraped: usize,
    /// Stage name → count for the companies touched by this crawl.
    pub stage_breakdown: BTreeMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the full enrichment pipeline against one storage handle.
pub struct Orchestrator<D, F, P = NoopProfileEnricher> {
    discovery: D,
    scraper: BatchScraper<F>,
    profile: Option<P>,
}

impl<D, F> Orchestrator<D, F, NoopProfileEnricher> {
    pub fn new(discovery: D, scraper: BatchScraper<F>) -> Self {
        Self {
            discovery,
            scraper,
            profile: None,
        }
    }
}

impl<D, F, P> Orchestrator<D, F, P> {
    /// Attach a profile enrichment source.
    pub fn with_profile_enricher<Q>(self, enricher: Q) -> Orchestrator<D, F, Q> {
        Orchestrator {
            discovery: self.discovery,
            scraper: self.scraper,
            profile: Some(enricher),
        }
    }
}

impl<D, F, P> Orchestrator<D, F, P>
where
    D: DiscoveryClient,
    F: PageFetcher + 'static,
    P: ProfileEnricher,
{
    /// Crawl one zone end to end.
    ///
    /// Discovery failures abort the crawl; everything downstream degrades
    /// per company. The crawl is recorded in the audit table whether it
    /// completes or not.
    #[instrument(skip_all, fields(zone_id = %zone_id, query = %options.query))]
    pub async fn crawl_zone(
        &self,
        storage: &Storage,
        zone_id: ZoneId,
        options: &CrawlZoneOptions,
    ) -> Result<CrawlStats> {
        let zone = storage
            .get_zone(zone_id)
            .await?
            .ok_or_else(|| TowScoutError::validation(format!("zone not found: {zone_id}")))?;
        if !zone.active {
            return Err(TowScoutError::validation(format!(
                "zone is deactivated: {}",
                zone.name
            )));
        }

        let run_id = storage.insert_crawl_run(zone_id, &options.query).await?;
        info!(zone = %zone.name, "starting zone crawl");

        let listings = match self
            .discovery
            .search(&zone.location_string(), &options.query, options.max_results)
            .await
        {
            Ok(listings) => listings,
            Err(e) => {
                let stats = serde_json::json!({ "error": e.to_string() });
                let _ = storage.finish_crawl_run(&run_id, &stats.to_string()).await;
                return Err(e);
            }
        };

        let mut stats = CrawlStats {
            companies_found: listings.len(),
            ..Default::default()
        };

        // Upsert listings, keyed on the external listing URL.
        let mut touched: Vec<CompanyId> = Vec::new();
        let mut batch: Vec<Company> = Vec::new();
        for listing in &listings {
            if !listing.has_identity() {
                continue;
            }
            let key = listing_key(listing);

            let company = match storage.find_company_by_listing_key(&key).await? {
                Some(mut existing) => {
                    merge_listing(&mut existing, listing);
                    existing.stage = next_stage(existing.stage, StageEvent::DiscoveredExisting);
                    existing.updated_at = Utc::now();
                    storage.save_company(&existing).await?;
                    stats.companies_updated += 1;
                    existing
                }
                None => {
                    let company = company_from_listing(zone_id, &key, listing);
                    storage.insert_company(&company).await?;
                    stats.companies_new += 1;
                    company
                }
            };

            touched.push(company.id);
            batch.push(company);
        }

        // Website batch
        if options.skip_websites {
            stats.websites_skipped = batch.len();
        } else {
            let outcome = self.scraper.scrape_batch(storage, batch).await?;
            stats.websites_scraped = outcome.success;
            stats.websites_failed = outcome.failed;
            stats.websites_skipped = outcome.no_website;
        }

        // Profile pass
        if options.enrich_profiles {
            if let Some(enricher) = &self.profile {
                stats.profiles_scraped = self.run_profile_pass(storage, &touched, enricher).await;
            }
        }

        // Stage breakdown over the companies this crawl touched
        for id in &touched {
            if let Some(company) = storage.get_company(*id).await? {
                *stats
                    .stage_breakdown
                    .entry(company.stage.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }

        let stats_json = serde_json::to_string(&stats)
            .map_err(|e| TowScoutError::parse(format!("crawl stats: {e}")))?;
        storage.finish_crawl_run(&run_id, &stats_json).await?;

        info!(
            found = stats.companies_found,
            new = stats.companies_new,
            updated = stats.companies_updated,
            scraped = stats.websites_scraped,
            failed = stats.websites_failed,
            "zone crawl complete"
        );
        Ok(stats)
    }

    /// Re-scrape companies whose website data is older than `days`.
    #[instrument(skip_all, fields(days, limit))]
    pub async fn refresh_stale(
        &self,
        storage: &Storage,
        zone: Option<ZoneId>,
        days: u32,
        limit: u32,
    ) -> Result<BatchOutcome> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let stale = storage.find_stale_companies(cutoff, zone, limit).await?;
        info!(companies = stale.len(), days, "refreshing stale companies");
        self.scraper.scrape_batch(storage, stale).await
    }

    /// Run the profile pass over companies that finished the website stage.
    async fn run_profile_pass(
        &self,
        storage: &Storage,
        touched: &[CompanyId],
        enricher: &P,
    ) -> usize {
        let mut enriched = 0;
        for id in touched {
            let Ok(Some(mut company)) = storage.get_company(*id).await else {
                continue;
            };
            if company.stage != Stage::WebsiteScraped || company.profile_url.is_none() {
                continue;
            }

            match enricher.enrich(&company).await {
                Ok(payload) => {
                    let snapshot = EnrichmentSnapshot {
                        id: Uuid::now_v7(),
                        company_id: company.id,
                        payload,
                        source: SnapshotSource::Profile,
                        created_at: Utc::now(),
                    };
                    company.stage = next_stage(company.stage, StageEvent::ProfileScrapeOk);
                    company.updated_at = Utc::now();

                    if let Err(e) = storage.save_company(&company).await {
                        warn!(company = %company.name, error = %e,
                            "failed to persist profile result");
                        continue;
                    }
                    if let Err(e) = storage.insert_snapshot(&snapshot).await {
                        warn!(company = %company.name, error = %e,
                            "failed to record profile snapshot");
                    }
                    enriched += 1;
                }
                Err(e) => {
                    warn!(company = %company.name, error = %e, "profile enrichment failed");
                }
            }
        }
        enriched
    }
}

/// Aggregate status counts, optionally scoped to one zone.
pub async fn get_status(storage: &Storage, zone: Option<ZoneId>) -> Result<StatusCounts> {
    storage.status_counts(zone).await
}

// ---------------------------------------------------------------------------
// Listing → company mapping
// ---------------------------------------------------------------------------

/// Stable unique key for a listing. Listings without a maps URL fall back to
/// a normalized-name key so re-crawls still dedupe them.
fn listing_key(listing: &RawListing) -> String {
    match &listing.listing_url {
        Some(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => format!("name:{}", listing.title.trim().to_lowercase()),
    }
}

fn company_from_listing(zone_id: ZoneId, key: &str, listing: &RawListing) -> Company {
    let now = Utc::now();
    let address = listing.address_components();
    Company {
        id: CompanyId::new(),
        zone_id,
        name: listing.title.trim().to_string(),
        listing_key: key.to_string(),
        phone: listing.phone.clone(),
        email: None,
        website: listing.website.clone(),
        profile_url: listing.profile_url.clone(),
        address_street: address.street,
        address_city: address.city,
        address_state: address.state,
        address_zip: address.zip,
        rating: listing.rating,
        review_count: listing.reviews_count,
        listing_hours: listing.opening_hours.clone(),
        website_hours: None,
        has_impound: None,
        impound_confidence: None,
        fleet_size: None,
        website_scrape_status: None,
        website_scraped_at: None,
        website_scrape_error: None,
        website_content_hash: None,
        stage: next_stage(Stage::Initial, StageEvent::DiscoveredNew),
        created_at: now,
        updated_at: now,
    }
}

/// Refresh an existing company's listing-sourced fields. Listing data wins
/// when present; enrichment fields (hours, capability, scrape status) are
/// left alone.
fn merge_listing(company: &mut Company, listing: &RawListing) {
    if !listing.title.trim().is_empty() {
        company.name = listing.title.trim().to_string();
    }
    if listing.phone.is_some() {
        company.phone = listing.phone.clone();
    }
    if listing.website.is_some() {
        company.website = listing.website.clone();
    }
    if listing.profile_url.is_some() {
        company.profile_url = listing.profile_url.clone();
    }
    if listing.rating.is_some() {
        company.rating = listing.rating;
    }
    if listing.reviews_count.is_some() {
        company.review_count = listing.reviews_count;
    }
    if listing.opening_hours.is_some() {
        company.listing_hours = listing.opening_hours.clone();
    }

    let address = listing.address_components();
    if address.street.is_some() {
        company.address_street = address.street;
    }
    if address.city.is_some() {
        company.address_city = address.city;
    }
    if address.state.is_some() {
        company.address_state = address.state;
    }
    if address.zip.is_some() {
        company.address_zip = address.zip;
    }
}
