//! Concurrency-bounded batch scrape over a set of companies.
//!
//! Fetch and classification run in spawned tasks gated by a semaphore.
//! Persistence and stage transitions happen in the collection loop, so each
//! company row has exactly one writer and a poisoned task cannot leave a row
//! half-updated.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use towscout_classifier::{Capability, OperatingHours, detect_capability, extract_hours,
    fleet_size_from_reviews};
use towscout_shared::{
    Company, EnrichmentSnapshot, Result, ScrapeConfig, ScrapeStatus, SnapshotSource, StageEvent,
    next_stage,
};
use towscout_storage::Storage;

use crate::fetch::PageFetcher;

/// Counters for a completed batch scrape.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Companies whose website was fetched and classified.
    pub success: usize,
    /// Companies whose fetch or persistence failed.
    pub failed: usize,
    /// Companies skipped because they carry no scrapable website.
    pub no_website: usize,
    /// Failure detail (company name, error message).
    pub errors: Vec<(String, String)>,
}

impl BatchOutcome {
    /// Total companies considered by the batch.
    pub fn total(&self) -> usize {
        self.success + self.failed + self.no_website
    }
}

/// Everything a scrape task learned about one website.
#[derive(Debug, Clone)]
struct ScrapeReport {
    final_url: String,
    status_code: u16,
    content_hash: String,
    capability: Capability,
    hours: Option<OperatingHours>,
    text_len: usize,
}

/// Batch website scraper.
pub struct BatchScraper<F> {
    fetcher: Arc<F>,
    concurrency: usize,
}

impl<F: PageFetcher + 'static> BatchScraper<F> {
    pub fn new(fetcher: F, config: &ScrapeConfig) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            concurrency: config.concurrency.max(1) as usize,
        }
    }

    /// Scrape every company's website, classify, and persist the results.
    ///
    /// Companies without a scrapable website are marked `no_website` without
    /// consuming a concurrency permit. A failed fetch marks only that company
    /// failed; the rest of the batch proceeds. Storage write failures are
    /// logged and counted as failures rather than aborting the batch.
    #[instrument(skip_all, fields(companies = companies.len(), concurrency = self.concurrency))]
    pub async fn scrape_batch(
        &self,
        storage: &Storage,
        companies: Vec<Company>,
    ) -> Result<BatchOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut outcome = BatchOutcome::default();
        let mut handles = Vec::new();

        info!(companies = companies.len(), "starting batch scrape");

        for mut company in companies {
            if !company.has_scrapable_website() {
                company.website_scrape_status = Some(ScrapeStatus::NoWebsite);
                company.stage = next_stage(company.stage, StageEvent::NoWebsite);
                company.updated_at = Utc::now();
                match storage.save_company(&company).await {
                    Ok(()) => outcome.no_website += 1,
                    Err(e) => {
                        warn!(company = %company.name, error = %e, "failed to persist company");
                        outcome.errors.push((company.name.clone(), e.to_string()));
                        outcome.failed += 1;
                    }
                }
                continue;
            }

            let fetcher = self.fetcher.clone();
            let sem = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                let url = company.website.clone().unwrap_or_default();
                let report = scrape_one(fetcher.as_ref(), &url).await;
                (company, report)
            }));
        }

        for handle in handles {
            let (mut company, report) = match handle.await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "scrape task panicked");
                    outcome.errors.push(("task".into(), e.to_string()));
                    outcome.failed += 1;
                    continue;
                }
            };

            match report {
                Ok(report) => {
                    apply_success(&mut company, &report);
                    let snapshot = success_snapshot(&company, &report);

                    match storage.save_company(&company).await {
                        Ok(()) => {
                            if let Err(e) = storage.insert_snapshot(&snapshot).await {
                                warn!(company = %company.name, error = %e,
                                    "failed to record enrichment snapshot");
                            }
                            outcome.success += 1;
                        }
                        Err(e) => {
                            warn!(company = %company.name, error = %e,
                                "failed to persist scrape result");
                            outcome.errors.push((company.name.clone(), e.to_string()));
                            outcome.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    apply_failure(&mut company, &e.to_string());
                    if let Err(save_err) = storage.save_company(&company).await {
                        warn!(company = %company.name, error = %save_err,
                            "failed to persist scrape failure");
                        outcome.errors.push((company.name.clone(), save_err.to_string()));
                    } else {
                        outcome.errors.push((company.name.clone(), e.to_string()));
                    }
                    outcome.failed += 1;
                }
            }
        }

        info!(
            success = outcome.success,
            failed = outcome.failed,
            no_website = outcome.no_website,
            "batch scrape completed"
        );

        Ok(outcome)
    }
}

/// Fetch one website and run the classifier over it. Pure with respect to
/// storage; all writes happen in the caller.
async fn scrape_one<F: PageFetcher>(fetcher: &F, url: &str) -> Result<ScrapeReport> {
    let page = fetcher.fetch(url).await?;
    let capability = detect_capability(&page.html, &page.text);
    let hours = extract_hours(&page.text);

    Ok(ScrapeReport {
        final_url: page.url,
        status_code: page.status_code,
        content_hash: page.content_hash,
        capability,
        hours,
        text_len: page.text.len(),
    })
}

fn apply_success(company: &mut Company, report: &ScrapeReport) {
    let now = Utc::now();
    company.has_impound = Some(report.capability.has_impound);
    company.impound_confidence = Some(report.capability.confidence);
    company.website_hours = report
        .hours
        .as_ref()
        .and_then(|h| serde_json::to_value(h).ok());
    if company.fleet_size.is_none() {
        company.fleet_size = fleet_size_from_reviews(company.review_count).map(String::from);
    }
    company.website_scrape_status = Some(ScrapeStatus::Success);
    company.website_scraped_at = Some(now);
    company.website_scrape_error = None;
    company.website_content_hash = Some(report.content_hash.clone());
    company.stage = next_stage(company.stage, StageEvent::WebsiteScrapeOk);
    company.updated_at = now;
}

fn apply_failure(company: &mut Company, error: &str) {
    let now = Utc::now();
    company.website_scrape_status = Some(ScrapeStatus::Failed);
    company.website_scraped_at = Some(now);
    // Kept across later successes until the next scrape overwrites it
    company.website_scrape_error = Some(error.to_string());
    company.stage = next_stage(company.stage, StageEvent::WebsiteScrapeFailed);
    company.updated_at = now;
}

fn success_snapshot(company: &Company, report: &ScrapeReport) -> EnrichmentSnapshot {
    EnrichmentSnapshot {
        id: Uuid::now_v7(),
        company_id: company.id,
        payload: serde_json::json!({
            "url": report.final_url,
            "status_code": report.status_code,
            "content_hash": report.content_hash,
            "has_impound": report.capability.has_impound,
            "impound_confidence": report.capability.confidence,
            "website_hours": report.hours,
            "text_len": report.text_len,
        }),
        source: SnapshotSource::Website,
        created_at: Utc::now(),
    }
}
