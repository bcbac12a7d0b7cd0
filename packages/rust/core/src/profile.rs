//! Business-profile enrichment seam.
//!
//! A second enrichment pass over companies whose websites have been scraped,
//! pulling whatever the profile source exposes (social pages, directory
//! listings). Only companies that carry a profile URL are attempted.

use serde_json::Value;

use towscout_shared::{Company, Result};

/// Capability interface for the profile enrichment pass.
pub trait ProfileEnricher: Send + Sync {
    /// Fetch profile data for one company. The returned JSON is persisted
    /// verbatim as an enrichment snapshot.
    fn enrich(&self, company: &Company) -> impl Future<Output = Result<Value>> + Send;
}

/// Enricher used when no profile source is configured. Returns an empty
/// payload; the orchestrator still advances the stage machine.
pub struct NoopProfileEnricher;

impl ProfileEnricher for NoopProfileEnricher {
    async fn enrich(&self, _company: &Company) -> Result<Value> {
        Ok(Value::Object(serde_json::Map::new()))
    }
}
