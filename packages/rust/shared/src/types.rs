//! Core domain types for TowScout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stage::Stage;

// ---------------------------------------------------------------------------
// Id newtypes
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for company identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub Uuid);

impl CompanyId {
    /// Generate a new time-sortable company identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CompanyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CompanyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A UUID v7 wrapper for zone identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub Uuid);

impl ZoneId {
    /// Generate a new time-sortable zone identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ZoneId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Zone
// ---------------------------------------------------------------------------

/// A geographic targeting zone. Every company belongs to exactly one zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    /// City or region name, e.g. "Dallas".
    pub name: String,
    /// Optional state/region qualifier, e.g. "TX".
    pub state: Option<String>,
    /// Soft-deactivation flag; inactive zones are hidden from listings.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Zone {
    /// Location string passed to the maps-search actor.
    pub fn location_string(&self) -> String {
        match &self.state {
            Some(state) => format!("{}, {state}", self.name),
            None => self.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScrapeStatus
// ---------------------------------------------------------------------------

/// Per-company outcome of the most recent website scrape attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Success,
    Failed,
    NoWebsite,
}

impl ScrapeStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Success => "success",
            ScrapeStatus::Failed => "failed",
            ScrapeStatus::NoWebsite => "no_website",
        }
    }

    /// Parse a persisted status value. Unknown values read back as `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(ScrapeStatus::Success),
            "failed" => Some(ScrapeStatus::Failed),
            "no_website" => Some(ScrapeStatus::NoWebsite),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Company
// ---------------------------------------------------------------------------

/// A discovered business — the unit of work for the enrichment pipeline.
///
/// `listing_key` is the stable external listing identifier (the maps listing
/// URL); discovery upserts are de-duplicated on it. `stage` is never NULL in
/// storage: absence reads back as [`Stage::Initial`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub zone_id: ZoneId,
    pub name: String,
    /// Stable external listing key used for upsert de-duplication.
    pub listing_key: String,

    // Contact
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    /// Social/business profile link, if the listing carried one.
    pub profile_url: Option<String>,

    // Address components, parsed from the listing address.
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,

    // Review metrics from the listing.
    pub rating: Option<f64>,
    pub review_count: Option<u32>,

    // Operating hours, two independently-sourced variants.
    /// Hours as reported by the discovery listing (free-form JSON).
    pub listing_hours: Option<serde_json::Value>,
    /// Hours extracted from the company's own website (free-form JSON).
    pub website_hours: Option<serde_json::Value>,

    // Heuristic capability classification from the website.
    pub has_impound: Option<bool>,
    /// Only meaningful when `has_impound` is set. 0.0–1.0, not calibrated.
    pub impound_confidence: Option<f64>,
    /// Coarse fleet-size bucket derived from review volume.
    pub fleet_size: Option<String>,

    // Website scrape bookkeeping.
    pub website_scrape_status: Option<ScrapeStatus>,
    pub website_scraped_at: Option<DateTime<Utc>>,
    /// Error message from the last failed scrape attempt.
    pub website_scrape_error: Option<String>,
    /// SHA-256 of the last fetched page, for change detection on refresh.
    pub website_content_hash: Option<String>,

    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// Whether the company carries a website usable by the page fetcher.
    /// Only http(s) URLs qualify; anything else is treated as no website.
    pub fn has_scrapable_website(&self) -> bool {
        match &self.website {
            Some(w) => {
                let w = w.trim();
                w.starts_with("http://") || w.starts_with("https://")
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// EnrichmentSnapshot
// ---------------------------------------------------------------------------

/// Source tag on an enrichment snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Website,
    Profile,
    Manual,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Website => "website",
            SnapshotSource::Profile => "profile",
            SnapshotSource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record of one enrichment pass. Append-only: never updated
/// or deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSnapshot {
    pub id: Uuid,
    pub company_id: CompanyId,
    /// The partial field set written during this pass.
    pub payload: serde_json::Value,
    pub source: SnapshotSource,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_id_roundtrip() {
        let id = CompanyId::new();
        let s = id.to_string();
        let parsed: CompanyId = s.parse().expect("parse CompanyId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn zone_location_string() {
        let mut zone = Zone {
            id: ZoneId::new(),
            name: "Dallas".into(),
            state: Some("TX".into()),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(zone.location_string(), "Dallas, TX");

        zone.state = None;
        assert_eq!(zone.location_string(), "Dallas");
    }

    #[test]
    fn scrape_status_roundtrip() {
        for status in [
            ScrapeStatus::Success,
            ScrapeStatus::Failed,
            ScrapeStatus::NoWebsite,
        ] {
            assert_eq!(ScrapeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ScrapeStatus::parse("pending"), None);
    }

    #[test]
    fn scrapable_website_requires_content() {
        let mut company = sample_company();
        assert!(company.has_scrapable_website());

        company.website = Some("   ".into());
        assert!(!company.has_scrapable_website());

        company.website = Some("ftp://acetowing.example.com".into());
        assert!(!company.has_scrapable_website());

        company.website = None;
        assert!(!company.has_scrapable_website());
    }

    #[test]
    fn company_serialization() {
        let company = sample_company();
        let json = serde_json::to_string(&company).expect("serialize");
        let parsed: Company = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.name, "Ace Towing");
        assert_eq!(parsed.stage, Stage::Discovered);
    }

    fn sample_company() -> Company {
        Company {
            id: CompanyId::new(),
            zone_id: ZoneId::new(),
            name: "Ace Towing".into(),
            listing_key: "https://maps.example.com/ace-towing".into(),
            phone: Some("555-0100".into()),
            email: None,
            website: Some("https://acetowing.example.com".into()),
            profile_url: None,
            address_street: Some("100 Main St".into()),
            address_city: Some("Dallas".into()),
            address_state: Some("TX".into()),
            address_zip: Some("75201".into()),
            rating: Some(4.6),
            review_count: Some(120),
            listing_hours: None,
            website_hours: None,
            has_impound: None,
            impound_confidence: None,
            fleet_size: None,
            website_scrape_status: None,
            website_scraped_at: None,
            website_scrape_error: None,
            website_content_hash: None,
            stage: Stage::Discovered,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
