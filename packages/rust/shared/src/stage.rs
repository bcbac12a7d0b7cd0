//! Enrichment stage machine.
//!
//! Each company carries a [`Stage`] recording how far through the pipeline it
//! has progressed. Transitions are pure: [`next_stage`] maps the current stage
//! and an operation outcome to the new stage, with no I/O and no side effects.
//! The pipeline is forward-only, except that a failed company re-enters at the
//! stage it failed from on the next successful pass.

use serde::{Deserialize, Serialize};

/// Enrichment progress of a company, persisted as a text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Just discovered, nothing scraped yet.
    Initial,
    /// Maps listing data collected.
    Discovered,
    /// Website fetched and classified.
    WebsiteScraped,
    /// Social/business profile scraped.
    ProfileScraped,
    /// All sources scraped.
    FullyEnriched,
    /// Last scrape attempt failed; retried on the next pass.
    Failed,
}

impl Stage {
    /// Stable string form used in storage and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::Discovered => "discovered",
            Stage::WebsiteScraped => "website_scraped",
            Stage::ProfileScraped => "profile_scraped",
            Stage::FullyEnriched => "fully_enriched",
            Stage::Failed => "failed",
        }
    }

    /// Parse a persisted stage value defensively.
    ///
    /// Absent or empty values mean the company predates stage tracking and is
    /// treated as [`Stage::Initial`]. Unknown values are normalized to
    /// [`Stage::Discovered`] rather than failing the read; the corrected value
    /// is written back on the next save.
    pub fn parse_lossy(value: Option<&str>) -> Self {
        match value {
            None => Stage::Initial,
            Some(s) => match s {
                "" => Stage::Initial,
                "initial" => Stage::Initial,
                "discovered" => Stage::Discovered,
                "website_scraped" => Stage::WebsiteScraped,
                "profile_scraped" => Stage::ProfileScraped,
                "fully_enriched" => Stage::FullyEnriched,
                "failed" => Stage::Failed,
                other => {
                    tracing::warn!(stage = other, "unknown persisted stage, normalizing");
                    Stage::Discovered
                }
            },
        }
    }

    /// All stages, in pipeline order. Used for report breakdowns.
    pub fn all() -> [Stage; 6] {
        [
            Stage::Initial,
            Stage::Discovered,
            Stage::WebsiteScraped,
            Stage::ProfileScraped,
            Stage::FullyEnriched,
            Stage::Failed,
        ]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a pipeline operation on one company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// First discovery of this listing key.
    DiscoveredNew,
    /// Re-discovery of a listing key already in storage.
    DiscoveredExisting,
    /// Website fetch + classification succeeded.
    WebsiteScrapeOk,
    /// Website fetch or classification failed.
    WebsiteScrapeFailed,
    /// Profile enrichment succeeded.
    ProfileScrapeOk,
    /// Company has no usable website; skip without advancing or failing.
    NoWebsite,
}

/// Pure transition function for the enrichment stage machine.
///
/// Successful events never move a company backward: a re-discovery of a
/// fully-enriched company leaves it fully enriched, and a repeat website
/// scrape of an enriched company keeps the later stage.
pub fn next_stage(current: Stage, event: StageEvent) -> Stage {
    match event {
        StageEvent::DiscoveredNew => match current {
            Stage::Initial => Stage::Discovered,
            other => other,
        },
        StageEvent::DiscoveredExisting => {
            // Promote to Discovered unless already past it. A failed company
            // keeps its failure marker; only a successful scrape clears it.
            if current > Stage::Discovered {
                current
            } else {
                Stage::Discovered
            }
        }
        StageEvent::WebsiteScrapeOk => {
            if current > Stage::WebsiteScraped && current != Stage::Failed {
                current
            } else {
                Stage::WebsiteScraped
            }
        }
        StageEvent::WebsiteScrapeFailed => Stage::Failed,
        StageEvent::ProfileScrapeOk => match current {
            Stage::WebsiteScraped => Stage::FullyEnriched,
            other => other,
        },
        StageEvent::NoWebsite => current,
    }
}
