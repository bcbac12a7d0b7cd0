//! Pipeline orchestration: discovery → upsert → website scrape → profile pass.

pub mod pipeline;
pub mod profile;

pub use pipeline::{CrawlStats, CrawlZoneOptions, Orchestrator, get_status};
pub use profile::{NoopProfileEnricher, ProfileEnricher};
