//! Shared types, error model, and configuration for TowScout.
//!
//! This crate is the foundation depended on by all other TowScout crates.
//! It provides:
//! - [`TowScoutError`] — the unified error type
//! - Domain types ([`Company`], [`Zone`], [`EnrichmentSnapshot`], id newtypes)
//! - The enrichment stage machine ([`Stage`], [`StageEvent`], [`next_stage`])
//! - Configuration ([`AppConfig`], [`ScrapeConfig`], config loading)

pub mod config;
pub mod error;
pub mod stage;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApifyConfig, AppConfig, DatabaseConfig, DefaultsConfig, ScrapeConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_token,
};
pub use error::{Result, TowScoutError};
pub use stage::{Stage, StageEvent, next_stage};
pub use types::{
    Company, CompanyId, EnrichmentSnapshot, ScrapeStatus, SnapshotSource, Zone, ZoneId,
};
