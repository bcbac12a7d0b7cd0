//! SQL migration definitions for the TowScout database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: zones, companies, enrichment_snapshots, crawl_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Geographic targeting zones
CREATE TABLE IF NOT EXISTS zones (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    state      TEXT,
    active     INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Discovered businesses
CREATE TABLE IF NOT EXISTS companies (
    id                    TEXT PRIMARY KEY,
    zone_id               TEXT NOT NULL REFERENCES zones(id),
    name                  TEXT NOT NULL,
    listing_key           TEXT NOT NULL UNIQUE,
    phone                 TEXT,
    email                 TEXT,
    website               TEXT,
    profile_url           TEXT,
    address_street        TEXT,
    address_city          TEXT,
    address_state         TEXT,
    address_zip           TEXT,
    rating                REAL,
    review_count          INTEGER,
    listing_hours         TEXT,
    website_hours         TEXT,
    has_impound           INTEGER,
    impound_confidence    REAL,
    fleet_size            TEXT,
    website_scrape_status TEXT,
    website_scraped_at    TEXT,
    website_scrape_error  TEXT,
    website_content_hash  TEXT,
    stage                 TEXT NOT NULL DEFAULT 'initial',
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_companies_zone ON companies(zone_id);
CREATE INDEX IF NOT EXISTS idx_companies_stage ON companies(stage);
CREATE INDEX IF NOT EXISTS idx_companies_scraped_at ON companies(website_scraped_at);

-- Append-only enrichment audit trail
CREATE TABLE IF NOT EXISTS enrichment_snapshots (
    id         TEXT PRIMARY KEY,
    company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    payload    TEXT NOT NULL,
    source     TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_company ON enrichment_snapshots(company_id);

-- Crawl invocation audit
CREATE TABLE IF NOT EXISTS crawl_runs (
    id          TEXT PRIMARY KEY,
    zone_id     TEXT NOT NULL REFERENCES zones(id),
    query       TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_zone ON crawl_runs(zone_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
