//! libSQL storage layer for zones, companies, and enrichment history.
//!
//! The [`Storage`] struct wraps a local libSQL database. The pipeline treats
//! it as a plain CRUD repository: zone lookups, company upserts keyed on the
//! external listing key, stale-company selection for refresh passes, the
//! append-only enrichment snapshot trail, and crawl-run audit rows.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use towscout_shared::{
    Company, CompanyId, EnrichmentSnapshot, Result, ScrapeStatus, SnapshotSource, Stage,
    TowScoutError, Zone, ZoneId,
};

/// Column list shared by all company SELECTs; order must match
/// [`row_to_company`].
const COMPANY_COLUMNS: &str = "id, zone_id, name, listing_key, phone, email, website, profile_url, \
     address_street, address_city, address_state, address_zip, rating, review_count, \
     listing_hours, website_hours, has_impound, impound_confidence, fleet_size, \
     website_scrape_status, website_scraped_at, website_scrape_error, website_content_hash, \
     stage, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TowScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    TowScoutError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Zone operations
    // -----------------------------------------------------------------------

    /// Insert a new zone record.
    pub async fn insert_zone(&self, zone: &Zone) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO zones (id, name, state, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    zone.id.to_string(),
                    zone.name.as_str(),
                    zone.state.as_deref(),
                    zone.active as i64,
                    zone.created_at.to_rfc3339(),
                    zone.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a zone by ID.
    pub async fn get_zone(&self, id: ZoneId) -> Result<Option<Zone>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, state, active, created_at, updated_at FROM zones WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_zone(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TowScoutError::Storage(e.to_string())),
        }
    }

    /// List zones, optionally restricted to active ones.
    pub async fn list_zones(&self, active_only: bool) -> Result<Vec<Zone>> {
        let sql = if active_only {
            "SELECT id, name, state, active, created_at, updated_at FROM zones
             WHERE active = 1 ORDER BY name"
        } else {
            "SELECT id, name, state, active, created_at, updated_at FROM zones ORDER BY name"
        };

        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_zone(&row)?);
        }
        Ok(results)
    }

    /// Soft-deactivate a zone. Returns false if the zone does not exist.
    pub async fn deactivate_zone(&self, id: ZoneId) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE zones SET active = 0, updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // Company operations
    // -----------------------------------------------------------------------

    /// Find a company by its external listing key.
    pub async fn find_company_by_listing_key(&self, key: &str) -> Result<Option<Company>> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE listing_key = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![key])
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_company(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TowScoutError::Storage(e.to_string())),
        }
    }

    /// Get a company by ID.
    pub async fn get_company(&self, id: CompanyId) -> Result<Option<Company>> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_company(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TowScoutError::Storage(e.to_string())),
        }
    }

    /// Insert a new company row.
    pub async fn insert_company(&self, company: &Company) -> Result<()> {
        let sql = format!(
            "INSERT INTO companies ({COMPANY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)"
        );
        self.conn
            .execute(&sql, company_params(company))
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Write a company row in full, by id. The stage column is always
    /// rewritten, which is how defensively-normalized stage values get
    /// corrected in place.
    pub async fn save_company(&self, company: &Company) -> Result<()> {
        let sql = "UPDATE companies SET
             zone_id = ?2, name = ?3, listing_key = ?4, phone = ?5, email = ?6, website = ?7,
             profile_url = ?8, address_street = ?9, address_city = ?10, address_state = ?11,
             address_zip = ?12, rating = ?13, review_count = ?14, listing_hours = ?15,
             website_hours = ?16, has_impound = ?17, impound_confidence = ?18, fleet_size = ?19,
             website_scrape_status = ?20, website_scraped_at = ?21, website_scrape_error = ?22,
             website_content_hash = ?23, stage = ?24, created_at = ?25, updated_at = ?26
             WHERE id = ?1";
        self.conn
            .execute(sql, company_params(company))
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List companies, optionally restricted to one zone.
    pub async fn list_companies(&self, zone: Option<ZoneId>) -> Result<Vec<Company>> {
        let mut rows = match zone {
            Some(zone_id) => {
                let sql = format!(
                    "SELECT {COMPANY_COLUMNS} FROM companies WHERE zone_id = ?1 ORDER BY name"
                );
                self.conn
                    .query(&sql, params![zone_id.to_string()])
                    .await
                    .map_err(|e| TowScoutError::Storage(e.to_string()))?
            }
            None => {
                let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies ORDER BY name");
                self.conn
                    .query(&sql, params![])
                    .await
                    .map_err(|e| TowScoutError::Storage(e.to_string()))?
            }
        };

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_company(&row)?);
        }
        Ok(results)
    }

    /// Select companies due for a website (re)scrape.
    ///
    /// Matches companies that have a website, are not flagged `no_website`,
    /// and were last scraped before `cutoff` (or never). RFC 3339 UTC strings
    /// compare correctly as text.
    pub async fn find_stale_companies(
        &self,
        cutoff: DateTime<Utc>,
        zone: Option<ZoneId>,
        limit: u32,
    ) -> Result<Vec<Company>> {
        let cutoff = cutoff.to_rfc3339();
        let mut rows = match zone {
            Some(zone_id) => {
                let sql = format!(
                    "SELECT {COMPANY_COLUMNS} FROM companies
                     WHERE website IS NOT NULL AND TRIM(website) != ''
                       AND (website_scrape_status IS NULL OR website_scrape_status != 'no_website')
                       AND (website_scraped_at IS NULL OR website_scraped_at < ?1)
                       AND zone_id = ?2
                     ORDER BY website_scraped_at IS NOT NULL, website_scraped_at
                     LIMIT ?3"
                );
                self.conn
                    .query(&sql, params![cutoff.as_str(), zone_id.to_string(), limit as i64])
                    .await
                    .map_err(|e| TowScoutError::Storage(e.to_string()))?
            }
            None => {
                let sql = format!(
                    "SELECT {COMPANY_COLUMNS} FROM companies
                     WHERE website IS NOT NULL AND TRIM(website) != ''
                       AND (website_scrape_status IS NULL OR website_scrape_status != 'no_website')
                       AND (website_scraped_at IS NULL OR website_scraped_at < ?1)
                     ORDER BY website_scraped_at IS NOT NULL, website_scraped_at
                     LIMIT ?2"
                );
                self.conn
                    .query(&sql, params![cutoff.as_str(), limit as i64])
                    .await
                    .map_err(|e| TowScoutError::Storage(e.to_string()))?
            }
        };

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_company(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Enrichment snapshots (append-only)
    // -----------------------------------------------------------------------

    /// Append an enrichment snapshot. Snapshots are never updated or deleted.
    pub async fn insert_snapshot(&self, snapshot: &EnrichmentSnapshot) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO enrichment_snapshots (id, company_id, payload, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot.id.to_string(),
                    snapshot.company_id.to_string(),
                    snapshot.payload.to_string(),
                    snapshot.source.as_str(),
                    snapshot.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List snapshots for a company, oldest first.
    pub async fn list_snapshots(&self, company_id: CompanyId) -> Result<Vec<EnrichmentSnapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, company_id, payload, source, created_at
                 FROM enrichment_snapshots WHERE company_id = ?1 ORDER BY created_at",
                params![company_id.to_string()],
            )
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_snapshot(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Crawl run audit
    // -----------------------------------------------------------------------

    /// Insert a new crawl run record. Returns the generated run ID.
    pub async fn insert_crawl_run(&self, zone_id: ZoneId, query: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO crawl_runs (id, zone_id, query, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), zone_id.to_string(), query, now.as_str()],
            )
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Mark a crawl run finished with its stats payload.
    pub async fn finish_crawl_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE crawl_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| TowScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Status counts
    // -----------------------------------------------------------------------

    /// Aggregate counts for status reporting.
    pub async fn status_counts(&self, zone: Option<ZoneId>) -> Result<StatusCounts> {
        let zone_str = zone.map(|z| z.to_string());

        let mut rows = match &zone_str {
            Some(z) => self
                .conn
                .query(
                    "SELECT stage, COUNT(*) FROM companies WHERE zone_id = ?1 GROUP BY stage",
                    params![z.as_str()],
                )
                .await
                .map_err(|e| TowScoutError::Storage(e.to_string()))?,
            None => self
                .conn
                .query("SELECT stage, COUNT(*) FROM companies GROUP BY stage", params![])
                .await
                .map_err(|e| TowScoutError::Storage(e.to_string()))?,
        };

        let mut by_stage = std::collections::BTreeMap::new();
        while let Ok(Some(row)) = rows.next().await {
            let stage = Stage::parse_lossy(row.get::<String>(0).ok().as_deref());
            let count = row.get::<i64>(1).unwrap_or(0) as usize;
            *by_stage.entry(stage).or_insert(0) += count;
        }

        let sql_totals = "SELECT COUNT(*),
                 SUM(CASE WHEN website IS NOT NULL AND TRIM(website) != '' THEN 1 ELSE 0 END),
                 SUM(CASE WHEN website_scrape_status = 'success' THEN 1 ELSE 0 END),
                 SUM(CASE WHEN website_scrape_status = 'failed' THEN 1 ELSE 0 END)
             FROM companies";

        let mut rows = match &zone_str {
            Some(z) => self
                .conn
                .query(
                    &format!("{sql_totals} WHERE zone_id = ?1"),
                    params![z.as_str()],
                )
                .await
                .map_err(|e| TowScoutError::Storage(e.to_string()))?,
            None => self
                .conn
                .query(sql_totals, params![])
                .await
                .map_err(|e| TowScoutError::Storage(e.to_string()))?,
        };

        let (total, with_website, websites_success, websites_failed) = match rows.next().await {
            Ok(Some(row)) => (
                row.get::<i64>(0).unwrap_or(0) as usize,
                row.get::<i64>(1).unwrap_or(0) as usize,
                row.get::<i64>(2).unwrap_or(0) as usize,
                row.get::<i64>(3).unwrap_or(0) as usize,
            ),
            _ => (0, 0, 0, 0),
        };

        Ok(StatusCounts {
            total,
            by_stage,
            with_website,
            websites_success,
            websites_failed,
        })
    }
}

/// Aggregate counts returned by [`Storage::status_counts`].
#[derive(Debug, Clone)]
pub struct StatusCounts {
    pub total: usize,
    pub by_stage: std::collections::BTreeMap<Stage, usize>,
    pub with_website: usize,
    pub websites_success: usize,
    pub websites_failed: usize,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn get_text(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| TowScoutError::Storage(e.to_string()))
}

fn parse_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| TowScoutError::Storage(format!("invalid uuid: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TowScoutError::Storage(format!("invalid timestamp: {e}")))
}

fn row_to_zone(row: &libsql::Row) -> Result<Zone> {
    Ok(Zone {
        id: ZoneId(parse_id(&get_text(row, 0)?)?),
        name: get_text(row, 1)?,
        state: row.get::<String>(2).ok(),
        active: row.get::<i64>(3).unwrap_or(1) != 0,
        created_at: parse_timestamp(&get_text(row, 4)?)?,
        updated_at: parse_timestamp(&get_text(row, 5)?)?,
    })
}

fn row_to_company(row: &libsql::Row) -> Result<Company> {
    Ok(Company {
        id: CompanyId(parse_id(&get_text(row, 0)?)?),
        zone_id: ZoneId(parse_id(&get_text(row, 1)?)?),
        name: get_text(row, 2)?,
        listing_key: get_text(row, 3)?,
        phone: row.get::<String>(4).ok(),
        email: row.get::<String>(5).ok(),
        website: row.get::<String>(6).ok(),
        profile_url: row.get::<String>(7).ok(),
        address_street: row.get::<String>(8).ok(),
        address_city: row.get::<String>(9).ok(),
        address_state: row.get::<String>(10).ok(),
        address_zip: row.get::<String>(11).ok(),
        rating: row.get::<f64>(12).ok(),
        review_count: row.get::<i64>(13).ok().map(|v| v as u32),
        listing_hours: row
            .get::<String>(14)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok()),
        website_hours: row
            .get::<String>(15)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok()),
        has_impound: row.get::<i64>(16).ok().map(|v| v != 0),
        impound_confidence: row.get::<f64>(17).ok(),
        fleet_size: row.get::<String>(18).ok(),
        website_scrape_status: row
            .get::<String>(19)
            .ok()
            .as_deref()
            .and_then(ScrapeStatus::parse),
        website_scraped_at: row
            .get::<String>(20)
            .ok()
            .and_then(|s| parse_timestamp(&s).ok()),
        website_scrape_error: row.get::<String>(21).ok(),
        website_content_hash: row.get::<String>(22).ok(),
        stage: Stage::parse_lossy(row.get::<String>(23).ok().as_deref()),
        created_at: parse_timestamp(&get_text(row, 24)?)?,
        updated_at: parse_timestamp(&get_text(row, 25)?)?,
    })
}

fn row_to_snapshot(row: &libsql::Row) -> Result<EnrichmentSnapshot> {
    let source = match get_text(row, 3)?.as_str() {
        "website" => SnapshotSource::Website,
        "profile" => SnapshotSource::Profile,
        _ => SnapshotSource::Manual,
    };
    Ok(EnrichmentSnapshot {
        id: parse_id(&get_text(row, 0)?)?,
        company_id: CompanyId(parse_id(&get_text(row, 1)?)?),
        payload: serde_json::from_str(&get_text(row, 2)?)
            .map_err(|e| TowScoutError::Storage(format!("invalid snapshot payload: {e}")))?,
        source,
        created_at: parse_timestamp(&get_text(row, 4)?)?,
    })
}

/// Bind all company columns, in [`COMPANY_COLUMNS`] order.
fn company_params(company: &Company) -> impl libsql::params::IntoParams {
    params![
        company.id.to_string(),
        company.zone_id.to_string(),
        company.name.as_str(),
        company.listing_key.as_str(),
        company.phone.as_deref(),
        company.email.as_deref(),
        company.website.as_deref(),
        company.profile_url.as_deref(),
        company.address_street.as_deref(),
        company.address_city.as_deref(),
        company.address_state.as_deref(),
        company.address_zip.as_deref(),
        company.rating,
        company.review_count.map(i64::from),
        company.listing_hours.as_ref().map(|v| v.to_string()),
        company.website_hours.as_ref().map(|v| v.to_string()),
        company.has_impound.map(i64::from),
        company.impound_confidence,
        company.fleet_size.as_deref(),
        company.website_scrape_status.map(|s| s.as_str()),
        company.website_scraped_at.map(|t| t.to_rfc3339()),
        company.website_scrape_error.as_deref(),
        company.website_content_hash.as_deref(),
        company.stage.as_str(),
        company.created_at.to_rfc3339(),
        company.updated_at.to_rfc3339(),
    ]
}
