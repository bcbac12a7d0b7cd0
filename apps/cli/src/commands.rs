//! CLI command definitions, routing, and tracing setup.

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use towscout_core::{CrawlZoneOptions, NoopProfileEnricher, Orchestrator};
use towscout_discovery::ApifyMapsClient;
use towscout_scraper::{BatchScraper, HttpFetcher};
use towscout_shared::{
    AppConfig, ScrapeConfig, Stage, Zone, ZoneId, init_config, load_config, validate_api_token,
};
use towscout_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// TowScout — discover and enrich towing companies by zone.
#[derive(Parser)]
#[command(
    name = "towscout",
    version,
    about = "Discover towing companies by zone, scrape their websites, and classify impound capability.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline for one zone: discover, upsert, scrape, classify.
    Crawl {
        /// Zone name or ID to crawl.
        #[arg(short, long)]
        zone: String,

        /// Search query (defaults to the configured query).
        #[arg(short, long)]
        query: Option<String>,

        /// Maximum listings to fetch from discovery.
        #[arg(long)]
        max_results: Option<u32>,

        /// Discovery only: upsert listings but skip website scraping.
        #[arg(long)]
        skip_websites: bool,

        /// Run the profile enrichment pass after the website batch.
        #[arg(long)]
        profiles: bool,
    },

    /// Re-scrape companies whose website data has gone stale.
    Refresh {
        /// Restrict to one zone (name or ID).
        #[arg(short, long)]
        zone: Option<String>,

        /// Staleness threshold in days (defaults to the configured value).
        #[arg(short, long)]
        days: Option<u32>,

        /// Maximum companies to re-scrape in one run.
        #[arg(long, default_value = "100")]
        limit: u32,
    },

    /// Show pipeline status counts.
    Status {
        /// Restrict to one zone (name or ID).
        #[arg(short, long)]
        zone: Option<String>,
    },

    /// Zone management.
    Zone {
        #[command(subcommand)]
        action: ZoneAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Zone subcommands.
#[derive(Subcommand)]
pub(crate) enum ZoneAction {
    /// Register a new zone.
    Add {
        /// Zone name, e.g. "Dallas".
        name: String,

        /// Two-letter state code, e.g. "TX".
        #[arg(short, long)]
        state: Option<String>,
    },
    /// List zones.
    List {
        /// Include deactivated zones.
        #[arg(long)]
        all: bool,
    },
    /// Deactivate a zone. Its companies are kept.
    Deactivate {
        /// Zone name or ID.
        name: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "towscout=info",
        1 => "towscout=debug",
        _ => "towscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Crawl {
            zone,
            query,
            max_results,
            skip_websites,
            profiles,
        } => {
            cmd_crawl(
                &zone,
                query.as_deref(),
                max_results,
                skip_websites,
                profiles,
            )
            .await
        }
        Command::Refresh { zone, days, limit } => cmd_refresh(zone.as_deref(), days, limit).await,
        Command::Status { zone } => cmd_status(zone.as_deref()).await,
        Command::Zone { action } => match action {
            ZoneAction::Add { name, state } => cmd_zone_add(&name, state.as_deref()).await,
            ZoneAction::List { all } => cmd_zone_list(all).await,
            ZoneAction::Deactivate { name } => cmd_zone_deactivate(&name).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Open storage at the configured database path.
async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let db_path = config.database.resolved_path()?;
    Ok(Storage::open(&db_path).await?)
}

/// Resolve a zone argument, accepting either an ID or a case-insensitive name.
async fn resolve_zone(storage: &Storage, arg: &str) -> Result<Zone> {
    if let Ok(id) = arg.parse::<ZoneId>() {
        if let Some(zone) = storage.get_zone(id).await? {
            return Ok(zone);
        }
    }

    let zones = storage.list_zones(false).await?;
    zones
        .into_iter()
        .find(|z| z.name.eq_ignore_ascii_case(arg))
        .ok_or_else(|| eyre!("no zone named '{arg}' — register it with `towscout zone add`"))
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_crawl(
    zone_arg: &str,
    query: Option<&str>,
    max_results: Option<u32>,
    skip_websites: bool,
    profiles: bool,
) -> Result<()> {
    let config = load_config()?;
    let api_token = validate_api_token(&config)?;

    let storage = open_storage(&config).await?;
    let zone = resolve_zone(&storage, zone_arg).await?;

    let options = CrawlZoneOptions {
        query: query
            .map(String::from)
            .unwrap_or_else(|| config.defaults.search_query.clone()),
        max_results: max_results.unwrap_or(config.defaults.max_results),
        skip_websites,
        enrich_profiles: profiles,
    };

    info!(zone = %zone.name, query = %options.query, "starting crawl");

    let scrape_config = ScrapeConfig::from(&config);
    let discovery = ApifyMapsClient::new(config.apify.clone(), &api_token)?;
    let fetcher = HttpFetcher::new(&scrape_config)?;
    let orchestrator = Orchestrator::new(discovery, BatchScraper::new(fetcher, &scrape_config))
        .with_profile_enricher(NoopProfileEnricher);

    let progress = spinner(&format!("Crawling {}", zone.location_string()));
    let stats = orchestrator.crawl_zone(&storage, zone.id, &options).await;
    progress.finish_and_clear();
    let stats = stats?;

    println!();
    println!("  Crawl complete for {}", zone.location_string());
    println!("  Found:    {}", stats.companies_found);
    println!("  New:      {}", stats.companies_new);
    println!("  Updated:  {}", stats.companies_updated);
    println!("  Scraped:  {}", stats.websites_scraped);
    println!("  Failed:   {}", stats.websites_failed);
    println!("  Siteless: {}", stats.websites_skipped);
    if stats.profiles_scraped > 0 {
        println!("  Profiles: {}", stats.profiles_scraped);
    }
    println!();
    for (stage, count) in &stats.stage_breakdown {
        println!("    {stage:<18} {count}");
    }
    println!();

    Ok(())
}

async fn cmd_refresh(zone_arg: Option<&str>, days: Option<u32>, limit: u32) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let zone_id = match zone_arg {
        Some(arg) => Some(resolve_zone(&storage, arg).await?.id),
        None => None,
    };
    let days = days.unwrap_or(config.defaults.days_stale);

    let scrape_config = ScrapeConfig::from(&config);
    let fetcher = HttpFetcher::new(&scrape_config)?;
    let scraper = BatchScraper::new(fetcher, &scrape_config);

    // Discovery is not involved in a refresh; a stub client satisfies the
    // orchestrator without touching the network.
    let discovery = NoDiscovery;
    let orchestrator = Orchestrator::new(discovery, scraper);

    let progress = spinner("Refreshing stale companies");
    let outcome = orchestrator
        .refresh_stale(&storage, zone_id, days, limit)
        .await;
    progress.finish_and_clear();
    let outcome = outcome?;

    println!();
    println!("  Refresh complete ({days} day threshold)");
    println!("  Scraped:  {}", outcome.success);
    println!("  Failed:   {}", outcome.failed);
    println!("  Siteless: {}", outcome.no_website);
    println!();

    Ok(())
}

/// Discovery stub for commands that never search.
struct NoDiscovery;

impl towscout_discovery::DiscoveryClient for NoDiscovery {
    async fn search(
        &self,
        _location: &str,
        _query: &str,
        _max_results: u32,
    ) -> towscout_shared::Result<Vec<towscout_discovery::RawListing>> {
        Ok(Vec::new())
    }
}

async fn cmd_status(zone_arg: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let zone = match zone_arg {
        Some(arg) => Some(resolve_zone(&storage, arg).await?),
        None => None,
    };

    let counts = towscout_core::get_status(&storage, zone.as_ref().map(|z| z.id)).await?;

    println!();
    match &zone {
        Some(zone) => println!("  Status for {}", zone.location_string()),
        None => println!("  Status (all zones)"),
    }
    println!("  Companies:     {}", counts.total);
    println!("  With website:  {}", counts.with_website);
    println!("  Sites scraped: {}", counts.websites_success);
    println!("  Sites failed:  {}", counts.websites_failed);
    println!();
    for stage in Stage::all() {
        let count = counts.by_stage.get(&stage).copied().unwrap_or(0);
        println!("    {:<18} {count}", stage.as_str());
    }
    println!();

    Ok(())
}

async fn cmd_zone_add(name: &str, state: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let existing = storage.list_zones(false).await?;
    if existing.iter().any(|z| z.name.eq_ignore_ascii_case(name)) {
        return Err(eyre!("zone '{name}' already exists"));
    }

    let now = Utc::now();
    let zone = Zone {
        id: ZoneId::new(),
        name: name.to_string(),
        state: state.map(|s| s.to_uppercase()),
        active: true,
        created_at: now,
        updated_at: now,
    };
    storage.insert_zone(&zone).await?;

    println!("Zone registered: {} ({})", zone.location_string(), zone.id);
    Ok(())
}

async fn cmd_zone_list(all: bool) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let zones = storage.list_zones(!all).await?;

    if zones.is_empty() {
        println!("No zones registered. Add one with `towscout zone add <name> --state <ST>`.");
        return Ok(());
    }

    println!();
    for zone in zones {
        let marker = if zone.active { " " } else { "✗" };
        println!("  {marker} {:<24} {}", zone.location_string(), zone.id);
    }
    println!();
    Ok(())
}

async fn cmd_zone_deactivate(name: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let zone = resolve_zone(&storage, name).await?;

    if !zone.active {
        println!("Zone '{}' is already deactivated.", zone.name);
        return Ok(());
    }

    storage.deactivate_zone(zone.id).await?;
    println!("Zone deactivated: {}", zone.location_string());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
