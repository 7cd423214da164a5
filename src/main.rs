//! trf5-crawler main entry point
//!
//! This is the command-line interface for the TRF5 case-record crawler.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use trf5_crawler::config::{load_config_with_hash, Config};
use trf5_crawler::crawler::{
    reparse_raw_pages, run_session, validate_target, JobParams, RecordExtractor, SearchMode,
};
use trf5_crawler::output::{
    load_statistics, print_reparse_report, print_session_report, print_statistics,
};
use trf5_crawler::pagination::compute_limits;
use trf5_crawler::storage::{open_storage, PageKind, RawPageFilter};
use trf5_crawler::PageClassifier;

/// Search strategy selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Case-number search through the search form
    #[value(alias = "identifier")]
    Numero,
    /// Party tax-id enumeration through the stable route
    #[value(alias = "party")]
    Cnpj,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Numero => SearchMode::ByIdentifier,
            ModeArg::Cnpj => SearchMode::ByParty,
        }
    }
}

/// Page kind filter for --reparse
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Form,
    List,
    Detail,
}

impl From<KindArg> for PageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Form => PageKind::Form,
            KindArg::List => PageKind::List,
            KindArg::Detail => PageKind::Detail,
        }
    }
}

/// trf5-crawler: a resilient case-record collector
///
/// Searches the TRF5 public process consultation by case number or by party
/// tax id, retries transient failures with an adaptive backoff, and stores
/// every raw page and extracted case record in SQLite.
#[derive(Parser, Debug)]
#[command(name = "trf5-crawler")]
#[command(version)]
#[command(about = "A resilient TRF5 case-record crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Search strategy
    #[arg(long, value_enum, default_value = "numero")]
    mode: ModeArg,

    /// Case number or party tax id; repeat for several jobs
    #[arg(long = "value", value_name = "V")]
    values: Vec<String>,

    /// Maximum list pages per job (1-20)
    #[arg(long)]
    max_pages: Option<u32>,

    /// Maximum detail links followed per list page (1-50)
    #[arg(long)]
    max_details_per_page: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and targets and show the plan without fetching
    #[arg(long, conflicts_with_all = ["stats", "reparse"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "reparse"])]
    stats: bool,

    /// Re-classify stored raw pages and re-extract records, offline
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    reparse: bool,

    /// Maximum pages to re-parse
    #[arg(long, requires = "reparse")]
    reparse_limit: Option<u32>,

    /// Newest pages to skip before re-parsing
    #[arg(long, requires = "reparse", default_value_t = 0)]
    reparse_skip: u32,

    /// Only re-parse pages of this kind
    #[arg(long, value_enum, requires = "reparse")]
    reparse_kind: Option<KindArg>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &cli)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.reparse {
        handle_reparse(&config, &cli)
    } else {
        handle_crawl(&config, &config_hash, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trf5_crawler=info,warn"),
            1 => EnvFilter::new("trf5_crawler=debug,info"),
            2 => EnvFilter::new("trf5_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds one job per --value; limits on the command line win over the config file
fn job_params(config: &Config, cli: &Cli) -> Vec<JobParams> {
    let max_pages = cli.max_pages.or(config.limits.max_pages);
    let max_details = cli
        .max_details_per_page
        .or(config.limits.max_details_per_page);

    cli.values
        .iter()
        .map(|value| JobParams::new(cli.mode.into(), value.clone()).with_limits(max_pages, max_details))
        .collect()
}

/// Handles the --dry-run mode: validates config and targets, shows the plan
fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    println!("=== trf5-crawler Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Stable route: {}", config.site.stable_route);
    println!("  Preload form: {}", config.site.preload_form);
    println!("  Request timeout: {}s", config.site.request_timeout_secs);
    println!("  Download delay: {}ms", config.site.download_delay_ms);
    println!("  Obey robots.txt: {}", config.site.obey_robots);
    println!("  Concurrent jobs: {}", config.site.max_concurrent_jobs);

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!(
        "  Backoff: {}s x {} (max {}s, jitter {})",
        config.retry.initial_delay_secs,
        config.retry.backoff_multiplier,
        config.retry.max_delay_secs,
        config.retry.jitter
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let jobs = job_params(config, cli);
    println!("\nJobs ({}):", jobs.len());
    let mut valid = 0;
    for job in &jobs {
        let limits = compute_limits(job.max_pages, job.max_details_per_page);
        match validate_target(job.mode, &job.target) {
            Ok(target) => {
                valid += 1;
                println!(
                    "  - {} {} (max {} pages, {} details per page, {} details total)",
                    job.mode,
                    target,
                    limits.max_pages,
                    limits.max_details_per_page,
                    limits.max_total_details
                );
            }
            Err(e) => println!("  - {} '{}': rejected, {}", job.mode, job.target, e),
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would run {} of {} jobs", valid, jobs.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --reparse mode: re-processes stored raw pages offline
fn handle_reparse(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let mut storage = open_storage(Path::new(&config.output.database_path))
        .context("failed to open database")?;
    let classifier = PageClassifier::new(&config.classifier)?;
    let extractor = RecordExtractor::new(&config.classifier)?;

    let filter = RawPageFilter {
        kind: cli.reparse_kind.map(PageKind::from),
        search_mode: None,
        limit: cli.reparse_limit,
        skip: cli.reparse_skip,
    };

    let report = reparse_raw_pages(&mut storage, &classifier, &extractor, &filter)?;
    print_reparse_report(&report);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, cli: &Cli) -> anyhow::Result<()> {
    if cli.values.is_empty() {
        bail!("no target given; pass at least one --value");
    }

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("failed to open database")?;
    let storage = Arc::new(Mutex::new(storage));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling running jobs");
            on_interrupt.cancel();
        }
    });

    let jobs = job_params(config, cli);
    tracing::info!("Starting session with {} jobs", jobs.len());

    let session = run_session(config, config_hash, storage, jobs, cancel)
        .await
        .context("crawl session failed")?;
    print_session_report(&session);

    if session.jobs.is_empty() && !session.rejected.is_empty() {
        bail!("every target was rejected");
    }

    Ok(())
}
