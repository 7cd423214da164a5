//! Crawler module for case-record collection
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching behind the `NetworkFetcher` seam
//! - HTML parsing for search forms and case links
//! - Record extraction from case detail pages
//! - Per-job work lists and request pacing
//! - The crawl orchestrator and the session runner
//! - Offline re-processing of stored raw pages

mod coordinator;
mod extract;
mod fetcher;
mod parser;
mod reparse;
mod scheduler;

pub use coordinator::{validate_target, Abandonment, CrawlOrchestrator, JobParams, JobReport};
pub use extract::{CaseRecord, Movement, Party, RecordExtractor};
pub use fetcher::{
    build_http_client, classify_transport_error, EndpointClass, FetchOutcome, FetchRequest,
    FetchResult, HttpFetcher, HttpMethod, NetworkFetcher, SearchMode, TransportFailure,
    TransportFailureKind,
};
pub use parser::{
    extract_search_form, resolve_link, route_prefix, CandidateLink, LinkMatcher, SearchForm,
};
pub use reparse::{reparse_raw_pages, ReparseReport};
pub use scheduler::{Pacer, PageRole, WorkItem, WorkList};

use crate::config::Config;
use crate::retry::{HealthMonitor, HealthSnapshot, RetryPolicy};
use crate::robots::{fetch_robots, ParsedRobots};
use crate::storage::{RunStatus, Storage, StorageError};
use crate::{CrawlError, ValidationError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

/// A job of a session together with the run it was recorded under
#[derive(Debug, Clone)]
pub struct SessionJob {
    pub run_id: i64,
    pub report: JobReport,
}

/// Outcome of a crawl session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub jobs: Vec<SessionJob>,
    /// Targets rejected before any fetch
    pub rejected: Vec<(String, ValidationError)>,
    /// Jobs that failed outside the traversal (target, error)
    pub failed: Vec<(String, String)>,
    /// Server health when the session ended
    pub health: HealthSnapshot,
}

impl SessionReport {
    pub fn total_records(&self) -> usize {
        self.jobs.iter().map(|job| job.report.records.len()).sum()
    }
}

fn lock<S>(storage: &Mutex<S>) -> Result<MutexGuard<'_, S>, StorageError> {
    storage
        .lock()
        .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
}

/// Runs a crawl session: every job against one site, sharing one health state
///
/// This is the main entry point for crawling. It will:
/// 1. Build the HTTP client and load robots.txt (when obeyed)
/// 2. Create the session's health monitor and retry policy
/// 3. Validate each target and record a run for it
/// 4. Run the jobs, at most `max-concurrent-jobs` at a time
/// 5. Close each run with the job's status and counters
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash recorded with every run
/// * `storage` - Storage shared by every job
/// * `jobs` - One entry per target
/// * `cancel` - Cancels every running job when fired
///
/// # Returns
///
/// * `Ok(SessionReport)` - All jobs terminated
/// * `Err(CrawlError)` - The session could not start
pub async fn run_session<S>(
    config: &Config,
    config_hash: &str,
    storage: Arc<Mutex<S>>,
    jobs: Vec<JobParams>,
    cancel: CancellationToken,
) -> Result<SessionReport, CrawlError>
where
    S: Storage + Send + 'static,
{
    let fetcher = HttpFetcher::new(&config.site)?;

    let robots = if config.site.obey_robots {
        let base_url = Url::parse(&config.site.base_url)?;
        fetch_robots(fetcher.client(), &base_url, &config.site.user_agent).await
    } else {
        ParsedRobots::allow_all()
    };

    let health = Arc::new(HealthMonitor::new(config.health.clone()));
    let retry = Arc::new(RetryPolicy::new(
        config.retry.clone(),
        Duration::from_secs_f64(config.site.request_timeout_secs),
        health.clone(),
    ));

    let orchestrator = Arc::new(
        CrawlOrchestrator::new(config, Arc::new(fetcher), storage.clone(), retry)?
            .with_robots(robots)
            .with_cancellation(cancel.clone()),
    );

    let semaphore = Arc::new(Semaphore::new(config.site.max_concurrent_jobs.max(1)));
    let mut tasks = JoinSet::new();
    let mut rejected = Vec::new();

    for params in jobs {
        let target = match validate_target(params.mode, &params.target) {
            Ok(target) => target,
            Err(e) => {
                warn!("Skipping {} target '{}': {}", params.mode, params.target, e);
                rejected.push((params.target.clone(), e));
                continue;
            }
        };

        let run_id = lock(&storage)?.create_run(config_hash, params.mode, &target)?;
        info!("Run {} created for {} {}", run_id, params.mode, target);

        let orchestrator = orchestrator.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let result = orchestrator.run_job(&params).await;
            (run_id, params, result)
        });
    }

    let mut completed = Vec::new();
    let mut failed = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        let (run_id, params, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                error!("Job task failed: {}", e);
                failed.push((String::new(), CrawlError::Task(e.to_string()).to_string()));
                continue;
            }
        };

        let (status, records, fetches) = match &result {
            Ok(report) => (
                report.run_status(),
                report.records.len() as u32,
                report.fetches_issued,
            ),
            Err(_) => (RunStatus::Failed, 0, 0),
        };

        let closed = lock(&storage)
            .and_then(|mut storage| storage.complete_run(run_id, status, records, fetches));
        if let Err(e) = closed {
            error!("Failed to close run {}: {}", run_id, e);
        }

        match result {
            Ok(report) => {
                info!(
                    "Run {} {}: {} records from {} fetches",
                    run_id,
                    status.to_db_string(),
                    records,
                    fetches
                );
                completed.push(SessionJob { run_id, report });
            }
            Err(e) => {
                error!("Run {} failed: {}", run_id, e);
                failed.push((params.target, e.to_string()));
            }
        }
    }

    completed.sort_by_key(|job| job.run_id);

    let snapshot = health.snapshot();
    info!(
        "Server health {}: failure rate {:.0}% over {} outcomes, {} consecutive failures, {:.0}s since last success",
        snapshot.status.as_str(),
        snapshot.failure_rate * 100.0,
        snapshot.sample_size,
        snapshot.consecutive_failures,
        snapshot.since_last_success.as_secs_f64()
    );

    Ok(SessionReport {
        jobs: completed,
        rejected,
        failed,
        health: snapshot,
    })
}
