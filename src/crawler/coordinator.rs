//! Crawl orchestrator - per-job traversal logic
//!
//! This module contains the state machine that drives one crawl job:
//! - Seeding the work list for the job's search mode
//! - Passing every fetch outcome through the retry strategy
//! - Classifying accepted pages and dispatching on their role
//! - Following detail links and planning list pages within the job limits
//! - Persisting raw pages and extracted records through the sink

use crate::classify::{Classification, PageClassifier};
use crate::config::{Config, SiteConfig};
use crate::crawler::extract::{CaseRecord, RecordExtractor};
use crate::crawler::fetcher::{
    EndpointClass, FetchOutcome, FetchRequest, FetchResult, HttpMethod, NetworkFetcher, SearchMode,
};
use crate::crawler::parser::{extract_search_form, route_prefix, LinkMatcher};
use crate::crawler::scheduler::{Pacer, PageRole, WorkItem, WorkList};
use crate::normalize::{validate_case_number, validate_party_id};
use crate::pagination::{compute_limits, CrawlLimits, PagePosition, PaginationPlanner};
use crate::retry::{FailureKind, RetryDecision, RetryStrategy};
use crate::robots::ParsedRobots;
use crate::state::{JobProgress, JobState};
use crate::storage::{PageContext, PageKind, PersistenceSink, RawPage, RunStatus};
use crate::{ConfigError, CrawlError, ValidationError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Entry parameters of one crawl job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParams {
    pub mode: SearchMode,
    /// Target as supplied by the caller (any formatting)
    pub target: String,
    pub max_pages: Option<u32>,
    pub max_details_per_page: Option<u32>,
}

impl JobParams {
    pub fn new(mode: SearchMode, target: impl Into<String>) -> Self {
        Self {
            mode,
            target: target.into(),
            max_pages: None,
            max_details_per_page: None,
        }
    }

    pub fn with_limits(mut self, max_pages: Option<u32>, max_details_per_page: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self.max_details_per_page = max_details_per_page;
        self
    }
}

/// Validates a job target for its search mode
///
/// # Returns
///
/// * `Ok(String)` - The canonical target (hyphenated case number or 14 digits)
/// * `Err(ValidationError)` - Wrong digit count after normalization
pub fn validate_target(mode: SearchMode, raw: &str) -> Result<String, ValidationError> {
    match mode {
        SearchMode::ByIdentifier => validate_case_number(raw),
        SearchMode::ByParty => validate_party_id(raw),
    }
}

/// A traversal branch that was given up
#[derive(Debug, Clone, PartialEq)]
pub enum Abandonment {
    RetriesExhausted {
        url: String,
        endpoint: EndpointClass,
        attempts: u32,
        failure: FailureKind,
    },
    ClassificationMismatch {
        url: String,
        expected: Classification,
        actual: Classification,
    },
    /// No link on the result list matched the searched case
    NoMatchingLink { url: String },
    /// robots.txt forbids the URL
    Disallowed { url: String },
    /// The form page carried no usable form
    MissingForm { url: String },
    Cancelled,
}

impl fmt::Display for Abandonment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted {
                url,
                endpoint,
                attempts,
                failure,
            } => write!(
                f,
                "{} ({}): gave up after {} attempts, last failure {}",
                url, endpoint, attempts, failure
            ),
            Self::ClassificationMismatch {
                url,
                expected,
                actual,
            } => write!(f, "{}: expected {} page, got {}", url, expected, actual),
            Self::NoMatchingLink { url } => write!(f, "{}: no link matches the target", url),
            Self::Disallowed { url } => write!(f, "{}: disallowed by robots.txt", url),
            Self::MissingForm { url } => write!(f, "{}: no search form found", url),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of one crawl job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub mode: SearchMode,
    /// Canonical target
    pub target: String,
    pub limits: CrawlLimits,
    /// Records extracted, one per canonical case number
    pub records: Vec<CaseRecord>,
    pub fetches_issued: u32,
    pub retries_scheduled: u32,
    pub pages_processed: u32,
    pub details_followed: u32,
    pub abandoned: Vec<Abandonment>,
    pub persistence_errors: u32,
    /// The entry fetch failed for good; nothing could be collected
    pub job_abandoned: bool,
    pub cancelled: bool,
    pub final_state: JobState,
}

impl JobReport {
    /// Status recorded for the job's run
    pub fn run_status(&self) -> RunStatus {
        if self.cancelled {
            RunStatus::Cancelled
        } else if self.job_abandoned {
            RunStatus::Abandoned
        } else {
            RunStatus::Completed
        }
    }
}

/// Mutable state of a running job, owned by that job alone
struct Job {
    mode: SearchMode,
    target: String,
    limits: CrawlLimits,
    state: JobState,
    progress: JobProgress,
    work: WorkList,
    pacer: Pacer,
    records: Vec<CaseRecord>,
    abandoned: Vec<Abandonment>,
    job_abandoned: bool,
    cancelled: bool,
}

impl Job {
    fn advance(&mut self, next: JobState) -> Result<(), CrawlError> {
        self.state = self.state.transition(next)?;
        Ok(())
    }

    /// Records an abandoned branch; a job-level abandonment drops all pending work
    fn abandon(&mut self, reason: Abandonment, whole_job: bool) {
        warn!(
            "Abandoning {} for {} {}: {}",
            if whole_job { "job" } else { "branch" },
            self.mode,
            self.target,
            reason
        );
        self.abandoned.push(reason);
        if whole_job {
            self.job_abandoned = true;
            self.work.clear();
        }
    }

    fn cancel(&mut self) {
        if !self.cancelled {
            info!("Job {} {} cancelled", self.mode, self.target);
            self.cancelled = true;
            self.abandoned.push(Abandonment::Cancelled);
        }
        self.work.clear();
    }

    /// Keeps one record per case number, the latest extraction winning
    fn keep_record(&mut self, record: CaseRecord) {
        match self
            .records
            .iter_mut()
            .find(|r| r.canonical_id == record.canonical_id)
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    fn into_report(self) -> JobReport {
        JobReport {
            mode: self.mode,
            target: self.target,
            limits: self.limits,
            records: self.records,
            fetches_issued: self.progress.fetches_issued,
            retries_scheduled: self.progress.retries_scheduled,
            pages_processed: self.progress.pages_processed,
            details_followed: self.progress.details_followed,
            abandoned: self.abandoned,
            persistence_errors: self.progress.persistence_errors,
            job_abandoned: self.job_abandoned,
            cancelled: self.cancelled,
            final_state: self.state,
        }
    }
}

fn page_kind(role: PageRole) -> PageKind {
    match role {
        PageRole::SearchForm => PageKind::Form,
        PageRole::SearchResult | PageRole::PartyList => PageKind::List,
        PageRole::Detail => PageKind::Detail,
    }
}

/// Entry fetches whose permanent failure abandons the whole job
fn is_entry(item: &WorkItem) -> bool {
    match item.role {
        PageRole::SearchForm | PageRole::SearchResult => true,
        PageRole::PartyList => item.request.page_index == 0,
        PageRole::Detail => false,
    }
}

/// URL a response was served from, for resolving relative links
fn served_url(outcome: &FetchOutcome, request: &FetchRequest) -> Url {
    match &outcome.result {
        FetchResult::Response { final_url, .. } => {
            Url::parse(final_url).unwrap_or_else(|_| request.url.clone())
        }
        FetchResult::Failed(_) => request.url.clone(),
    }
}

/// Drives crawl jobs against one site
///
/// The orchestrator itself is immutable and may run several jobs at once;
/// each job owns its limits, counters and work list. The retry strategy
/// (and the health state behind it) is shared by every job.
pub struct CrawlOrchestrator<F, S> {
    site: SiteConfig,
    base_url: Url,
    download_delay: Duration,
    classifier: PageClassifier,
    planner: PaginationPlanner,
    links: LinkMatcher,
    extractor: RecordExtractor,
    retry: Arc<dyn RetryStrategy>,
    fetcher: Arc<F>,
    sink: Arc<S>,
    robots: ParsedRobots,
    cancel: CancellationToken,
}

impl<F: NetworkFetcher, S: PersistenceSink> CrawlOrchestrator<F, S> {
    /// Creates an orchestrator
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded configuration
    /// * `fetcher` - Transport used for every request
    /// * `sink` - Where raw pages and records are persisted
    /// * `retry` - Retry strategy shared by the session
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOrchestrator)` - Patterns compiled and URLs parsed
    /// * `Err(ConfigError)` - An invalid pattern or base URL
    pub fn new(
        config: &Config,
        fetcher: Arc<F>,
        sink: Arc<S>,
        retry: Arc<dyn RetryStrategy>,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.site.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.site.base_url, e)))?;
        let classifier = PageClassifier::new(&config.classifier)?;
        let links = LinkMatcher::new(&config.links, classifier.case_number_pattern().clone())?
            .with_excluded_prefix(route_prefix(&config.site.stable_route));

        Ok(Self {
            site: config.site.clone(),
            base_url,
            download_delay: Duration::from_millis(config.site.download_delay_ms),
            planner: PaginationPlanner::new(&config.pagination)?,
            extractor: RecordExtractor::new(&config.classifier)?,
            classifier,
            links,
            retry,
            fetcher,
            sink,
            robots: ParsedRobots::allow_all(),
            cancel: CancellationToken::new(),
        })
    }

    /// Applies robots.txt rules to every request
    pub fn with_robots(mut self, robots: ParsedRobots) -> Self {
        self.robots = robots;
        self
    }

    /// Stops jobs when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn stable_route_url(&self, party: &str, page: u32) -> Result<Url, url::ParseError> {
        Url::parse(
            &self
                .site
                .stable_route
                .replace("{party}", party)
                .replace("{page}", &page.to_string()),
        )
    }

    /// First request of a job
    fn entry_item(&self, job: &Job) -> Result<WorkItem, CrawlError> {
        let item = match job.mode {
            SearchMode::ByIdentifier if self.site.preload_form => WorkItem::new(
                FetchRequest::get(
                    self.base_url.clone(),
                    EndpointClass::Form,
                    job.mode,
                    &job.target,
                    0,
                ),
                PageRole::SearchForm,
            ),
            SearchMode::ByIdentifier => WorkItem::new(
                FetchRequest::submit(
                    self.base_url.clone(),
                    HttpMethod::Post,
                    vec![
                        (
                            self.site.search_type_field.clone(),
                            self.site.identifier_search_type.clone(),
                        ),
                        (self.site.search_value_field.clone(), job.target.clone()),
                    ],
                    EndpointClass::Form,
                    job.mode,
                    &job.target,
                ),
                PageRole::SearchResult,
            ),
            SearchMode::ByParty => WorkItem::new(
                FetchRequest::get(
                    self.stable_route_url(&job.target, 0)?,
                    EndpointClass::StableRoute,
                    job.mode,
                    &job.target,
                    0,
                ),
                PageRole::PartyList,
            ),
        };
        Ok(item)
    }

    /// Runs one job to completion, abandonment or cancellation
    ///
    /// The target is validated before anything is fetched.
    ///
    /// # Returns
    ///
    /// * `Ok(JobReport)` - The job terminated (possibly with no records)
    /// * `Err(CrawlError::Validation)` - The target is invalid for the mode
    pub async fn run_job(&self, params: &JobParams) -> Result<JobReport, CrawlError> {
        let target = validate_target(params.mode, &params.target)?;
        let limits = compute_limits(params.max_pages, params.max_details_per_page);

        let mut job = Job {
            mode: params.mode,
            target,
            limits,
            state: JobState::Init,
            progress: JobProgress::new(),
            work: WorkList::new(),
            pacer: Pacer::new(self.download_delay, self.robots.crawl_delay()),
            records: Vec::new(),
            abandoned: Vec::new(),
            job_abandoned: false,
            cancelled: false,
        };

        info!(
            "Starting {} job for {} (max {} pages, {} details per page)",
            job.mode, job.target, limits.max_pages, limits.max_details_per_page
        );

        let entry = self.entry_item(&job)?;
        job.work.push(entry);

        while let Some(item) = job.work.pop() {
            if self.cancel.is_cancelled() {
                job.cancel();
                break;
            }
            self.dispatch(&mut job, item).await?;
        }

        job.advance(JobState::Terminal)?;
        info!(
            "Job {} {} finished: {} records, {} fetches, {} retries, {} abandoned branches",
            job.mode,
            job.target,
            job.records.len(),
            job.progress.fetches_issued,
            job.progress.retries_scheduled,
            job.abandoned.len()
        );

        Ok(job.into_report())
    }

    async fn dispatch(&self, job: &mut Job, item: WorkItem) -> Result<(), CrawlError> {
        let entry = is_entry(&item);

        if !self.robots.is_allowed(&item.request.url) {
            job.abandon(
                Abandonment::Disallowed {
                    url: item.request.url.to_string(),
                },
                entry,
            );
            return Ok(());
        }

        match item.role {
            PageRole::SearchResult => job.advance(JobState::Submitted)?,
            PageRole::PartyList if item.request.page_index == 0 => {
                job.advance(JobState::Submitted)?
            }
            PageRole::PartyList if job.state != JobState::Paginating => {
                job.advance(JobState::Paginating)?
            }
            _ => {}
        }

        let Some(outcome) = self.fetch_with_retry(job, &item, entry).await else {
            return Ok(());
        };

        match item.role {
            PageRole::SearchForm => self.on_form_page(job, &item, &outcome),
            PageRole::SearchResult => self.on_search_result(job, &item, &outcome),
            PageRole::PartyList => self.on_party_list(job, &item, &outcome),
            PageRole::Detail => {
                self.on_detail(job, &item, &outcome);
                Ok(())
            }
        }
    }

    /// Issues a request until the retry strategy accepts its outcome
    ///
    /// Returns None when retries ran out or the job was cancelled.
    async fn fetch_with_retry(
        &self,
        job: &mut Job,
        item: &WorkItem,
        entry: bool,
    ) -> Option<FetchOutcome> {
        let mut request = item.request.clone();

        loop {
            if !job.pacer.ready(self.retry.pacing_factor(), &self.cancel).await {
                job.cancel();
                return None;
            }

            job.progress.fetches_issued += 1;
            debug!(
                "{} {} ({}, attempt {})",
                request.method.as_str(),
                request.url,
                request.endpoint,
                request.retry_count + 1
            );

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => {
                    job.cancel();
                    return None;
                }
                outcome = self.fetcher.fetch(&request) => outcome,
            };

            self.save_raw_page(job, &request, item.role, &outcome);

            match self.retry.evaluate(&request, &outcome) {
                RetryDecision::Accept => return Some(outcome),
                RetryDecision::Retry {
                    request: next,
                    delay,
                    failure,
                } => {
                    job.progress.retries_scheduled += 1;
                    debug!(
                        "Retrying {} in {:.2}s after {} (retry {})",
                        request.url,
                        delay.as_secs_f64(),
                        failure,
                        next.retry_count
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            job.cancel();
                            return None;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    request = next;
                }
                RetryDecision::Exhausted { attempts, failure } => {
                    job.abandon(
                        Abandonment::RetriesExhausted {
                            url: request.url.to_string(),
                            endpoint: request.endpoint,
                            attempts,
                            failure,
                        },
                        entry,
                    );
                    return None;
                }
            }
        }
    }

    /// Appends a received response to the audit trail; failures are only counted
    fn save_raw_page(
        &self,
        job: &mut Job,
        request: &FetchRequest,
        role: PageRole,
        outcome: &FetchOutcome,
    ) {
        let FetchResult::Response {
            status,
            final_url,
            headers,
            body,
        } = &outcome.result
        else {
            return;
        };

        let page = RawPage {
            url: final_url.clone(),
            method: request.method.as_str().to_string(),
            status: *status,
            headers: headers.clone(),
            body: body.clone(),
            context: PageContext {
                kind: page_kind(role),
                search_mode: request.search_mode,
                target: request.target.clone(),
                page_index: request.page_index,
                endpoint: request.endpoint,
            },
            fetched_at: outcome.fetched_at,
        };

        if let Err(e) = self.sink.save_raw_page(&page) {
            job.progress.persistence_errors += 1;
            error!("Failed to store raw page {}: {}", final_url, e);
        }
    }

    fn on_form_page(
        &self,
        job: &mut Job,
        item: &WorkItem,
        outcome: &FetchOutcome,
    ) -> Result<(), CrawlError> {
        let url = item.request.url.to_string();
        let classification = self.classifier.classify_form_page(outcome.body());
        info!("Form page {} classified as {}", url, classification);

        if classification != Classification::Form {
            job.abandon(
                Abandonment::ClassificationMismatch {
                    url,
                    expected: Classification::Form,
                    actual: classification,
                },
                true,
            );
            return Ok(());
        }
        job.advance(JobState::FormLoaded)?;

        let page_url = served_url(outcome, &item.request);
        let form = outcome
            .body()
            .and_then(|html| extract_search_form(html, &page_url, &self.site.search_value_field));
        let Some(form) = form else {
            job.abandon(Abandonment::MissingForm { url }, true);
            return Ok(());
        };

        debug!(
            "Submitting {} form to {} with {} hidden fields",
            form.method.as_str(),
            form.action,
            form.hidden_fields.len()
        );
        let fields = form.submission(&[
            (
                self.site.search_type_field.as_str(),
                self.site.identifier_search_type.as_str(),
            ),
            (self.site.search_value_field.as_str(), job.target.as_str()),
        ]);
        let request = FetchRequest::submit(
            form.action,
            form.method,
            fields,
            EndpointClass::Form,
            job.mode,
            &job.target,
        );
        job.work.push(WorkItem::new(request, PageRole::SearchResult));
        Ok(())
    }

    fn on_search_result(
        &self,
        job: &mut Job,
        item: &WorkItem,
        outcome: &FetchOutcome,
    ) -> Result<(), CrawlError> {
        let page_url = served_url(outcome, &item.request);
        let classification = self.classifier.classify(outcome.body());
        info!("Search result {} classified as {}", page_url, classification);
        job.advance(JobState::Classified(classification))?;

        match classification {
            Classification::Detail => {
                self.process_detail(job, outcome, &page_url);
            }
            Classification::List => {
                let best = outcome
                    .body()
                    .and_then(|html| self.links.best_match(html, &page_url, &job.target));
                match best {
                    Some(link) => {
                        info!(
                            "Following {} (score {}) for {}",
                            link.url, link.score, job.target
                        );
                        job.advance(JobState::LinkFollowing)?;
                        let request = FetchRequest::get(
                            link.url,
                            EndpointClass::Detail,
                            job.mode,
                            &job.target,
                            0,
                        );
                        if job.work.push(WorkItem::new(request, PageRole::Detail)) {
                            job.progress.details_followed += 1;
                        }
                    }
                    None => job.abandon(
                        Abandonment::NoMatchingLink {
                            url: page_url.to_string(),
                        },
                        true,
                    ),
                }
            }
            actual => job.abandon(
                Abandonment::ClassificationMismatch {
                    url: page_url.to_string(),
                    expected: Classification::Detail,
                    actual,
                },
                true,
            ),
        }
        Ok(())
    }

    fn on_party_list(
        &self,
        job: &mut Job,
        item: &WorkItem,
        outcome: &FetchOutcome,
    ) -> Result<(), CrawlError> {
        let page = item.request.page_index;
        let page_url = served_url(outcome, &item.request);
        let classification = self.classifier.classify(outcome.body());
        info!("Party list page {} classified as {}", page, classification);
        job.advance(JobState::Classified(classification))?;

        match classification {
            Classification::List => {
                let html = outcome.body().unwrap_or_default();
                job.progress.pages_processed += 1;

                let budget = job
                    .limits
                    .max_details_per_page
                    .min(job.progress.remaining_details(job.limits.max_total_details));
                let links = self.links.detail_links(html, &page_url);
                let offered = links.len();

                let mut queued = 0;
                for url in links {
                    if queued >= budget {
                        break;
                    }
                    let request =
                        FetchRequest::get(url, EndpointClass::Detail, job.mode, &job.target, page);
                    if job.work.push(WorkItem::new(request, PageRole::Detail)) {
                        queued += 1;
                    }
                }
                job.progress.details_followed += queued;
                info!(
                    "Page {} offers {} detail links, following {}",
                    page, offered, queued
                );
                if queued > 0 {
                    job.advance(JobState::LinkFollowing)?;
                }

                let info = self.planner.extract(html);
                let plan = self.planner.plan(
                    &info,
                    PagePosition {
                        current_page: page,
                        pages_processed: job.progress.pages_processed,
                        stable_route: true,
                    },
                    &job.limits,
                );
                debug!("Pagination plan {:?}: {:?}", plan.strategy, plan.pages);

                for next in plan.pages {
                    let request = FetchRequest::get(
                        self.stable_route_url(&job.target, next)?,
                        EndpointClass::StableRoute,
                        job.mode,
                        &job.target,
                        next,
                    );
                    job.work.push(WorkItem::new(request, PageRole::PartyList));
                }
            }
            Classification::Error if page == 0 => {
                info!("No results for party {}", job.target);
            }
            Classification::Error => {
                let dropped = job.work.drop_pages();
                debug!(
                    "Page {} is an error page; pagination stops ({} queued pages dropped)",
                    page, dropped
                );
            }
            Classification::Detail => {
                let dropped = job.work.drop_pages();
                warn!(
                    "Party list page {} ({}) reads as a detail page; storing it and dropping {} queued pages",
                    page, page_url, dropped
                );
                self.process_detail(job, outcome, &page_url);
            }
            actual => {
                job.abandon(
                    Abandonment::ClassificationMismatch {
                        url: page_url.to_string(),
                        expected: Classification::List,
                        actual,
                    },
                    false,
                );
                job.work.drop_pages();
            }
        }
        Ok(())
    }

    fn on_detail(&self, job: &mut Job, item: &WorkItem, outcome: &FetchOutcome) {
        let page_url = served_url(outcome, &item.request);
        let classification = self.classifier.classify(outcome.body());
        debug!("Detail page {} classified as {}", page_url, classification);

        if classification == Classification::Detail {
            self.process_detail(job, outcome, &page_url);
        } else {
            job.abandon(
                Abandonment::ClassificationMismatch {
                    url: page_url.to_string(),
                    expected: Classification::Detail,
                    actual: classification,
                },
                false,
            );
        }
    }

    /// Extracts and persists the record of a Detail page
    fn process_detail(&self, job: &mut Job, outcome: &FetchOutcome, page_url: &Url) {
        let scraped_at: DateTime<Utc> = outcome.fetched_at;
        let record = outcome
            .body()
            .and_then(|html| self.extractor.extract(html, page_url.as_str(), scraped_at));
        let Some(record) = record else {
            warn!("Detail page {} carries no case number; dropped", page_url);
            return;
        };

        match self.sink.upsert_record(&record) {
            Ok(upsert) => {
                job.progress.records += 1;
                info!("Stored {} ({:?})", record.canonical_id, upsert);
            }
            Err(e) => {
                job.progress.persistence_errors += 1;
                error!("Failed to store record {}: {}", record.canonical_id, e);
            }
        }
        job.keep_record(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthConfig, RetryConfig};
    use crate::retry::{HealthMonitor, RetryPolicy};
    use crate::storage::{StorageError, StorageResult, UpsertOutcome};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const CASE: &str = "0015648-78.1999.4.05.0000";
    const PARTY: &str = "12345678000190";

    const DETAIL_PAGE: &str = r#"<html><body>
        <p>PROCESSO Nº 0015648-78.1999.4.05.0000 (99.05.15648-0)</p>
        <table>
          <tr><td>RELATOR</td><td>: DESEMBARGADOR FEDERAL JOÃO DA SILVA</td></tr>
          <tr><td>APTE</td><td>: FAZENDA NACIONAL</td></tr>
          <tr><td>APDO</td><td>: EMPRESA EXEMPLO LTDA</td></tr>
        </table>
        <p>AUTUADO EM 15/04/1999</p>
    </body></html>"#;

    const FORM_PAGE: &str = r#"<html><body><h1>Consulta processual</h1>
        <form action="/cp/pesquisa" method="post">
          <input type="hidden" name="token" value="abc123"/>
          <input type="hidden" name="tipo" value="nome"/>
          <input type="text" name="filtro" value=""/>
        </form><p>Informe o numero do processo para iniciar a consulta.</p></body></html>"#;

    const NO_RESULTS_PAGE: &str = r#"<html><body><div class="aviso">Nenhum resultado
        encontrado para os parametros informados. Verifique os dados e tente novamente.</div>
        </body></html>"#;

    fn detail_page(case: &str) -> String {
        DETAIL_PAGE.replace(CASE, case)
    }

    fn list_page(links: &[(&str, &str)]) -> String {
        let rows: String = links
            .iter()
            .map(|(href, text)| format!(r#"<tr><td><a href="{}">{}</a></td></tr>"#, href, text))
            .collect();
        format!(
            "<html><body><h2>Consulta processual</h2><table>{}</table>\
             <p>Resultados ordenados pelo numero do processo.</p></body></html>",
            rows
        )
    }

    #[derive(Default)]
    struct ScriptedFetcher {
        routes: HashMap<String, Vec<FetchOutcome>>,
        served: Mutex<HashMap<String, usize>>,
        log: Mutex<Vec<FetchRequest>>,
    }

    impl ScriptedFetcher {
        fn route(mut self, method: HttpMethod, url: &str, outcomes: Vec<FetchOutcome>) -> Self {
            self.routes
                .insert(format!("{} {}", method.as_str(), url), outcomes);
            self
        }

        fn page(self, method: HttpMethod, url: &str, body: &str) -> Self {
            self.route(method, url, vec![FetchOutcome::response(200, url, body)])
        }

        fn requests(&self) -> Vec<FetchRequest> {
            self.log.lock().unwrap().clone()
        }

        fn hits(&self, url: &str) -> usize {
            self.requests()
                .iter()
                .filter(|r| r.url.as_str() == url)
                .count()
        }
    }

    #[async_trait]
    impl NetworkFetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
            self.log.lock().unwrap().push(request.clone());
            let key = format!("{} {}", request.method.as_str(), request.url);
            let Some(outcomes) = self.routes.get(&key) else {
                return FetchOutcome::response(404, request.url.as_str(), "");
            };
            let mut served = self.served.lock().unwrap();
            let index = served.entry(key).or_insert(0);
            let outcome = outcomes[(*index).min(outcomes.len() - 1)].clone();
            *index += 1;
            outcome
        }
    }

    #[derive(Default)]
    struct MemorySink {
        pages: Mutex<Vec<RawPage>>,
        records: Mutex<Vec<CaseRecord>>,
        failing: bool,
    }

    impl PersistenceSink for MemorySink {
        fn save_raw_page(&self, page: &RawPage) -> StorageResult<()> {
            if self.failing {
                return Err(StorageError::Database("disk full".to_string()));
            }
            self.pages.lock().unwrap().push(page.clone());
            Ok(())
        }

        fn upsert_record(&self, record: &CaseRecord) -> StorageResult<UpsertOutcome> {
            if self.failing {
                return Err(StorageError::Database("disk full".to_string()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(UpsertOutcome::Inserted)
        }
    }

    fn config(preload_form: bool) -> Config {
        let mut config = Config::default();
        config.site.base_url = "https://trf5.test/cp/".to_string();
        config.site.stable_route =
            "https://trf5.test/cp/processo/cpf/porData/ativos/{party}/{page}".to_string();
        config.site.preload_form = preload_form;
        config.site.download_delay_ms = 0;
        config.retry = RetryConfig {
            jitter: false,
            initial_delay_secs: 0.001,
            max_delay_secs: 0.01,
            ..RetryConfig::default()
        };
        config
    }

    fn orchestrator(
        config: &Config,
        fetcher: ScriptedFetcher,
        sink: MemorySink,
    ) -> CrawlOrchestrator<ScriptedFetcher, MemorySink> {
        let health = Arc::new(HealthMonitor::new(HealthConfig::default()));
        let retry = Arc::new(RetryPolicy::new(
            config.retry.clone(),
            Duration::from_secs(30),
            health,
        ));
        CrawlOrchestrator::new(config, Arc::new(fetcher), Arc::new(sink), retry).unwrap()
    }

    fn party_page(page: u32) -> String {
        format!("https://trf5.test/cp/processo/cpf/porData/ativos/{}/{}", PARTY, page)
    }

    #[tokio::test]
    async fn test_invalid_target_issues_no_fetch() {
        let orch = orchestrator(&config(false), ScriptedFetcher::default(), MemorySink::default());

        let result = orch
            .run_job(&JobParams::new(SearchMode::ByIdentifier, "123"))
            .await;
        assert!(matches!(
            result,
            Err(CrawlError::Validation(ValidationError::InvalidCaseNumber { digits: 3, .. }))
        ));

        let result = orch
            .run_job(&JobParams::new(SearchMode::ByParty, "12.345.678/0001"))
            .await;
        assert!(matches!(
            result,
            Err(CrawlError::Validation(ValidationError::InvalidPartyId { .. }))
        ));
        assert!(orch.fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_direct_detail_is_one_fetch_one_record() {
        let fetcher =
            ScriptedFetcher::default().page(HttpMethod::Post, "https://trf5.test/cp/", DETAIL_PAGE);
        let orch = orchestrator(&config(false), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByIdentifier, "00156487819994050000"))
            .await
            .unwrap();

        assert_eq!(report.target, CASE);
        assert_eq!(report.fetches_issued, 1);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].canonical_id, CASE);
        assert_eq!(report.details_followed, 0);
        assert_eq!(report.final_state, JobState::Terminal);
        assert_eq!(report.run_status(), RunStatus::Completed);

        let request = &orch.fetcher.requests()[0];
        assert_eq!(
            request.form_fields,
            Some(vec![
                ("tipo".to_string(), "xmlproc".to_string()),
                ("filtro".to_string(), CASE.to_string()),
            ])
        );

        assert_eq!(orch.sink.records.lock().unwrap().len(), 1);
        let pages = orch.sink.pages.lock().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].context.kind, PageKind::List);
        assert_eq!(pages[0].method, "POST");
    }

    #[tokio::test]
    async fn test_form_then_list_then_best_link() {
        let list = list_page(&[
            ("/cp/processo/0000001", "0000001-11.2020.4.05.0000"),
            (&format!("/cp/processo/{}", CASE), CASE),
        ]);
        let fetcher = ScriptedFetcher::default()
            .page(HttpMethod::Get, "https://trf5.test/cp/", FORM_PAGE)
            .page(HttpMethod::Post, "https://trf5.test/cp/pesquisa", &list)
            .page(
                HttpMethod::Get,
                &format!("https://trf5.test/cp/processo/{}", CASE),
                DETAIL_PAGE,
            );
        let orch = orchestrator(&config(true), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByIdentifier, CASE))
            .await
            .unwrap();

        assert_eq!(report.fetches_issued, 3);
        assert_eq!(report.details_followed, 1);
        assert_eq!(report.records.len(), 1);
        assert!(report.abandoned.is_empty());

        let submission = &orch.fetcher.requests()[1];
        assert_eq!(
            submission.form_fields,
            Some(vec![
                ("token".to_string(), "abc123".to_string()),
                ("tipo".to_string(), "xmlproc".to_string()),
                ("filtro".to_string(), CASE.to_string()),
            ])
        );
    }

    #[tokio::test]
    async fn test_list_without_match_abandons_job() {
        let list = list_page(&[
            ("/cp/processo/0000001", "0000001-11.2020.4.05.0000"),
            ("/cp/processo/0000002", "0000002-22.2020.4.05.0000"),
        ]);
        let list = list.replace("/cp/processo/", "/cp/consulta/");
        let fetcher =
            ScriptedFetcher::default().page(HttpMethod::Post, "https://trf5.test/cp/", &list);
        let orch = orchestrator(&config(false), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByIdentifier, CASE))
            .await
            .unwrap();

        assert!(report.records.is_empty());
        assert!(report.job_abandoned);
        assert!(matches!(
            report.abandoned[0],
            Abandonment::NoMatchingLink { .. }
        ));
        assert_eq!(report.run_status(), RunStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_party_budget_and_pagination() {
        let links: Vec<(String, String)> = (1..=5)
            .map(|i| {
                (
                    format!("/cp/processo/000000{}", i),
                    format!("000000{}-11.2020.4.05.0000", i),
                )
            })
            .collect();
        let link_refs: Vec<(&str, &str)> = links
            .iter()
            .map(|(h, t)| (h.as_str(), t.as_str()))
            .collect();

        let mut fetcher =
            ScriptedFetcher::default().page(HttpMethod::Get, &party_page(0), &list_page(&link_refs));
        for i in 1..=5 {
            let case = format!("000000{}-11.2020.4.05.0000", i);
            fetcher = fetcher.page(
                HttpMethod::Get,
                &format!("https://trf5.test/cp/processo/000000{}", i),
                &detail_page(&case),
            );
        }
        let orch = orchestrator(&config(true), fetcher, MemorySink::default());

        let params = JobParams::new(SearchMode::ByParty, "12.345.678/0001-90")
            .with_limits(Some(2), Some(3));
        let report = orch.run_job(&params).await.unwrap();

        assert_eq!(report.target, PARTY);
        assert_eq!(report.details_followed, 3);
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.pages_processed, 1);
        assert_eq!(orch.fetcher.hits(&party_page(0)), 1);
        assert_eq!(orch.fetcher.hits(&party_page(1)), 1);
        assert_eq!(orch.fetcher.hits(&party_page(2)), 0);
        assert_eq!(orch.fetcher.hits("https://trf5.test/cp/processo/0000004"), 0);

        // page 1 is requested only after page 0's details
        let urls: Vec<String> = orch
            .fetcher
            .requests()
            .iter()
            .map(|r| r.url.to_string())
            .collect();
        assert_eq!(urls.last(), Some(&party_page(1)));
        assert!(!report.job_abandoned);
    }

    /// List page linking each case under `/cp/processo/<first 7 digits>`
    fn party_list(cases: &[&str]) -> String {
        let links: Vec<(String, String)> = cases
            .iter()
            .map(|case| (format!("/cp/processo/{}", &case[..7]), case.to_string()))
            .collect();
        let refs: Vec<(&str, &str)> = links.iter().map(|(h, t)| (h.as_str(), t.as_str())).collect();
        list_page(&refs)
    }

    fn with_total(page: String, total: u32) -> String {
        page.replace("<h2>", &format!("<p>Total: {}</p><h2>", total))
    }

    fn with_details(mut fetcher: ScriptedFetcher, cases: &[&str]) -> ScriptedFetcher {
        for case in cases {
            fetcher = fetcher.page(
                HttpMethod::Get,
                &format!("https://trf5.test/cp/processo/{}", &case[..7]),
                &detail_page(case),
            );
        }
        fetcher
    }

    const CASES: [&str; 4] = [
        "0000001-11.2020.4.05.0000",
        "0000002-22.2020.4.05.0000",
        "0000003-33.2020.4.05.0000",
        "0000004-44.2020.4.05.0000",
    ];

    #[tokio::test]
    async fn test_total_count_fan_out_stops_at_error_page() {
        let fetcher = ScriptedFetcher::default()
            .page(HttpMethod::Get, &party_page(0), &with_total(party_list(&CASES[..2]), 50))
            .page(HttpMethod::Get, &party_page(1), &party_list(&CASES[2..]))
            .page(HttpMethod::Get, &party_page(2), NO_RESULTS_PAGE)
            .page(HttpMethod::Get, &party_page(3), &party_list(&CASES[..1]))
            .page(HttpMethod::Get, &party_page(4), &party_list(&CASES[..1]));
        let fetcher = with_details(fetcher, &CASES);
        let orch = orchestrator(&config(true), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByParty, PARTY).with_limits(Some(10), None))
            .await
            .unwrap();

        let urls: Vec<String> = orch
            .fetcher
            .requests()
            .iter()
            .map(|r| r.url.to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                party_page(0),
                "https://trf5.test/cp/processo/0000001".to_string(),
                "https://trf5.test/cp/processo/0000002".to_string(),
                party_page(1),
                "https://trf5.test/cp/processo/0000003".to_string(),
                "https://trf5.test/cp/processo/0000004".to_string(),
                party_page(2),
            ]
        );
        assert_eq!(orch.fetcher.hits(&party_page(3)), 0);
        assert_eq!(orch.fetcher.hits(&party_page(4)), 0);

        let mut ids: Vec<&str> = report.records.iter().map(|r| r.canonical_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, CASES.to_vec());
        assert_eq!(report.pages_processed, 2);
        assert!(report.abandoned.is_empty());
        assert_eq!(report.run_status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_signal_less_pages_stop_at_sequential_bound() {
        let mut fetcher = ScriptedFetcher::default();
        for page in 0..=6 {
            fetcher = fetcher.page(HttpMethod::Get, &party_page(page), &party_list(&CASES[..2]));
        }
        let fetcher = with_details(fetcher, &CASES[..2]);
        let orch = orchestrator(&config(true), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByParty, PARTY).with_limits(Some(20), None))
            .await
            .unwrap();

        let pages: Vec<u32> = orch
            .fetcher
            .requests()
            .iter()
            .filter(|r| r.endpoint == EndpointClass::StableRoute)
            .map(|r| r.page_index)
            .collect();
        assert_eq!(pages, vec![0, 1, 2, 3, 4]);
        assert_eq!(report.pages_processed, 5);
        assert_eq!(report.details_followed, 2);
        assert_eq!(report.records.len(), 2);
    }

    #[tokio::test]
    async fn test_detail_page_on_party_route_stops_pagination() {
        let stray = "0000009-99.2020.4.05.0000";
        let fetcher = ScriptedFetcher::default()
            .page(HttpMethod::Get, &party_page(0), &with_total(party_list(&CASES[..2]), 50))
            .page(HttpMethod::Get, &party_page(1), &detail_page(stray))
            .page(HttpMethod::Get, &party_page(2), &party_list(&CASES[2..]));
        let fetcher = with_details(fetcher, &CASES);
        let orch = orchestrator(&config(true), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByParty, PARTY).with_limits(Some(10), None))
            .await
            .unwrap();

        assert_eq!(orch.fetcher.hits(&party_page(1)), 1);
        assert_eq!(orch.fetcher.hits(&party_page(2)), 0);
        assert_eq!(report.records.len(), 3);
        assert!(report.records.iter().any(|r| r.canonical_id == stray));
        assert!(!report.job_abandoned);
        assert_eq!(report.final_state, JobState::Terminal);
    }

    #[tokio::test]
    async fn test_party_first_page_error_is_empty_result() {
        let fetcher =
            ScriptedFetcher::default().page(HttpMethod::Get, &party_page(0), NO_RESULTS_PAGE);
        let orch = orchestrator(&config(true), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByParty, PARTY))
            .await
            .unwrap();

        assert!(report.records.is_empty());
        assert!(report.abandoned.is_empty());
        assert!(!report.job_abandoned);
        assert_eq!(report.fetches_issued, 1);
        assert_eq!(report.run_status(), RunStatus::Completed);
        assert_eq!(report.final_state, JobState::Terminal);
    }

    #[tokio::test]
    async fn test_exhausted_entry_abandons_job() {
        let url = "https://trf5.test/cp/";
        let fetcher = ScriptedFetcher::default().route(
            HttpMethod::Post,
            url,
            vec![FetchOutcome::response(503, url, "Service Unavailable")],
        );
        let orch = orchestrator(&config(false), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByIdentifier, CASE))
            .await
            .unwrap();

        // form endpoint: 3 retries after the first attempt
        assert_eq!(report.fetches_issued, 4);
        assert_eq!(report.retries_scheduled, 3);
        assert!(report.job_abandoned);
        assert!(matches!(
            report.abandoned[0],
            Abandonment::RetriesExhausted {
                attempts: 4,
                endpoint: EndpointClass::Form,
                ..
            }
        ));
        assert_eq!(orch.sink.pages.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let url = "https://trf5.test/cp/";
        let fetcher = ScriptedFetcher::default().route(
            HttpMethod::Post,
            url,
            vec![
                FetchOutcome::response(502, url, "Bad Gateway"),
                FetchOutcome::response(200, url, DETAIL_PAGE),
            ],
        );
        let orch = orchestrator(&config(false), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByIdentifier, CASE))
            .await
            .unwrap();

        assert_eq!(report.fetches_issued, 2);
        assert_eq!(report.retries_scheduled, 1);
        assert_eq!(report.records.len(), 1);
        assert_eq!(orch.fetcher.requests()[1].retry_count, 1);
    }

    #[tokio::test]
    async fn test_detail_mismatch_drops_branch_only() {
        let list = list_page(&[
            ("/cp/processo/0000001", "0000001-11.2020.4.05.0000"),
            ("/cp/processo/0000002", "0000002-22.2020.4.05.0000"),
        ]);
        let fetcher = ScriptedFetcher::default()
            .page(HttpMethod::Get, &party_page(0), &list)
            .page(
                HttpMethod::Get,
                "https://trf5.test/cp/processo/0000001",
                NO_RESULTS_PAGE,
            )
            .page(
                HttpMethod::Get,
                "https://trf5.test/cp/processo/0000002",
                &detail_page("0000002-22.2020.4.05.0000"),
            );
        let orch = orchestrator(&config(true), fetcher, MemorySink::default());

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByParty, PARTY).with_limits(Some(1), None))
            .await
            .unwrap();

        assert_eq!(report.records.len(), 1);
        assert!(!report.job_abandoned);
        assert_eq!(
            report.abandoned,
            vec![Abandonment::ClassificationMismatch {
                url: "https://trf5.test/cp/processo/0000001".to_string(),
                expected: Classification::Detail,
                actual: Classification::Error,
            }]
        );
    }

    #[tokio::test]
    async fn test_persistence_errors_do_not_change_traversal() {
        let fetcher =
            ScriptedFetcher::default().page(HttpMethod::Post, "https://trf5.test/cp/", DETAIL_PAGE);
        let sink = MemorySink {
            failing: true,
            ..MemorySink::default()
        };
        let orch = orchestrator(&config(false), fetcher, sink);

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByIdentifier, CASE))
            .await
            .unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.persistence_errors, 2);
        assert_eq!(report.run_status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_disallowed_entry() {
        let fetcher =
            ScriptedFetcher::default().page(HttpMethod::Post, "https://trf5.test/cp/", DETAIL_PAGE);
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /cp/", "trf5-crawler");
        let orch = orchestrator(&config(false), fetcher, MemorySink::default()).with_robots(robots);

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByIdentifier, CASE))
            .await
            .unwrap();

        assert_eq!(report.fetches_issued, 0);
        assert!(report.job_abandoned);
        assert!(matches!(report.abandoned[0], Abandonment::Disallowed { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_job() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetcher =
            ScriptedFetcher::default().page(HttpMethod::Post, "https://trf5.test/cp/", DETAIL_PAGE);
        let orch = orchestrator(&config(false), fetcher, MemorySink::default())
            .with_cancellation(cancel);

        let report = orch
            .run_job(&JobParams::new(SearchMode::ByIdentifier, CASE))
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.fetches_issued, 0);
        assert_eq!(report.run_status(), RunStatus::Cancelled);
        assert_eq!(report.abandoned, vec![Abandonment::Cancelled]);
    }
}
