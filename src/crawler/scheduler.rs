//! Per-job work list and request pacing
//!
//! This module handles:
//! - The explicit work list a job drains (detail fetches before list pages)
//! - De-duplication of requests within a job
//! - The politeness delay between dispatches, widened while degraded

use crate::crawler::fetcher::{FetchRequest, HttpMethod};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// What a queued request is expected to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRole {
    /// The search form (ByIdentifier)
    SearchForm,
    /// The response to the search submission (ByIdentifier)
    SearchResult,
    /// A page of the party enumeration (ByParty)
    PartyList,
    /// A case detail page
    Detail,
}

/// A request waiting in a job's work list
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub request: FetchRequest,
    pub role: PageRole,
}

impl WorkItem {
    pub fn new(request: FetchRequest, role: PageRole) -> Self {
        Self { request, role }
    }
}

/// Requests a job still has to issue
///
/// Detail fetches are always drained before the next list page so a page's
/// links are fully followed before the following page is requested.
#[derive(Debug, Default)]
pub struct WorkList {
    details: VecDeque<WorkItem>,
    pages: VecDeque<WorkItem>,
    seen: HashSet<(HttpMethod, String)>,
}

impl WorkList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an item unless the same GET was already queued in this job
    ///
    /// Form submissions are never de-duplicated.
    ///
    /// # Returns
    ///
    /// * `true` - The item was queued
    /// * `false` - It duplicates an earlier item
    pub fn push(&mut self, item: WorkItem) -> bool {
        if item.request.method == HttpMethod::Get {
            let key = (item.request.method, item.request.url.to_string());
            if !self.seen.insert(key) {
                return false;
            }
        }

        match item.role {
            PageRole::Detail => self.details.push_back(item),
            _ => self.pages.push_back(item),
        }
        true
    }

    /// Takes the next item to dispatch
    pub fn pop(&mut self) -> Option<WorkItem> {
        self.details.pop_front().or_else(|| self.pages.pop_front())
    }

    /// Drops every queued list page, keeping queued detail fetches
    ///
    /// # Returns
    ///
    /// The number of pages dropped
    pub fn drop_pages(&mut self) -> usize {
        let dropped = self.pages.len();
        self.pages.clear();
        dropped
    }

    /// Drops everything
    pub fn clear(&mut self) {
        self.details.clear();
        self.pages.clear();
    }

    pub fn len(&self) -> usize {
        self.details.len() + self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty() && self.pages.is_empty()
    }
}

/// Enforces the minimum delay between two dispatches of one job
#[derive(Debug)]
pub struct Pacer {
    base_delay: Duration,
    last_dispatch: Option<Instant>,
}

impl Pacer {
    /// Creates a pacer
    ///
    /// # Arguments
    ///
    /// * `download_delay` - Configured delay between requests
    /// * `crawl_delay` - robots.txt crawl-delay, if any; the larger one applies
    pub fn new(download_delay: Duration, crawl_delay: Option<Duration>) -> Self {
        Self {
            base_delay: crawl_delay.map_or(download_delay, |d| d.max(download_delay)),
            last_dispatch: None,
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Time left before the next dispatch may happen
    ///
    /// # Arguments
    ///
    /// * `factor` - Multiplier applied to the base delay (2 while degraded)
    /// * `now` - The current instant
    pub fn wait_time(&self, factor: u32, now: Instant) -> Duration {
        let Some(last) = self.last_dispatch else {
            return Duration::ZERO;
        };
        let delay = self.base_delay.saturating_mul(factor.max(1));
        delay.saturating_sub(now.saturating_duration_since(last))
    }

    /// Waits until the next dispatch is allowed, then records it
    ///
    /// # Returns
    ///
    /// * `true` - The caller may dispatch
    /// * `false` - The job was cancelled while waiting
    pub async fn ready(&mut self, factor: u32, cancel: &CancellationToken) -> bool {
        let wait = self.wait_time(factor, Instant::now());
        if !wait.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        self.last_dispatch = Some(Instant::now());
        !cancel.is_cancelled()
    }
}
