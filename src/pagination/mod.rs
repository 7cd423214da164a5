//! Pagination planning for result lists
//!
//! Two strategies exist, chosen by what the current list page shows:
//! - **Total count**: the page states how many results exist, so every
//!   remaining page index is known up front.
//! - **Navigation links**: the page links to next/previous/first/last or
//!   numbered pages. When a stable-route page shows no navigation at all,
//!   the next index is guessed sequentially up to a configured bound; the
//!   classification of that guessed page ends the traversal.

mod extract;

pub use extract::{is_navigation_text, NavLinks};

use crate::config::PaginationConfig;
use crate::ConfigError;
use regex::Regex;

/// Default pages per job
pub const DEFAULT_MAX_PAGES: u32 = 5;
/// Absolute page ceiling per job
pub const MAX_PAGES_CEILING: u32 = 20;
/// Default detail links followed per list page
pub const DEFAULT_MAX_DETAILS_PER_PAGE: u32 = 10;
/// Absolute detail ceiling per list page
pub const MAX_DETAILS_PER_PAGE_CEILING: u32 = 50;

/// Per-job traversal limits, fixed when the job starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlLimits {
    pub max_pages: u32,
    pub max_details_per_page: u32,
    pub max_total_details: u32,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        compute_limits(None, None)
    }
}

/// Validates and clamps job limits
///
/// Absent or zero values take the defaults (5 pages, 10 details per page);
/// supplied values are clamped to 20 and 50.
///
/// # Example
///
/// ```
/// use trf5_crawler::pagination::compute_limits;
///
/// let limits = compute_limits(Some(2), Some(5));
/// assert_eq!(limits.max_total_details, 10);
/// ```
pub fn compute_limits(max_pages: Option<u32>, max_details_per_page: Option<u32>) -> CrawlLimits {
    let max_pages = match max_pages {
        Some(v) if v > 0 => v.min(MAX_PAGES_CEILING),
        _ => DEFAULT_MAX_PAGES,
    };
    let max_details_per_page = match max_details_per_page {
        Some(v) if v > 0 => v.min(MAX_DETAILS_PER_PAGE_CEILING),
        _ => DEFAULT_MAX_DETAILS_PER_PAGE,
    };

    CrawlLimits {
        max_pages,
        max_details_per_page,
        max_total_details: max_pages * max_details_per_page,
    }
}

/// Pagination facts read from one list page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationInfo {
    TotalCount {
        total: u64,
        page_size: u32,
        last_page: u32,
    },
    NavLinks(NavLinks),
}

/// Strategy that produced a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStrategy {
    TotalCount,
    NavLinks,
    Sequential,
    /// Nothing left to fetch
    Exhausted,
}

/// Page indices to fetch next, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan {
    pub strategy: PaginationStrategy,
    pub pages: Vec<u32>,
}

impl PagePlan {
    fn exhausted() -> Self {
        Self {
            strategy: PaginationStrategy::Exhausted,
            pages: Vec::new(),
        }
    }
}

/// Where a job stands when a list page is planned from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePosition {
    /// Index of the list page just processed
    pub current_page: u32,
    /// List pages processed so far, including the current one
    pub pages_processed: u32,
    /// Whether the pages come from the stable route
    pub stable_route: bool,
}

/// Computes the next pages of a result list
#[derive(Debug, Clone)]
pub struct PaginationPlanner {
    page_size: u32,
    page_token: Regex,
    sequential_bound: u32,
}

impl PaginationPlanner {
    /// Creates a planner from the pagination configuration
    pub fn new(config: &PaginationConfig) -> Result<Self, ConfigError> {
        let pattern = format!(r"[?&]{}=(\d+)", regex::escape(&config.page_param));
        let page_token = Regex::new(&pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("page-param: {}", e)))?;

        Ok(Self {
            page_size: config.page_size.max(1),
            page_token,
            sequential_bound: config.sequential_bound,
        })
    }

    /// Reads pagination facts from a list page
    ///
    /// A parseable total count wins; otherwise navigation links are used.
    pub fn extract(&self, html: &str) -> PaginationInfo {
        match extract::total_count(html) {
            Some(total) => PaginationInfo::TotalCount {
                total,
                page_size: self.page_size,
                last_page: last_page(total, self.page_size),
            },
            None => PaginationInfo::NavLinks(extract::nav_links(html, &self.page_token)),
        }
    }

    /// Plans the next pages to fetch
    ///
    /// # Arguments
    ///
    /// * `info` - Pagination facts of the page just processed
    /// * `position` - The job's position in the list
    /// * `limits` - The job's limits
    ///
    /// # Returns
    ///
    /// The page indices to enqueue, never more than the remaining page budget
    pub fn plan(
        &self,
        info: &PaginationInfo,
        position: PagePosition,
        limits: &CrawlLimits,
    ) -> PagePlan {
        let remaining = limits.max_pages.saturating_sub(position.pages_processed);
        if remaining == 0 {
            return PagePlan::exhausted();
        }

        let current = position.current_page;
        match info {
            PaginationInfo::TotalCount { last_page, .. } => {
                let end = current.saturating_add(remaining).min(*last_page);
                let pages: Vec<u32> = (current.saturating_add(1)..=end).collect();
                if pages.is_empty() {
                    PagePlan::exhausted()
                } else {
                    PagePlan {
                        strategy: PaginationStrategy::TotalCount,
                        pages,
                    }
                }
            }
            PaginationInfo::NavLinks(links) => {
                let next = current.saturating_add(1);
                if links.has_next {
                    let target = links.next_token.unwrap_or(next);
                    if target > current {
                        return PagePlan {
                            strategy: PaginationStrategy::NavLinks,
                            pages: vec![target],
                        };
                    }
                    return PagePlan::exhausted();
                }

                if links.numbered_pages.contains(&next) {
                    return PagePlan {
                        strategy: PaginationStrategy::NavLinks,
                        pages: vec![next],
                    };
                }

                if !links.has_signal() && position.stable_route && next < self.sequential_bound {
                    return PagePlan {
                        strategy: PaginationStrategy::Sequential,
                        pages: vec![next],
                    };
                }

                PagePlan::exhausted()
            }
        }
    }
}

/// Index of the last page for a result total
pub fn last_page(total: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    if total == 0 {
        return 0;
    }
    let pages = (total + page_size - 1) / page_size;
    u32::try_from(pages - 1).unwrap_or(u32::MAX)
}
