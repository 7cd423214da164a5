//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{PageKind, RunRecord, RunStatus, Storage};
use crate::CrawlError;
use std::collections::HashMap;

/// Database statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Count of runs by status (zero counts omitted)
    pub runs_by_status: HashMap<RunStatus, u64>,

    /// Count of raw pages by kind
    pub pages_by_kind: HashMap<PageKind, u64>,

    /// Total number of raw pages stored
    pub total_pages: u64,

    /// Number of distinct case records
    pub records: u64,

    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, CrawlError> {
    let mut runs_by_status = storage.count_runs_by_status()?;
    runs_by_status.retain(|_, count| *count > 0);

    let pages_by_kind = storage.count_raw_pages_by_kind()?;
    let total_pages = pages_by_kind.values().sum();

    Ok(CrawlStatistics {
        runs_by_status,
        pages_by_kind,
        total_pages,
        records: storage.count_records()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Case records stored: {}", stats.records);
    println!("  Raw pages stored: {}", stats.total_pages);
    println!(
        "  Runs: {}",
        stats.runs_by_status.values().sum::<u64>()
    );
    println!();

    println!("Runs by Status:");
    for status in RunStatus::all() {
        if let Some(count) = stats.runs_by_status.get(&status) {
            println!("  {}: {}", status.to_db_string(), count);
        }
    }
    println!();

    println!("Raw Pages by Kind:");
    for kind in [PageKind::Form, PageKind::List, PageKind::Detail] {
        let count = stats.pages_by_kind.get(&kind).copied().unwrap_or(0);
        let percentage = if stats.total_pages > 0 {
            (count as f64 / stats.total_pages as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", kind.to_db_string(), count, percentage);
    }
    println!();

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  Id: {}", run.id);
        println!("  Target: {} ({})", run.target, run.search_mode);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Records: {}, fetches: {}", run.records, run.fetches);
        println!("  Config hash: {}", run.config_hash);
    }
}
