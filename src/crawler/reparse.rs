//! Offline re-processing of stored raw pages
//!
//! Raw pages are re-classified with the current classifier and Detail pages
//! go through record extraction again, without any network access.

use crate::classify::{Classification, PageClassifier};
use crate::crawler::extract::RecordExtractor;
use crate::storage::{PageKind, RawPageFilter, Storage, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Counters of a re-parse pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReparseReport {
    pub processed: u32,
    /// Records extracted and stored
    pub succeeded: u32,
    /// Detail pages that yielded no record or could not be stored
    pub failed: u32,
    pub by_classification: HashMap<Classification, u32>,
}

/// Re-classifies stored raw pages and re-extracts records from Detail pages
///
/// # Arguments
///
/// * `storage` - Storage holding the raw pages; records are upserted into it
/// * `classifier` - Classifier applied to each page
/// * `extractor` - Record extractor for Detail pages
/// * `filter` - Selection of pages (newest first)
pub fn reparse_raw_pages<S: Storage>(
    storage: &mut S,
    classifier: &PageClassifier,
    extractor: &RecordExtractor,
    filter: &RawPageFilter,
) -> StorageResult<ReparseReport> {
    let pages = storage.list_raw_pages(filter)?;
    info!("Re-parsing {} stored pages", pages.len());

    let mut report = ReparseReport::default();
    for page in pages {
        report.processed += 1;

        let classification = match page.kind {
            PageKind::Form => classifier.classify_form_page(Some(&page.body)),
            _ => classifier.classify(Some(&page.body)),
        };
        *report.by_classification.entry(classification).or_insert(0) += 1;
        debug!("Page {} ({}) is {}", page.id, page.url, classification);

        if classification != Classification::Detail {
            continue;
        }

        let scraped_at = DateTime::parse_from_rfc3339(&page.fetched_at)
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let Some(record) = extractor.extract(&page.body, &page.url, scraped_at) else {
            warn!("Page {} ({}) carries no case number", page.id, page.url);
            report.failed += 1;
            continue;
        };

        match storage.upsert_record(&record) {
            Ok(_) => report.succeeded += 1,
            Err(e) => {
                error!("Failed to store record {}: {}", record.canonical_id, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Re-parse finished: {} processed, {} records, {} failed",
        report.processed, report.succeeded, report.failed
    );
    Ok(report)
}
