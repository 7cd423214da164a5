//! Output module for crawl reports and statistics
//!
//! This module handles:
//! - Printing the outcome of a crawl session, job by job
//! - Printing the result of an offline re-parse
//! - Database statistics (see [`stats`])

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::classify::Classification;
use crate::crawler::{JobReport, ReparseReport, SessionReport};
use crate::retry::HealthSnapshot;

/// One-line summary of a job
pub fn job_summary(report: &JobReport) -> String {
    format!(
        "{} {}: {} ({} records, {} fetches, {} retries, {} pages, {} details)",
        report.mode,
        report.target,
        report.run_status().to_db_string(),
        report.records.len(),
        report.fetches_issued,
        report.retries_scheduled,
        report.pages_processed,
        report.details_followed
    )
}

/// Prints a job report to stdout
pub fn print_job_report(run_id: i64, report: &JobReport) {
    println!("Run {}: {}", run_id, job_summary(report));

    for record in &report.records {
        println!(
            "  - {} | filed {} | rapporteur {} | {} parties, {} movements",
            record.canonical_id,
            record.filed_on.as_deref().unwrap_or("?"),
            record.rapporteur.as_deref().unwrap_or("?"),
            record.parties.len(),
            record.movements.len()
        );
    }

    if !report.abandoned.is_empty() {
        println!("  Abandoned ({}):", report.abandoned.len());
        for abandonment in &report.abandoned {
            println!("    * {}", abandonment);
        }
    }

    if report.persistence_errors > 0 {
        println!("  Persistence errors: {}", report.persistence_errors);
    }
}

/// Prints a health snapshot to stdout
pub fn print_health(health: &HealthSnapshot) {
    println!("Server Health: {}", health.status.as_str());
    println!(
        "  Failure rate: {:.1}% over {} outcomes ({} recent failures)",
        health.failure_rate * 100.0,
        health.sample_size,
        health.recent_failures
    );
    println!("  Consecutive failures: {}", health.consecutive_failures);
    println!(
        "  Since last success: {:.1}s",
        health.since_last_success.as_secs_f64()
    );
}

/// Prints the outcome of a crawl session to stdout
pub fn print_session_report(session: &SessionReport) {
    println!("=== Crawl Session ===\n");

    for job in &session.jobs {
        print_job_report(job.run_id, &job.report);
    }
    println!();

    if !session.rejected.is_empty() {
        println!("Rejected Targets ({}):", session.rejected.len());
        for (target, reason) in &session.rejected {
            println!("  - '{}': {}", target, reason);
        }
        println!();
    }

    if !session.failed.is_empty() {
        println!("Failed Jobs ({}):", session.failed.len());
        for (target, reason) in &session.failed {
            println!("  - {}: {}", target, reason);
        }
        println!();
    }

    print_health(&session.health);
    println!();
    println!(
        "Total: {} records from {} jobs",
        session.total_records(),
        session.jobs.len()
    );
}

/// Prints the result of an offline re-parse to stdout
pub fn print_reparse_report(report: &ReparseReport) {
    println!("=== Re-parse ===\n");
    println!("  Pages processed: {}", report.processed);
    println!("  Records stored: {}", report.succeeded);
    println!("  Failed: {}", report.failed);

    println!("\nPages by Classification:");
    for classification in [
        Classification::Form,
        Classification::Detail,
        Classification::List,
        Classification::Error,
        Classification::Unknown,
    ] {
        if let Some(count) = report.by_classification.get(&classification) {
            println!("  {}: {}", classification, count);
        }
    }
}
