//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawl job
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    search_mode TEXT NOT NULL,
    target TEXT NOT NULL,
    status TEXT NOT NULL,
    records INTEGER NOT NULL DEFAULT 0,
    fetches INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);

-- Append-only audit of every received response
CREATE TABLE IF NOT EXISTS raw_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body TEXT NOT NULL,
    body_hash TEXT NOT NULL,
    kind TEXT NOT NULL,
    search_mode TEXT NOT NULL,
    target TEXT NOT NULL,
    page_index INTEGER NOT NULL,
    endpoint TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_pages_kind ON raw_pages(kind, fetched_at);
CREATE INDEX IF NOT EXISTS idx_raw_pages_url ON raw_pages(url, method);

-- Case records keyed by the hyphenated case number
CREATE TABLE IF NOT EXISTS case_records (
    canonical_id TEXT PRIMARY KEY,
    legacy_number TEXT,
    filed_on TEXT,
    rapporteur TEXT,
    parties TEXT NOT NULL,
    movements TEXT NOT NULL,
    source_url TEXT NOT NULL,
    scraped_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_case_records_rapporteur ON case_records(rapporteur, filed_on);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
