//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Run tracking (one run per crawl job)
//! - The append-only raw page audit
//! - Case record upserts keyed by the canonical case number

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{PersistenceSink, Storage, StorageError, StorageResult};

use crate::crawler::{EndpointClass, SearchMode};
use crate::CrawlError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(CrawlError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    SqliteStorage::new(path)
}

/// Hash of a page body as stored in the audit table (`sha256:<hex>`)
pub fn body_hash(body: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(body.as_bytes())))
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub search_mode: String,
    pub target: String,
    pub status: RunStatus,
    pub records: u32,
    pub fetches: u32,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Running,
    Completed,
    /// The entry fetch failed for good; nothing was collected
    Abandoned,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn all() -> [Self; 5] {
        [
            Self::Running,
            Self::Completed,
            Self::Abandoned,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

/// Role of a stored page in the traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Form,
    List,
    Detail,
}

impl PageKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::List => "list",
            Self::Detail => "detail",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "form" => Some(Self::Form),
            "list" => Some(Self::List),
            "detail" => Some(Self::Detail),
            _ => None,
        }
    }
}

/// Where in a job a raw page was fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub kind: PageKind,
    pub search_mode: SearchMode,
    pub target: String,
    pub page_index: u32,
    pub endpoint: EndpointClass,
}

/// A received response, ready for the audit table
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub context: PageContext,
    pub fetched_at: DateTime<Utc>,
}

/// A raw page read back from the audit table
#[derive(Debug, Clone)]
pub struct StoredRawPage {
    pub id: i64,
    pub url: String,
    pub method: String,
    pub status: u16,
    pub body: String,
    pub body_hash: String,
    pub kind: PageKind,
    pub search_mode: Option<SearchMode>,
    pub target: String,
    pub page_index: u32,
    pub fetched_at: String,
}

/// Selection of raw pages for offline processing, newest first
#[derive(Debug, Clone, Default)]
pub struct RawPageFilter {
    pub kind: Option<PageKind>,
    pub search_mode: Option<SearchMode>,
    pub limit: Option<u32>,
    pub skip: u32,
}

/// Result of a record upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
