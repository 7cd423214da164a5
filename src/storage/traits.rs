//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends, the
//! persistence seam used by the orchestrator, and associated error types.

use crate::crawler::{CaseRecord, SearchMode};
use crate::storage::{
    PageKind, RawPage, RawPageFilter, RunRecord, RunStatus, StoredRawPage, UpsertOutcome,
};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    /// * `search_mode` - Search strategy of the job
    /// * `target` - Canonical target value of the job
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(
        &mut self,
        config_hash: &str,
        search_mode: SearchMode,
        target: &str,
    ) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Closes a run with its final status and counters
    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        records: u32,
        fetches: u32,
    ) -> StorageResult<()>;

    // ===== Raw Pages =====

    /// Appends a response to the audit table
    fn insert_raw_page(&mut self, page: &RawPage) -> StorageResult<i64>;

    /// Lists stored raw pages, newest first
    fn list_raw_pages(&self, filter: &RawPageFilter) -> StorageResult<Vec<StoredRawPage>>;

    // ===== Case Records =====

    /// Inserts or replaces a record keyed by its canonical case number
    fn upsert_record(&mut self, record: &CaseRecord) -> StorageResult<UpsertOutcome>;

    /// Gets a record by canonical case number
    fn get_record(&self, canonical_id: &str) -> StorageResult<Option<CaseRecord>>;

    // ===== Statistics =====

    /// Counts runs per status
    fn count_runs_by_status(&self) -> StorageResult<HashMap<RunStatus, u64>>;

    /// Counts raw pages per kind
    fn count_raw_pages_by_kind(&self) -> StorageResult<HashMap<PageKind, u64>>;

    /// Counts stored case records
    fn count_records(&self) -> StorageResult<u64>;
}

/// Persistence seam used by running jobs
///
/// Shared by every job of a session, hence `&self`. Failures are returned
/// so the caller can log and count them; they never steer traversal.
pub trait PersistenceSink: Send + Sync {
    /// Appends a received response to the audit trail
    fn save_raw_page(&self, page: &RawPage) -> StorageResult<()>;

    /// Inserts or updates a case record (last write wins)
    fn upsert_record(&self, record: &CaseRecord) -> StorageResult<UpsertOutcome>;
}

impl<S: Storage + Send> PersistenceSink for Mutex<S> {
    fn save_raw_page(&self, page: &RawPage) -> StorageResult<()> {
        let mut storage = self
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))?;
        storage.insert_raw_page(page).map(|_| ())
    }

    fn upsert_record(&self, record: &CaseRecord) -> StorageResult<UpsertOutcome> {
        let mut storage = self
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))?;
        storage.upsert_record(record)
    }
}
