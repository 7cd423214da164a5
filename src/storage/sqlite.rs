//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::{CaseRecord, SearchMode};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    body_hash, PageKind, RawPage, RawPageFilter, RunRecord, RunStatus, StoredRawPage,
    UpsertOutcome,
};
use crate::CrawlError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, search_mode, target, status, records, fetches";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        search_mode: row.get(4)?,
        target: row.get(5)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(6)?).unwrap_or(RunStatus::Failed),
        records: row.get(7)?,
        fetches: row.get(8)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(
        &mut self,
        config_hash: &str,
        search_mode: SearchMode,
        target: &str,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, search_mode, target, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                now,
                config_hash,
                search_mode.as_str(),
                target,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        Ok(self.conn.query_row(&sql, [], run_from_row).optional()?)
    }

    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        records: u32,
        fetches: u32,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, records = ?3, fetches = ?4
             WHERE id = ?5",
            params![status.to_db_string(), now, records, fetches, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Raw Pages =====

    fn insert_raw_page(&mut self, page: &RawPage) -> StorageResult<i64> {
        let headers = serde_json::to_string(&page.headers)?;
        self.conn.execute(
            "INSERT INTO raw_pages
             (url, method, status_code, headers, body, body_hash, kind, search_mode, target,
              page_index, endpoint, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                page.url,
                page.method,
                page.status,
                headers,
                page.body,
                body_hash(&page.body),
                page.context.kind.to_db_string(),
                page.context.search_mode.as_str(),
                page.context.target,
                page.context.page_index,
                page.context.endpoint.as_str(),
                page.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_raw_pages(&self, filter: &RawPageFilter) -> StorageResult<Vec<StoredRawPage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, method, status_code, body, body_hash, kind, search_mode, target,
             page_index, fetched_at
             FROM raw_pages
             WHERE (?1 IS NULL OR kind = ?1) AND (?2 IS NULL OR search_mode = ?2)
             ORDER BY fetched_at DESC, id DESC
             LIMIT ?3 OFFSET ?4",
        )?;

        let limit = filter.limit.map_or(-1, i64::from);
        let rows = stmt.query_map(
            params![
                filter.kind.map(|k| k.to_db_string()),
                filter.search_mode.map(|m| m.as_str()),
                limit,
                filter.skip,
            ],
            |row| {
                let kind: String = row.get(6)?;
                let search_mode: String = row.get(7)?;
                Ok((
                    StoredRawPage {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        method: row.get(2)?,
                        status: row.get(3)?,
                        body: row.get(4)?,
                        body_hash: row.get(5)?,
                        kind: PageKind::Form,
                        search_mode: SearchMode::from_db_string(&search_mode),
                        target: row.get(8)?,
                        page_index: row.get(9)?,
                        fetched_at: row.get(10)?,
                    },
                    kind,
                ))
            },
        )?;

        let mut pages = Vec::new();
        for row in rows {
            let (mut page, kind) = row?;
            page.kind = PageKind::from_db_string(&kind).ok_or_else(|| {
                StorageError::Database(format!("unknown page kind '{}' (row {})", kind, page.id))
            })?;
            pages.push(page);
        }

        Ok(pages)
    }

    // ===== Case Records =====

    fn upsert_record(&mut self, record: &CaseRecord) -> StorageResult<UpsertOutcome> {
        let parties = serde_json::to_string(&record.parties)?;
        let movements = serde_json::to_string(&record.movements)?;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM case_records WHERE canonical_id = ?1",
                params![record.canonical_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        tx.execute(
            "INSERT INTO case_records
             (canonical_id, legacy_number, filed_on, rapporteur, parties, movements, source_url,
              scraped_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(canonical_id) DO UPDATE SET
                legacy_number = excluded.legacy_number,
                filed_on = excluded.filed_on,
                rapporteur = excluded.rapporteur,
                parties = excluded.parties,
                movements = excluded.movements,
                source_url = excluded.source_url,
                scraped_at = excluded.scraped_at,
                updated_at = excluded.updated_at",
            params![
                record.canonical_id,
                record.legacy_number,
                record.filed_on,
                record.rapporteur,
                parties,
                movements,
                record.source_url,
                record.scraped_at.to_rfc3339(),
                now,
            ],
        )?;
        tx.commit()?;

        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn get_record(&self, canonical_id: &str) -> StorageResult<Option<CaseRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT canonical_id, legacy_number, filed_on, rapporteur, parties, movements,
                 source_url, scraped_at
                 FROM case_records WHERE canonical_id = ?1",
                params![canonical_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, legacy, filed_on, rapporteur, parties, movements, source_url, scraped)) =
            row
        else {
            return Ok(None);
        };

        let scraped_at = scraped
            .parse::<DateTime<Utc>>()
            .map_err(|e| StorageError::Database(format!("bad scraped_at for {}: {}", id, e)))?;

        Ok(Some(CaseRecord {
            canonical_id: id,
            legacy_number: legacy,
            filed_on,
            rapporteur,
            parties: serde_json::from_str(&parties)?,
            movements: serde_json::from_str(&movements)?,
            source_url,
            scraped_at,
        }))
    }

    // ===== Statistics =====

    fn count_runs_by_status(&self) -> StorageResult<HashMap<RunStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM runs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = RunStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }

    fn count_raw_pages_by_kind(&self) -> StorageResult<HashMap<PageKind, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM raw_pages GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (kind, count) = row?;
            if let Some(kind) = PageKind::from_db_string(&kind) {
                counts.insert(kind, count as u64);
            }
        }
        Ok(counts)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM case_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
