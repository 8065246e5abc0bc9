//! `SQLite`-backed audit sink (one row per request, outcome updated in place).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cee_core::{JobId, Mode, RequestId};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use super::{AuditDecision, AuditError, AuditOutcome, AuditRecord, AuditSink, OutcomeUpdate};

type ConnectionPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_records (
    request_id TEXT PRIMARY KEY,
    timestamp  TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    mode       TEXT NOT NULL,
    decision   TEXT NOT NULL CHECK (decision IN ('authorized', 'denied', 'unknown_mode')),
    outcome    TEXT NOT NULL CHECK (outcome IN ('pending', 'completed', 'failed', 'cancelled')),
    job_id     TEXT,
    detail     TEXT,
    updated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_records (user_id, timestamp);
";

/// Runs on each new pooled connection.
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
    }
}

/// Audit sink persisting to a `SQLite` database through an r2d2 pool.
#[derive(Clone)]
pub struct SqliteAuditSink {
    pool: ConnectionPool,
}

impl SqliteAuditSink {
    /// Open (creating if needed) a database file.
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuditError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        Self::with_manager(SqliteConnectionManager::file(path), 4)
    }

    /// Private in-memory database (single connection, so all writes share it).
    pub fn in_memory() -> Result<Self, AuditError> {
        Self::with_manager(SqliteConnectionManager::memory(), 1)
    }

    fn with_manager(manager: SqliteConnectionManager, size: u32) -> Result<Self, AuditError> {
        let pool = Pool::builder()
            .max_size(size)
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(PragmaCustomizer {
                busy_timeout_ms: 5_000,
            }))
            .build(manager)?;
        pool.get()?.execute_batch(SCHEMA)?;
        Ok(Self { pool })
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize, AuditError> {
        let conn = self.pool.get()?;
        let n: i64 = conn.query_row("SELECT count(*) FROM audit_records", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Record for `request_id`.
    pub fn get(&self, request_id: &RequestId) -> Result<Option<AuditRecord>, AuditError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT request_id, timestamp, user_id, mode, decision, outcome, job_id, detail
                 FROM audit_records WHERE request_id = ?1",
                params![request_id.as_str()],
                row_to_record,
            )
            .optional()?;
        Ok(row)
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT request_id, timestamp, user_id, mode, decision, outcome, job_id, detail
             FROM audit_records ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert(conn: &Connection, record: &AuditRecord) -> Result<(), AuditError> {
        let _ = conn.execute(
            "INSERT INTO audit_records
                (request_id, timestamp, user_id, mode, decision, outcome, job_id, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.request_id.as_str(),
                record.timestamp.to_rfc3339(),
                record.user_id,
                record.mode.as_str(),
                record.decision.as_str(),
                record.outcome.as_str(),
                record.job_id.as_ref().map(JobId::as_str),
                record.detail,
            ],
        )?;
        Ok(())
    }

    fn update_outcome(conn: &Connection, update: &OutcomeUpdate) -> Result<(), AuditError> {
        let changed = conn.execute(
            "UPDATE audit_records
             SET outcome = ?2, detail = COALESCE(?3, detail), updated_at = ?4
             WHERE request_id = ?1",
            params![
                update.request_id.as_str(),
                update.outcome.as_str(),
                update.detail,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(AuditError::NotFound(update.request_id.clone()));
        }
        Ok(())
    }

    async fn with_conn<F>(&self, f: F) -> Result<(), AuditError>
    where
        F: FnOnce(&Connection) -> Result<(), AuditError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| AuditError::Unavailable(format!("audit task failed: {e}")))?
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    let request_id: String = row.get(0)?;
    let timestamp: String = row.get(1)?;
    let mode: String = row.get(3)?;
    let decision: String = row.get(4)?;
    let outcome: String = row.get(5)?;
    let job_id: Option<String> = row.get(6)?;
    Ok(AuditRecord {
        request_id: RequestId::from_string(request_id),
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_or_else(|_| Utc::now(), |t| t.with_timezone(&Utc)),
        user_id: row.get(2)?,
        mode: Mode::from_name(&mode),
        decision: AuditDecision::parse(&decision).unwrap_or(AuditDecision::Denied),
        outcome: AuditOutcome::parse(&outcome).unwrap_or(AuditOutcome::Failed),
        job_id: job_id.map(JobId::from_string),
        detail: row.get(7)?,
    })
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.with_conn(move |conn| Self::insert(conn, &record)).await
    }

    async fn record_outcome(&self, update: OutcomeUpdate) -> Result<(), AuditError> {
        self.with_conn(move |conn| Self::update_outcome(conn, &update))
            .await
    }
}
