//! Ledger trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::error::LedgerError;
use super::schema;
use super::types::{CaptureRecord, CaptureStatus, LedgerSummary};
use crate::types::{AssetId, EventId, MediaReference, SubjectId};

/// Records the progress of capture runs, keyed by run id.
///
/// Updates for an unknown run id are silently ignored.
#[async_trait]
pub trait CaptureLedger: Send + Sync {
    /// Start a run whose camera produced `local_path`.
    async fn record_captured(
        &self,
        run_id: Uuid,
        event_id: &EventId,
        local_path: &Path,
    ) -> Result<(), LedgerError>;

    /// Record a run whose shutter produced nothing.
    async fn record_cancelled(&self, run_id: Uuid, event_id: &EventId) -> Result<(), LedgerError>;

    async fn mark_uploaded(
        &self,
        run_id: Uuid,
        media_reference: &MediaReference,
    ) -> Result<(), LedgerError>;

    async fn mark_upload_failed(&self, run_id: Uuid, error: &str) -> Result<(), LedgerError>;

    async fn mark_registered(
        &self,
        run_id: Uuid,
        subject: &SubjectId,
        asset_id: &AssetId,
    ) -> Result<(), LedgerError>;

    /// `subject` is `None` when registration failed for lack of an identity.
    async fn mark_registration_failed(
        &self,
        run_id: Uuid,
        subject: Option<&SubjectId>,
        error: &str,
    ) -> Result<(), LedgerError>;

    async fn get_summary(&self) -> Result<LedgerSummary, LedgerError>;

    /// Runs whose media was uploaded but never registered, newest first.
    async fn get_orphaned(&self) -> Result<Vec<CaptureRecord>, LedgerError>;

    /// The `limit` most recent runs, newest first.
    async fn get_recent(&self, limit: u32) -> Result<Vec<CaptureRecord>, LedgerError>;
}

const SELECT_COLUMNS: &str = "SELECT run_id, event_id, subject, local_path, media_reference, asset_id, status, last_error, created_at, updated_at FROM captures";

pub struct SqliteLedger {
    /// rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteLedger {
    /// Open or create the ledger at `path`.
    pub async fn open(path: &Path) -> Result<Self, LedgerError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let open_failed = |source| LedgerError::Open {
                path: path_clone.clone(),
                source,
            };
            let conn = Connection::open(&path_clone).map_err(open_failed)?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(open_failed)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(open_failed)?;
            schema::migrate(&conn)?;
            Ok::<_, LedgerError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().map_err(|e| LedgerError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    fn select(
        &self,
        op: &'static str,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<CaptureRecord>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} {filter}"))
            .map_err(LedgerError::query(op))?;
        let records = stmt
            .query_map(params, |row| Ok(row_to_capture_record(row)))
            .map_err(LedgerError::query(op))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(LedgerError::query(op))?;
        Ok(records)
    }

    fn count(conn: &Connection, status: CaptureStatus) -> Result<u64, LedgerError> {
        let n = conn
            .query_row(
                "SELECT COUNT(*) FROM captures WHERE status = ?1",
                [status.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map_err(LedgerError::query("status count"))?;
        Ok(n as u64)
    }
}

#[async_trait]
impl CaptureLedger for SqliteLedger {
    async fn record_captured(
        &self,
        run_id: Uuid,
        event_id: &EventId,
        local_path: &Path,
    ) -> Result<(), LedgerError> {
        let now = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO captures (run_id, event_id, local_path, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![
                run_id.to_string(),
                event_id.as_str(),
                local_path.to_string_lossy(),
                CaptureStatus::Captured.as_str(),
                now,
            ],
        )
        .map_err(LedgerError::query("record captured"))?;
        Ok(())
    }

    async fn record_cancelled(&self, run_id: Uuid, event_id: &EventId) -> Result<(), LedgerError> {
        let now = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO captures (run_id, event_id, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![
                run_id.to_string(),
                event_id.as_str(),
                CaptureStatus::Cancelled.as_str(),
                now,
            ],
        )
        .map_err(LedgerError::query("record cancelled"))?;
        Ok(())
    }

    async fn mark_uploaded(
        &self,
        run_id: Uuid,
        media_reference: &MediaReference,
    ) -> Result<(), LedgerError> {
        let now = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE captures SET status = ?1, media_reference = ?2, updated_at = ?3 WHERE run_id = ?4",
            rusqlite::params![
                CaptureStatus::Uploaded.as_str(),
                media_reference.as_str(),
                now,
                run_id.to_string(),
            ],
        )
        .map_err(LedgerError::query("mark uploaded"))?;
        Ok(())
    }

    async fn mark_upload_failed(&self, run_id: Uuid, error: &str) -> Result<(), LedgerError> {
        let now = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE captures SET status = ?1, last_error = ?2, updated_at = ?3 WHERE run_id = ?4",
            rusqlite::params![
                CaptureStatus::UploadFailed.as_str(),
                error,
                now,
                run_id.to_string(),
            ],
        )
        .map_err(LedgerError::query("mark upload failed"))?;
        Ok(())
    }

    async fn mark_registered(
        &self,
        run_id: Uuid,
        subject: &SubjectId,
        asset_id: &AssetId,
    ) -> Result<(), LedgerError> {
        let now = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE captures SET status = ?1, subject = ?2, asset_id = ?3, last_error = NULL, updated_at = ?4 WHERE run_id = ?5",
            rusqlite::params![
                CaptureStatus::Registered.as_str(),
                subject.as_str(),
                asset_id.as_str(),
                now,
                run_id.to_string(),
            ],
        )
        .map_err(LedgerError::query("mark registered"))?;
        Ok(())
    }

    async fn mark_registration_failed(
        &self,
        run_id: Uuid,
        subject: Option<&SubjectId>,
        error: &str,
    ) -> Result<(), LedgerError> {
        let now = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE captures SET status = ?1, subject = ?2, last_error = ?3, updated_at = ?4 WHERE run_id = ?5",
            rusqlite::params![
                CaptureStatus::RegistrationFailed.as_str(),
                subject.map(SubjectId::as_str),
                error,
                now,
                run_id.to_string(),
            ],
        )
        .map_err(LedgerError::query("mark registration failed"))?;
        Ok(())
    }

    async fn get_summary(&self) -> Result<LedgerSummary, LedgerError> {
        let conn = self.lock()?;

        let total = conn
            .query_row("SELECT COUNT(*) FROM captures", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(LedgerError::query("summary"))? as u64;

        let in_progress = conn
            .query_row(
                "SELECT COUNT(*) FROM captures WHERE status IN ('captured', 'uploaded')",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(LedgerError::query("summary"))? as u64;

        let last_capture_at: Option<i64> = conn
            .query_row("SELECT MAX(created_at) FROM captures", [], |row| row.get(0))
            .map_err(LedgerError::query("summary"))?;

        Ok(LedgerSummary {
            total,
            registered: Self::count(&conn, CaptureStatus::Registered)?,
            cancelled: Self::count(&conn, CaptureStatus::Cancelled)?,
            upload_failed: Self::count(&conn, CaptureStatus::UploadFailed)?,
            registration_failed: Self::count(&conn, CaptureStatus::RegistrationFailed)?,
            in_progress,
            last_capture_at: last_capture_at.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }

    async fn get_orphaned(&self) -> Result<Vec<CaptureRecord>, LedgerError> {
        self.select(
            "orphaned lookup",
            "WHERE media_reference IS NOT NULL AND status IN ('uploaded', 'registration_failed') ORDER BY created_at DESC, rowid DESC",
            rusqlite::params![],
        )
    }

    async fn get_recent(&self, limit: u32) -> Result<Vec<CaptureRecord>, LedgerError> {
        self.select(
            "recent lookup",
            "ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            rusqlite::params![limit],
        )
    }
}

fn row_to_capture_record(row: &rusqlite::Row<'_>) -> CaptureRecord {
    let run_id: String = row.get(0).unwrap_or_default();
    let local_path: Option<String> = optional_text(row, 3);
    let status: String = row.get(6).unwrap_or_default();
    let created_at: i64 = row.get(8).unwrap_or(0);
    let updated_at: i64 = row.get(9).unwrap_or(0);

    CaptureRecord {
        run_id: Uuid::parse_str(&run_id).unwrap_or(Uuid::nil()),
        event_id: row.get(1).unwrap_or_default(),
        subject: optional_text(row, 2),
        local_path: local_path.map(PathBuf::from),
        media_reference: optional_text(row, 4),
        asset_id: optional_text(row, 5),
        last_error: optional_text(row, 7),
        created_at: timestamp(created_at),
        updated_at: timestamp(updated_at),
        status: CaptureStatus::from_str(&status).unwrap_or(CaptureStatus::Captured),
    }
}

fn optional_text(row: &rusqlite::Row<'_>, idx: usize) -> Option<String> {
    row.get::<_, Option<String>>(idx).ok().flatten()
}

fn timestamp(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("eventcam")
            .join("ledger_tests")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn e1() -> EventId {
        EventId::new("e1").unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let path = test_dir("open_creates").join("captures.db");
        let ledger = SqliteLedger::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(ledger.path(), path);

        // Reopening an existing ledger is a no-op migration
        drop(ledger);
        SqliteLedger::open(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_directory_is_open_error() {
        let dir = test_dir("open_directory");
        let err = SqliteLedger::open(&dir).await.unwrap_err();
        match err {
            LedgerError::Open { path, .. } => assert_eq!(path, dir),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_successful_run_lifecycle() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let run = Uuid::new_v4();
        ledger
            .record_captured(run, &e1(), Path::new("/tmp/c.jpg"))
            .await
            .unwrap();
        ledger
            .mark_uploaded(run, &MediaReference::new("m1").unwrap())
            .await
            .unwrap();
        assert_eq!(ledger.get_orphaned().await.unwrap().len(), 1);

        ledger
            .mark_registered(
                run,
                &SubjectId::new("u1").unwrap(),
                &AssetId::new("a1").unwrap(),
            )
            .await
            .unwrap();

        let records = ledger.get_recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.run_id, run);
        assert_eq!(record.status, CaptureStatus::Registered);
        assert_eq!(record.event_id, "e1");
        assert_eq!(record.subject.as_deref(), Some("u1"));
        assert_eq!(record.media_reference.as_deref(), Some("m1"));
        assert_eq!(record.asset_id.as_deref(), Some("a1"));
        assert_eq!(record.local_path.as_deref(), Some(Path::new("/tmp/c.jpg")));
        assert!(ledger.get_orphaned().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registration_failure_is_orphaned() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let run = Uuid::new_v4();
        ledger
            .record_captured(run, &e1(), Path::new("/tmp/c.jpg"))
            .await
            .unwrap();
        ledger
            .mark_uploaded(run, &MediaReference::new("m1").unwrap())
            .await
            .unwrap();
        ledger
            .mark_registration_failed(run, None, "No identity available")
            .await
            .unwrap();

        let orphaned = ledger.get_orphaned().await.unwrap();
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].status, CaptureStatus::RegistrationFailed);
        assert_eq!(orphaned[0].media_reference.as_deref(), Some("m1"));
        assert_eq!(
            orphaned[0].last_error.as_deref(),
            Some("No identity available")
        );
        assert!(orphaned[0].subject.is_none());
    }

    #[tokio::test]
    async fn test_upload_failure_is_not_orphaned() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let run = Uuid::new_v4();
        ledger
            .record_captured(run, &e1(), Path::new("/tmp/c.jpg"))
            .await
            .unwrap();
        ledger.mark_upload_failed(run, "HTTP 503").await.unwrap();
        assert!(ledger.get_orphaned().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_summary() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        assert_eq!(ledger.get_summary().await.unwrap(), LedgerSummary::default());

        ledger.record_cancelled(Uuid::new_v4(), &e1()).await.unwrap();

        let failed_upload = Uuid::new_v4();
        ledger
            .record_captured(failed_upload, &e1(), Path::new("/tmp/a.jpg"))
            .await
            .unwrap();
        ledger.mark_upload_failed(failed_upload, "boom").await.unwrap();

        let orphan = Uuid::new_v4();
        ledger
            .record_captured(orphan, &e1(), Path::new("/tmp/b.jpg"))
            .await
            .unwrap();
        ledger
            .mark_uploaded(orphan, &MediaReference::new("m2").unwrap())
            .await
            .unwrap();
        ledger
            .mark_registration_failed(orphan, Some(&SubjectId::new("u1").unwrap()), "500")
            .await
            .unwrap();

        ledger
            .record_captured(Uuid::new_v4(), &e1(), Path::new("/tmp/c.jpg"))
            .await
            .unwrap();

        let summary = ledger.get_summary().await.unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.upload_failed, 1);
        assert_eq!(summary.registration_failed, 1);
        assert_eq!(summary.registered, 0);
        assert_eq!(summary.in_progress, 1);
        assert!(summary.last_capture_at.is_some());
    }

    #[tokio::test]
    async fn test_update_unknown_run_is_ignored() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger
            .mark_upload_failed(Uuid::new_v4(), "nothing")
            .await
            .unwrap();
        assert_eq!(ledger.get_summary().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_get_recent_limit() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        for _ in 0..3 {
            ledger.record_cancelled(Uuid::new_v4(), &e1()).await.unwrap();
        }
        assert_eq!(ledger.get_recent(2).await.unwrap().len(), 2);
    }
}
