//! Study block persistence — a thin wrapper over SQLite.
//!
//! The store owns the `study_blocks` table and exposes exactly the queries
//! the service and dispatcher need: insert, list-by-owner, delete-by-owner,
//! overlap lookup, due-notification lookup, and the conditional sent-flag
//! update. Instants are stored as RFC 3339 UTC strings with second
//! precision, so string comparison in SQL is chronological.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

use studybell_core::error::{Result, StudybellError};

/// Status label assigned at creation. No automated transitions.
pub const STATUS_UPCOMING: &str = "upcoming";

/// A persisted study block.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StudyBlock {
    pub id: String,
    pub owner_id: String,
    pub owner_email: String,
    pub subject: String,
    pub duration_minutes: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub notification_time: DateTime<Utc>,
    pub notification_sent: bool,
    pub notification_sent_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Fields the service computes before handing a block to the store.
/// The store generates `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewStudyBlock {
    pub owner_id: String,
    pub owner_email: String,
    pub subject: String,
    pub duration_minutes: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub notification_time: DateTime<Utc>,
}

/// Block store — SQLite behind a mutex, one connection per process.
pub struct BlockStore {
    conn: Mutex<Connection>,
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

const BLOCK_COLUMNS: &str = "id, owner_id, owner_email, subject, duration_minutes, \
     start_time, end_time, notification_time, notification_sent, \
     notification_sent_at, status, created_at";

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudyBlock> {
    let sent_at: Option<String> = row.get(9)?;
    let notification_sent_at = match sent_at {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        9,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
        ),
        None => None,
    };
    Ok(StudyBlock {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_email: row.get(2)?,
        subject: row.get(3)?,
        duration_minutes: row.get(4)?,
        start_time: ts_col(row, 5)?,
        end_time: ts_col(row, 6)?,
        notification_time: ts_col(row, 7)?,
        notification_sent: row.get::<_, i32>(8)? != 0,
        notification_sent_at,
        status: row.get(10)?,
        created_at: ts_col(row, 11)?,
    })
}

impl BlockStore {
    /// Open or create the block database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StudybellError::Store(format!("open: {e}")))?;

        // WAL keeps reads cheap while the dispatcher writes
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| StudybellError::Store(format!("lock: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS study_blocks (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                owner_email TEXT NOT NULL,
                subject TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                notification_time TEXT NOT NULL,
                notification_sent INTEGER NOT NULL DEFAULT 0,
                notification_sent_at TEXT,
                status TEXT NOT NULL DEFAULT 'upcoming',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_blocks_owner ON study_blocks(owner_id, start_time);
            CREATE INDEX IF NOT EXISTS idx_blocks_due
                ON study_blocks(notification_sent, notification_time);",
        )
        .map_err(|e| StudybellError::Store(format!("migrate: {e}")))?;
        Ok(())
    }

    /// Insert a new block and return the generated id.
    pub fn insert(&self, block: &NewStudyBlock) -> Result<String> {
        let conn = self.conn.lock().map_err(|e| StudybellError::Store(format!("lock: {e}")))?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO study_blocks (id, owner_id, owner_email, subject, duration_minutes,
                start_time, end_time, notification_time, notification_sent, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10)",
            params![
                id,
                block.owner_id,
                block.owner_email,
                block.subject,
                block.duration_minutes as i64,
                ts(block.start_time),
                ts(block.end_time),
                ts(block.notification_time),
                STATUS_UPCOMING,
                ts(Utc::now()),
            ],
        )
        .map_err(|e| StudybellError::Store(format!("insert: {e}")))?;
        Ok(id)
    }

    /// All blocks for an owner, ordered by start time ascending.
    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<StudyBlock>> {
        let conn = self.conn.lock().map_err(|e| StudybellError::Store(format!("lock: {e}")))?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {BLOCK_COLUMNS} FROM study_blocks WHERE owner_id=?1 ORDER BY start_time"
            ))
            .map_err(|e| StudybellError::Store(format!("prepare: {e}")))?;
        let blocks = stmt
            .query_map(params![owner_id], row_to_block)
            .map_err(|e| StudybellError::Store(format!("query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StudybellError::Store(format!("row: {e}")))?;
        Ok(blocks)
    }

    /// Delete a block only if it belongs to the owner. Returns whether a
    /// row was removed; an id owned by someone else deletes nothing.
    pub fn delete_owned(&self, owner_id: &str, block_id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| StudybellError::Store(format!("lock: {e}")))?;
        let changed = conn
            .execute(
                "DELETE FROM study_blocks WHERE id=?1 AND owner_id=?2",
                params![block_id, owner_id],
            )
            .map_err(|e| StudybellError::Store(format!("delete: {e}")))?;
        Ok(changed > 0)
    }

    /// First existing block of the owner whose `[start, end)` interval
    /// intersects the given one. Touching endpoints do not intersect.
    pub fn find_overlapping(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<StudyBlock>> {
        let conn = self.conn.lock().map_err(|e| StudybellError::Store(format!("lock: {e}")))?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {BLOCK_COLUMNS} FROM study_blocks
                 WHERE owner_id=?1 AND (
                     (start_time <= ?2 AND end_time > ?2) OR
                     (start_time < ?3 AND end_time >= ?3) OR
                     (start_time >= ?2 AND end_time <= ?3)
                 )
                 ORDER BY start_time LIMIT 1"
            ))
            .map_err(|e| StudybellError::Store(format!("prepare: {e}")))?;
        let mut rows = stmt
            .query_map(params![owner_id, ts(start), ts(end)], row_to_block)
            .map_err(|e| StudybellError::Store(format!("query: {e}")))?;
        match rows.next() {
            Some(Ok(block)) => Ok(Some(block)),
            Some(Err(e)) => Err(StudybellError::Store(format!("row: {e}"))),
            None => Ok(None),
        }
    }

    /// Blocks whose reminder is due: unsent, notification time reached,
    /// start still in the future. A block whose start has passed is never
    /// returned, so it is never notified late.
    pub fn due_unsent(&self, now: DateTime<Utc>) -> Result<Vec<StudyBlock>> {
        let conn = self.conn.lock().map_err(|e| StudybellError::Store(format!("lock: {e}")))?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {BLOCK_COLUMNS} FROM study_blocks
                 WHERE notification_sent=0 AND notification_time <= ?1 AND start_time > ?1
                 ORDER BY notification_time"
            ))
            .map_err(|e| StudybellError::Store(format!("prepare: {e}")))?;
        let blocks = stmt
            .query_map(params![ts(now)], row_to_block)
            .map_err(|e| StudybellError::Store(format!("query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StudybellError::Store(format!("row: {e}")))?;
        Ok(blocks)
    }

    /// Conditionally flip the sent flag false→true. Returns false when the
    /// flag was already set — the claim went to a concurrent run — so the
    /// transition happens at most once per block and never reverts.
    pub fn mark_sent(&self, block_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| StudybellError::Store(format!("lock: {e}")))?;
        let changed = conn
            .execute(
                "UPDATE study_blocks
                 SET notification_sent=1, notification_sent_at=?2
                 WHERE id=?1 AND notification_sent=0",
                params![block_id, ts(at)],
            )
            .map_err(|e| StudybellError::Store(format!("mark sent: {e}")))?;
        Ok(changed > 0)
    }

    /// Total number of blocks in the store (dispatcher summary).
    pub fn total_blocks(&self) -> Result<i64> {
        let conn = self.conn.lock().map_err(|e| StudybellError::Store(format!("lock: {e}")))?;
        conn.query_row("SELECT COUNT(*) FROM study_blocks", [], |r| r.get(0))
            .map_err(|e| StudybellError::Store(format!("count: {e}")))
    }
}
