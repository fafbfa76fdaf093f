//! SQLite persistence for attestation records.
//!
//! Rows hold claims exactly as validated plus a status column that is only
//! ever a cache; trust is recomputed on every read by the service.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use vescrow_core::attestation::{signature_hex, Completion, StatusReport, TaskStatus};

use crate::error::{Result, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    chain_id       INTEGER NOT NULL,
    agreement_id   INTEGER NOT NULL,
    status         TEXT    NOT NULL DEFAULT 'pending',
    worker         TEXT,
    tx_hash        TEXT,
    completed_at   INTEGER,
    target         TEXT,
    key            TEXT,
    value          TEXT,
    signature      TEXT,
    dispute_reason TEXT,
    PRIMARY KEY (chain_id, agreement_id)
);
";

/// One stored attestation row. Any claim column may be missing, e.g. for a
/// key that was disputed before a claim ever arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub chain_id: u64,
    pub agreement_id: u64,
    pub status: TaskStatus,
    pub worker: Option<String>,
    pub tx_hash: Option<String>,
    pub completed_at: Option<u64>,
    pub target: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub signature: Option<String>,
    pub dispute_reason: Option<String>,
}

impl TaskRecord {
    /// Wire form of this record under `status`.
    pub fn report(&self, status: TaskStatus) -> StatusReport {
        StatusReport {
            chain_id: self.chain_id,
            agreement_id: self.agreement_id,
            status,
            worker: self.worker.clone(),
            tx_hash: self.tx_hash.clone(),
            completed_at: self.completed_at,
            target: self.target.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
            signature: self.signature.clone(),
            dispute_reason: self.dispute_reason.clone(),
        }
    }
}

/// Row as read from SQLite, before range and status checks.
struct RawTask {
    chain_id: i64,
    agreement_id: i64,
    status: String,
    worker: Option<String>,
    tx_hash: Option<String>,
    completed_at: Option<i64>,
    target: Option<String>,
    key: Option<String>,
    value: Option<String>,
    signature: Option<String>,
    dispute_reason: Option<String>,
}

impl RawTask {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            chain_id: row.get("chain_id")?,
            agreement_id: row.get("agreement_id")?,
            status: row.get("status")?,
            worker: row.get("worker")?,
            tx_hash: row.get("tx_hash")?,
            completed_at: row.get("completed_at")?,
            target: row.get("target")?,
            key: row.get("key")?,
            value: row.get("value")?,
            signature: row.get("signature")?,
            dispute_reason: row.get("dispute_reason")?,
        })
    }
}

impl TryFrom<RawTask> for TaskRecord {
    type Error = StoreError;

    fn try_from(raw: RawTask) -> Result<Self> {
        Ok(Self {
            chain_id: from_sql("chain_id", raw.chain_id)?,
            agreement_id: from_sql("agreement_id", raw.agreement_id)?,
            status: parse_status(&raw.status)?,
            worker: raw.worker,
            tx_hash: raw.tx_hash,
            completed_at: raw
                .completed_at
                .map(|v| from_sql("completed_at", v))
                .transpose()?,
            target: raw.target,
            key: raw.key,
            value: raw.value,
            signature: raw.signature,
            dispute_reason: raw.dispute_reason,
        })
    }
}

/// Attestation table behind a single connection.
///
/// The lock is never held across an `.await`: every method is synchronous
/// and returns owned data.
pub struct TaskRepository {
    conn: Mutex<Connection>,
}

impl TaskRepository {
    /// Opens (creating if needed) the database at `path`; `:memory:` opens a
    /// private in-memory database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts or replaces the claim for its key, resetting the cached
    /// status to `pending`. A disputed key stays disputed.
    pub fn upsert_claim(&self, claim: &Completion) -> Result<TaskStatus> {
        let chain_id = to_sql(claim.chain_id)?;
        let agreement_id = to_sql(claim.agreement_id)?;
        let completed_at = to_sql(claim.completed_at)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tasks
                (chain_id, agreement_id, status, worker, tx_hash, completed_at,
                 target, key, value, signature)
             VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (chain_id, agreement_id) DO UPDATE SET
                status = CASE WHEN tasks.status = 'disputed' THEN 'disputed' ELSE 'pending' END,
                worker = excluded.worker,
                tx_hash = excluded.tx_hash,
                completed_at = excluded.completed_at,
                target = excluded.target,
                key = excluded.key,
                value = excluded.value,
                signature = excluded.signature",
            params![
                chain_id,
                agreement_id,
                format!("{:#x}", claim.worker),
                format!("{:#x}", claim.tx_hash),
                completed_at,
                format!("{:#x}", claim.target),
                claim.key,
                claim.value,
                signature_hex(&claim.signature),
            ],
        )?;
        let status: String = conn.query_row(
            "SELECT status FROM tasks WHERE chain_id = ?1 AND agreement_id = ?2",
            params![chain_id, agreement_id],
            |row| row.get(0),
        )?;
        debug!(
            chain_id = claim.chain_id,
            agreement_id = claim.agreement_id,
            %status,
            "Claim stored"
        );
        parse_status(&status)
    }

    pub fn get(&self, chain_id: u64, agreement_id: u64) -> Result<Option<TaskRecord>> {
        let raw = self
            .conn
            .lock()
            .query_row(
                "SELECT * FROM tasks WHERE chain_id = ?1 AND agreement_id = ?2",
                params![to_sql(chain_id)?, to_sql(agreement_id)?],
                RawTask::from_row,
            )
            .optional()?;
        raw.map(TaskRecord::try_from).transpose()
    }

    /// Marks the key disputed, creating the row if needed. Terminal.
    pub fn mark_disputed(
        &self,
        chain_id: u64,
        agreement_id: u64,
        reason: Option<&str>,
    ) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO tasks (chain_id, agreement_id, status, dispute_reason)
             VALUES (?1, ?2, 'disputed', ?3)
             ON CONFLICT (chain_id, agreement_id) DO UPDATE SET
                status = 'disputed',
                dispute_reason = excluded.dispute_reason",
            params![to_sql(chain_id)?, to_sql(agreement_id)?, reason],
        )?;
        Ok(())
    }

    /// Caches a freshly computed status. Never touches a disputed row.
    pub fn cache_status(&self, chain_id: u64, agreement_id: u64, status: TaskStatus) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE tasks SET status = ?3
             WHERE chain_id = ?1 AND agreement_id = ?2 AND status != 'disputed'",
            params![to_sql(chain_id)?, to_sql(agreement_id)?, status.as_str()],
        )?;
        Ok(())
    }
}

fn to_sql(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange(value))
}

fn from_sql(column: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn parse_status(status: &str) -> Result<TaskStatus> {
    status
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown status `{status}`")))
}
