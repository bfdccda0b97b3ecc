//! Persistence seam — durable endpoint → status table.
//!
//! The store is seeded from at startup and written on every status
//! transition. All writes are best-effort: the in-memory registry is
//! authoritative and callers only log failures.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use beacon_core::{EndpointIdentity, EndpointRecord, StatusCode, Transport};
use rusqlite::{params, Connection};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create {0}: {1}")]
    CreateDir(std::path::PathBuf, std::io::Error),
}

/// A row of the endpoint table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEndpoint {
    pub record: EndpointRecord,
    pub status: StatusCode,
}

/// Must tolerate concurrent callers.
pub trait PersistenceStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<StoredEndpoint>, StoreError>;

    /// Insert the endpoint if missing, otherwise update its status only.
    fn upsert_status(&self, record: &EndpointRecord, status: StatusCode) -> Result<(), StoreError>;

    /// Point an existing row at a new address (port / locality).
    fn update_address(
        &self,
        identity: &EndpointIdentity,
        record: &EndpointRecord,
    ) -> Result<(), StoreError>;

    fn delete_endpoint(&self, identity: &EndpointIdentity) -> Result<(), StoreError>;

    /// Set every row to `status`. Returns the number of rows touched.
    fn reset_all_statuses(&self, status: StatusCode) -> Result<usize, StoreError>;
}

// ── SQLite ────────────────────────────────────────────────────────────────────

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS endpoints (
    host       TEXT    NOT NULL,
    secure     INTEGER NOT NULL,
    port       INTEGER NOT NULL,
    locality   TEXT    NOT NULL DEFAULT '',
    status     INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (host, secure)
);
";

/// SQLite-backed store. One connection behind a mutex; writes are small and
/// serialised by the store worker anyway.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::CreateDir(parent.to_path_buf(), e))?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl PersistenceStore for SqliteStore {
    fn load_all(&self) -> Result<Vec<StoredEndpoint>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT host, secure, port, locality, status FROM endpoints ORDER BY port")?;
        let rows = stmt.query_map([], |row| {
            let host: String = row.get(0)?;
            let secure: bool = row.get(1)?;
            let port: i64 = row.get(2)?;
            let locality: String = row.get(3)?;
            let status: i64 = row.get(4)?;
            Ok((host, secure, port, locality, status))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (host, secure, port, locality, status) = row?;
            let Ok(port) = u16::try_from(port) else {
                tracing::warn!(host = %host, port, "skipping stored endpoint with invalid port");
                continue;
            };
            out.push(StoredEndpoint {
                record: EndpointRecord::new(host, port, locality, Transport::from_secure(secure)),
                status: StatusCode::from_i64(status).unwrap_or(StatusCode::Invalid),
            });
        }
        Ok(out)
    }

    fn upsert_status(&self, record: &EndpointRecord, status: StatusCode) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO endpoints (host, secure, port, locality, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (host, secure) DO UPDATE
             SET status = excluded.status, updated_at = excluded.updated_at",
            params![
                record.host,
                record.transport.is_secure(),
                i64::from(record.port),
                record.locality,
                status.as_i64(),
                unix_now(),
            ],
        )?;
        Ok(())
    }

    fn update_address(
        &self,
        identity: &EndpointIdentity,
        record: &EndpointRecord,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE endpoints SET port = ?1, locality = ?2, updated_at = ?3
             WHERE host = ?4 AND secure = ?5",
            params![
                i64::from(record.port),
                record.locality,
                unix_now(),
                identity.host,
                identity.secure,
            ],
        )?;
        Ok(())
    }

    fn delete_endpoint(&self, identity: &EndpointIdentity) -> Result<(), StoreError> {
        self.conn().execute(
            "DELETE FROM endpoints WHERE host = ?1 AND secure = ?2",
            params![identity.host, identity.secure],
        )?;
        Ok(())
    }

    fn reset_all_statuses(&self, status: StatusCode) -> Result<usize, StoreError> {
        let n = self.conn().execute(
            "UPDATE endpoints SET status = ?1, updated_at = ?2",
            params![status.as_i64(), unix_now()],
        )?;
        Ok(n)
    }
}
