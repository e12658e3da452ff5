//! SQLite archive store for the sync engine.
//!
//! This crate owns schema creation/migrations and is the sole writer of
//! archived state. Every public method opens its own connection — there is
//! no held connection or process-global singleton, so tests and multiple
//! engine instances can each construct their own `Storage` value.

mod cursors;
mod emails;
mod integrity;
mod mailboxes;
mod schema;
mod search;
mod stats;
mod threads;
mod tokens;

#[cfg(test)]
mod integration_tests;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rusqlite::Connection;
use sync_engine_core::error::ErrorTaxon;
use thiserror::Error;

pub use cursors::*;
pub use emails::*;
pub use integrity::*;
pub use mailboxes::*;
pub use search::*;
pub use stats::*;
pub use threads::*;
pub use tokens::*;

const PRAGMA_JOURNAL_MODE_WAL: &str = "WAL";
const PRAGMA_SYNCHRONOUS_NORMAL: &str = "NORMAL";
const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("time parse error: {0}")]
    Time(#[from] time::error::Parse),

    #[error("unsupported schema version {found} (supported: {supported})")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },

    #[error("integrity violation: {0}")]
    Integrity(String),
}

impl StorageError {
    pub fn taxon(&self) -> ErrorTaxon {
        match self {
            StorageError::Integrity(_) => ErrorTaxon::IntegrityViolation,
            _ => ErrorTaxon::StoreUnavailable,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct Storage {
    db_path: PathBuf,
}

impl Storage {
    pub fn open_or_create(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        create_parent_dir_if_needed(&db_path)?;

        let storage = Self { db_path };
        let mut conn = storage.open_connection()?;
        schema::migrate(&mut conn)?;
        Ok(storage)
    }

    pub fn open_in_memory_for_tests() -> StorageResult<Self> {
        // A bare `:memory:` URI opens a fresh, separate database per
        // connection, but this abstraction opens a new connection per
        // call. A uniquely named temp file gives predictable test
        // behavior while keeping every caller on the same database.
        let db_path = test_db_path();
        create_parent_dir_if_needed(&db_path)?;
        let storage = Self { db_path };
        let mut conn = storage.open_connection()?;
        schema::migrate(&mut conn)?;
        Ok(storage)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn schema_version(&self) -> StorageResult<i64> {
        let conn = self.open_connection()?;
        schema::get_schema_version(&conn).map(|v| v.unwrap_or(0))
    }

    pub(crate) fn open_connection(&self) -> StorageResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(DB_BUSY_TIMEOUT)?;
        apply_connection_pragmas(&conn)?;
        Ok(conn)
    }
}

fn apply_connection_pragmas(conn: &Connection) -> StorageResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "journal_mode", PRAGMA_JOURNAL_MODE_WAL)?;
    conn.pragma_update(None, "synchronous", PRAGMA_SYNCHRONOUS_NORMAL)?;
    Ok(())
}

fn create_parent_dir_if_needed(db_path: &Path) -> StorageResult<()> {
    let Some(parent) = db_path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent)?;
    Ok(())
}

fn test_db_path() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("sync_engine_test_{pid}_{nanos}_{counter}.sqlite3"))
}

pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .expect("RFC 3339 formatting of current time cannot fail")
}

pub(crate) fn format_rfc3339(value: time::OffsetDateTime) -> String {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .expect("RFC 3339 formatting cannot fail for a valid OffsetDateTime")
}

pub(crate) fn parse_rfc3339(value: &str) -> StorageResult<time::OffsetDateTime> {
    Ok(time::OffsetDateTime::parse(
        value,
        &time::format_description::well_known::Rfc3339,
    )?)
}

pub(crate) fn parse_rfc3339_opt(value: Option<String>) -> StorageResult<Option<time::OffsetDateTime>> {
    value.map(|v| parse_rfc3339(&v)).transpose()
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64) -> bool {
    value != 0
}

pub(crate) fn json_encode<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn json_decode<T: serde::de::DeserializeOwned + Default>(
    value: Option<String>,
) -> StorageResult<T> {
    match value {
        None => Ok(T::default()),
        Some(raw) => Ok(serde_json::from_str(&raw)?),
    }
}
