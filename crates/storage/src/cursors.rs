use rusqlite::{params, OptionalExtension};
use sync_engine_core::model::{SyncCursor, SyncStatus};

use crate::{now_rfc3339, parse_rfc3339, parse_rfc3339_opt, Storage, StorageResult};

impl Storage {
    /// Creates the cursor row for `account_id` if it does not already
    /// exist; idempotent. Returns the (possibly pre-existing) cursor.
    pub fn initialize_cursor(&self, account_id: &str) -> StorageResult<SyncCursor> {
        let conn = self.open_connection()?;
        let now = now_rfc3339();
        conn.execute(
            r#"
            INSERT INTO sync_state (account_id, sync_status, total_emails_synced, created_at, updated_at)
            VALUES (?1, 'idle', 0, ?2, ?2)
            ON CONFLICT(account_id) DO NOTHING
            "#,
            params![account_id, now],
        )?;
        cursor_by_account_id(&conn, account_id)?
            .ok_or_else(|| crate::StorageError::Integrity(format!("cursor for {account_id} missing after init")))
    }

    /// Advances `last_sync_token`, adds `emails_added` to the running
    /// total, and sets `sync_status`. Called only after the corresponding
    /// batch has been durably persisted.
    pub fn advance_cursor(
        &self,
        account_id: &str,
        new_state: Option<&str>,
        emails_added: i64,
        status: SyncStatus,
    ) -> StorageResult<SyncCursor> {
        let conn = self.open_connection()?;
        conn.execute(
            r#"
            UPDATE sync_state SET
              last_sync_token = coalesce(?2, last_sync_token),
              last_sync_date = ?3,
              total_emails_synced = total_emails_synced + ?4,
              sync_status = ?5,
              last_error = NULL,
              updated_at = ?3
            WHERE account_id = ?1
            "#,
            params![account_id, new_state, now_rfc3339(), emails_added, status.as_str()],
        )?;
        cursor_by_account_id(&conn, account_id)?
            .ok_or_else(|| crate::StorageError::Integrity(format!("cursor for {account_id} missing on advance")))
    }

    /// Records a tick failure: sets `last_error` and `sync_status = error`
    /// without touching `last_sync_token` or `total_emails_synced`.
    pub fn record_error(&self, account_id: &str, message: &str) -> StorageResult<SyncCursor> {
        let conn = self.open_connection()?;
        conn.execute(
            r#"
            UPDATE sync_state SET
              last_error = ?2,
              sync_status = 'error',
              updated_at = ?3
            WHERE account_id = ?1
            "#,
            params![account_id, message, now_rfc3339()],
        )?;
        cursor_by_account_id(&conn, account_id)?
            .ok_or_else(|| crate::StorageError::Integrity(format!("cursor for {account_id} missing on error")))
    }

    /// Clears the cursor for a full re-pull, or pins it to `new_state` if
    /// given.
    pub fn reset_cursor(&self, account_id: &str, new_state: Option<&str>) -> StorageResult<SyncCursor> {
        let conn = self.open_connection()?;
        conn.execute(
            r#"
            UPDATE sync_state SET
              last_sync_token = ?2,
              last_error = NULL,
              sync_status = 'idle',
              updated_at = ?3
            WHERE account_id = ?1
            "#,
            params![account_id, new_state, now_rfc3339()],
        )?;
        cursor_by_account_id(&conn, account_id)?
            .ok_or_else(|| crate::StorageError::Integrity(format!("cursor for {account_id} missing on reset")))
    }

    pub fn get_cursor(&self, account_id: &str) -> StorageResult<Option<SyncCursor>> {
        let conn = self.open_connection()?;
        cursor_by_account_id(&conn, account_id)
    }

    pub fn list_cursors(&self) -> StorageResult<Vec<SyncCursor>> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(&format!("{CURSOR_SELECT} ORDER BY account_id ASC"))?;
        let raw_rows = stmt
            .query_map([], map_cursor_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw_rows.into_iter().map(CursorRawRow::into_cursor).collect()
    }
}

const CURSOR_SELECT: &str = r#"
SELECT account_id, last_sync_token, last_sync_date, total_emails_synced,
       last_error, sync_status, created_at, updated_at
FROM sync_state
"#;

struct CursorRawRow {
    account_id: String,
    last_sync_token: Option<String>,
    last_sync_date: Option<String>,
    total_emails_synced: i64,
    last_error: Option<String>,
    sync_status: String,
    created_at: String,
    updated_at: String,
}

impl CursorRawRow {
    fn into_cursor(self) -> StorageResult<SyncCursor> {
        Ok(SyncCursor {
            account_id: self.account_id,
            last_sync_token: self.last_sync_token,
            last_sync_date: parse_rfc3339_opt(self.last_sync_date)?,
            total_emails_synced: self.total_emails_synced,
            last_error: self.last_error,
            sync_status: SyncStatus::parse(&self.sync_status).unwrap_or(SyncStatus::Idle),
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

fn map_cursor_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CursorRawRow> {
    Ok(CursorRawRow {
        account_id: row.get(0)?,
        last_sync_token: row.get(1)?,
        last_sync_date: row.get(2)?,
        total_emails_synced: row.get(3)?,
        last_error: row.get(4)?,
        sync_status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn cursor_by_account_id(conn: &rusqlite::Connection, account_id: &str) -> StorageResult<Option<SyncCursor>> {
    let mut stmt = conn.prepare(&format!("{CURSOR_SELECT} WHERE account_id = ?1"))?;
    let raw: Option<CursorRawRow> = stmt.query_row(params![account_id], map_cursor_row).optional()?;
    raw.map(CursorRawRow::into_cursor).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_cursor_is_idempotent() {
        let storage = Storage::open_in_memory_for_tests().unwrap();
        let first = storage.initialize_cursor("acct-1").unwrap();
        let second = storage.initialize_cursor("acct-1").unwrap();
        assert_eq!(first.account_id, second.account_id);
        assert_eq!(second.total_emails_synced, 0);
    }

    #[test]
    fn advance_cursor_is_monotone_and_records_token() {
        let storage = Storage::open_in_memory_for_tests().unwrap();
        storage.initialize_cursor("acct-1").unwrap();

        let advanced = storage
            .advance_cursor("acct-1", Some("state-1"), 5, SyncStatus::Completed)
            .unwrap();
        assert_eq!(advanced.total_emails_synced, 5);
        assert_eq!(advanced.last_sync_token.as_deref(), Some("state-1"));
        assert_eq!(advanced.sync_status, SyncStatus::Completed);

        let advanced_again = storage
            .advance_cursor("acct-1", Some("state-2"), 3, SyncStatus::Completed)
            .unwrap();
        assert_eq!(advanced_again.total_emails_synced, 8);
    }

    #[test]
    fn record_error_preserves_progress() {
        let storage = Storage::open_in_memory_for_tests().unwrap();
        storage.initialize_cursor("acct-1").unwrap();
        storage.advance_cursor("acct-1", Some("state-1"), 5, SyncStatus::Completed).unwrap();

        let errored = storage.record_error("acct-1", "boom").unwrap();
        assert_eq!(errored.sync_status, SyncStatus::Error);
        assert_eq!(errored.total_emails_synced, 5);
        assert_eq!(errored.last_sync_token.as_deref(), Some("state-1"));
    }
}
