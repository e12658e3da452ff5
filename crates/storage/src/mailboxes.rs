use rusqlite::{params, OptionalExtension};
use sync_engine_core::model::{Mailbox, MailboxUpsert};

use crate::{now_rfc3339, parse_rfc3339, Storage, StorageResult};

impl Storage {
    /// Insert under `remote_id`; on conflict, update all non-key columns.
    /// Always returns the canonical post-write row.
    pub fn upsert_mailbox(&self, input: &MailboxUpsert) -> StorageResult<Mailbox> {
        let mut conn = self.open_connection()?;
        let now = now_rfc3339();
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO mailboxes (
              remote_id, name, parent_remote_id, role, sort_order,
              total_emails, unread_emails, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(remote_id) DO UPDATE SET
              name = excluded.name,
              parent_remote_id = excluded.parent_remote_id,
              role = excluded.role,
              sort_order = excluded.sort_order,
              total_emails = excluded.total_emails,
              unread_emails = excluded.unread_emails,
              updated_at = excluded.updated_at
            "#,
            params![
                input.remote_id,
                input.name,
                input.parent_remote_id,
                input.role,
                input.sort_order,
                input.total_emails,
                input.unread_emails,
                now,
            ],
        )?;

        let row = mailbox_by_remote_id_tx(&tx, &input.remote_id)?
            .expect("mailbox row must exist immediately after upsert");
        tx.commit()?;
        Ok(row)
    }

    pub fn get_mailbox_by_remote_id(&self, remote_id: &str) -> StorageResult<Option<Mailbox>> {
        let conn = self.open_connection()?;
        mailbox_by_remote_id(&conn, remote_id)
    }

    pub fn list_mailboxes(&self) -> StorageResult<Vec<Mailbox>> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(&format!("{MAILBOX_SELECT} ORDER BY sort_order ASC, id ASC"))?;
        let raw_rows = stmt
            .query_map([], map_mailbox_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw_rows.into_iter().map(Mailbox::try_from).collect()
    }

    /// Recompute `total_emails`/`unread_emails` for a mailbox from the
    /// current email rows. Used by `repair_integrity`.
    pub(crate) fn recompute_mailbox_counters(&self, remote_id: &str) -> StorageResult<()> {
        let conn = self.open_connection()?;
        conn.execute(
            r#"
            UPDATE mailboxes SET
              total_emails = (
                SELECT COUNT(*) FROM emails
                WHERE mailbox_id = mailboxes.remote_id AND is_deleted = 0
              ),
              unread_emails = (
                SELECT COUNT(*) FROM emails
                WHERE mailbox_id = mailboxes.remote_id AND is_deleted = 0 AND is_read = 0
              ),
              updated_at = ?2
            WHERE remote_id = ?1
            "#,
            params![remote_id, now_rfc3339()],
        )?;
        Ok(())
    }
}

const MAILBOX_SELECT: &str = r#"
SELECT id, remote_id, name, parent_remote_id, role, sort_order,
       total_emails, unread_emails, created_at, updated_at
FROM mailboxes
"#;

fn mailbox_by_remote_id(
    conn: &rusqlite::Connection,
    remote_id: &str,
) -> StorageResult<Option<Mailbox>> {
    let mut stmt = conn.prepare(&format!("{MAILBOX_SELECT} WHERE remote_id = ?1"))?;
    let raw: Option<MailboxRawRow> = stmt.query_row(params![remote_id], map_mailbox_row).optional()?;
    raw.map(Mailbox::try_from).transpose()
}

fn mailbox_by_remote_id_tx(
    tx: &rusqlite::Transaction<'_>,
    remote_id: &str,
) -> StorageResult<Option<Mailbox>> {
    let mut stmt = tx.prepare(&format!("{MAILBOX_SELECT} WHERE remote_id = ?1"))?;
    let raw: Option<MailboxRawRow> = stmt.query_row(params![remote_id], map_mailbox_row).optional()?;
    raw.map(Mailbox::try_from).transpose()
}

struct MailboxRawRow {
    id: i64,
    remote_id: String,
    name: String,
    parent_remote_id: Option<String>,
    role: Option<String>,
    sort_order: i64,
    total_emails: i64,
    unread_emails: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<MailboxRawRow> for Mailbox {
    type Error = crate::StorageError;

    fn try_from(raw: MailboxRawRow) -> StorageResult<Self> {
        Ok(Mailbox {
            id: raw.id,
            remote_id: raw.remote_id,
            name: raw.name,
            parent_remote_id: raw.parent_remote_id,
            role: raw.role,
            sort_order: raw.sort_order,
            total_emails: raw.total_emails,
            unread_emails: raw.unread_emails,
            created_at: parse_rfc3339(&raw.created_at)?,
            updated_at: parse_rfc3339(&raw.updated_at)?,
        })
    }
}

fn map_mailbox_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MailboxRawRow> {
    Ok(MailboxRawRow {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        name: row.get(2)?,
        parent_remote_id: row.get(3)?,
        role: row.get(4)?,
        sort_order: row.get(5)?,
        total_emails: row.get(6)?,
        unread_emails: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
