use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension};
use sync_engine_core::model::Thread;

use crate::{json_decode, json_encode, now_rfc3339, parse_rfc3339_opt, Storage, StorageResult};

impl Storage {
    /// Insert under `id` (the remote thread id); on conflict, update all
    /// non-key columns. Caller is responsible for `message_count ==
    /// |email_remote_ids|` — the store does not recompute it, only persists
    /// what is given.
    pub fn upsert_thread(&self, thread: &Thread) -> StorageResult<Thread> {
        let mut conn = self.open_connection()?;
        let now = now_rfc3339();
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO email_threads (
              id, email_remote_ids, subject, mailbox_membership,
              message_count, unread_count, last_message_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(id) DO UPDATE SET
              email_remote_ids = excluded.email_remote_ids,
              subject = excluded.subject,
              mailbox_membership = excluded.mailbox_membership,
              message_count = excluded.message_count,
              unread_count = excluded.unread_count,
              last_message_date = excluded.last_message_date,
              updated_at = excluded.updated_at
            "#,
            params![
                thread.id,
                json_encode(&thread.email_remote_ids)?,
                thread.subject,
                json_encode(&thread.mailbox_membership)?,
                thread.message_count,
                thread.unread_count,
                thread.last_message_date.map(crate::format_rfc3339),
                now,
            ],
        )?;

        let row = thread_by_id_tx(&tx, &thread.id)?.expect("thread row must exist immediately after upsert");
        tx.commit()?;
        Ok(row)
    }

    pub fn get_thread_by_id(&self, id: &str) -> StorageResult<Option<Thread>> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(&format!("{THREAD_SELECT} WHERE id = ?1"))?;
        let raw: Option<ThreadRawRow> = stmt.query_row(params![id], map_thread_row).optional()?;
        raw.map(ThreadRawRow::into_thread).transpose()
    }
}

const THREAD_SELECT: &str = r#"
SELECT id, email_remote_ids, subject, mailbox_membership,
       message_count, unread_count, last_message_date
FROM email_threads
"#;

struct ThreadRawRow {
    id: String,
    email_remote_ids: String,
    subject: Option<String>,
    mailbox_membership: String,
    message_count: i64,
    unread_count: i64,
    last_message_date: Option<String>,
}

impl ThreadRawRow {
    fn into_thread(self) -> StorageResult<Thread> {
        Ok(Thread {
            id: self.id,
            email_remote_ids: json_decode(Some(self.email_remote_ids))?,
            subject: self.subject,
            mailbox_membership: json_decode::<BTreeMap<String, bool>>(Some(self.mailbox_membership))?,
            message_count: self.message_count,
            unread_count: self.unread_count,
            last_message_date: parse_rfc3339_opt(self.last_message_date)?,
        })
    }
}

fn map_thread_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadRawRow> {
    Ok(ThreadRawRow {
        id: row.get(0)?,
        email_remote_ids: row.get(1)?,
        subject: row.get(2)?,
        mailbox_membership: row.get(3)?,
        message_count: row.get(4)?,
        unread_count: row.get(5)?,
        last_message_date: row.get(6)?,
    })
}

fn thread_by_id_tx(
    tx: &rusqlite::Transaction<'_>,
    id: &str,
) -> StorageResult<Option<Thread>> {
    let mut stmt = tx.prepare(&format!("{THREAD_SELECT} WHERE id = ?1"))?;
    let raw: Option<ThreadRawRow> = stmt.query_row(params![id], map_thread_row).optional()?;
    raw.map(ThreadRawRow::into_thread).transpose()
}
