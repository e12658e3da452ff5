use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension, Transaction};
use sync_engine_core::model::{Attachment, Email, EmailUpsert};

use crate::{bool_to_int, int_to_bool, json_decode, json_encode, now_rfc3339, parse_rfc3339, Storage, StorageResult};

impl Storage {
    /// Insert under `remote_id`; on conflict, update all non-key columns.
    /// Recomputes the Search Row in the same transaction. Returns the
    /// canonical post-write row.
    pub fn upsert_email(&self, input: &EmailUpsert) -> StorageResult<Email> {
        let mut conn = self.open_connection()?;
        let tx = conn.transaction()?;
        let email = upsert_email_tx(&tx, input)?;
        tx.commit()?;
        Ok(email)
    }

    /// Batch upsert that tolerates per-item failures: one item's conflict
    /// or malformed data does not abort the rest of the batch. Returns the
    /// rows that were successfully written, in input order.
    pub fn batch_upsert_emails(&self, inputs: &[EmailUpsert]) -> StorageResult<Vec<Email>> {
        let mut conn = self.open_connection()?;
        let mut written = Vec::with_capacity(inputs.len());

        for input in inputs {
            let tx = conn.transaction()?;
            match upsert_email_tx(&tx, input) {
                Ok(email) => {
                    tx.commit()?;
                    written.push(email);
                }
                Err(err) => {
                    tracing::warn!(remote_id = %input.remote_id, error = %err, "email upsert failed, continuing batch");
                    tx.rollback()?;
                }
            }
        }

        Ok(written)
    }

    pub fn get_email_by_remote_id(&self, remote_id: &str) -> StorageResult<Option<Email>> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(&format!("{EMAIL_SELECT} WHERE remote_id = ?1"))?;
        let raw: Option<EmailRawRow> = stmt.query_row(params![remote_id], map_email_row).optional()?;
        raw.map(Email::try_from).transpose()
    }

    pub fn get_emails_in_mailbox(
        &self,
        mailbox_id: &str,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<Email>> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(&format!(
            "{EMAIL_SELECT} WHERE mailbox_id = ?1 AND is_deleted = 0 ORDER BY date_received DESC, id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let raw_rows = stmt
            .query_map(params![mailbox_id, limit as i64, offset as i64], map_email_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw_rows.into_iter().map(Email::try_from).collect()
    }

    pub fn recent_emails(&self, limit: usize) -> StorageResult<Vec<Email>> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(&format!(
            "{EMAIL_SELECT} WHERE is_deleted = 0 ORDER BY date_received DESC, id DESC LIMIT ?1"
        ))?;
        let raw_rows = stmt
            .query_map(params![limit as i64], map_email_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw_rows.into_iter().map(Email::try_from).collect()
    }

    /// Webhook-driven tombstone: sets `is_deleted` and drops the Search Row.
    /// Idempotent — deleting an already-deleted or unknown email is not an
    /// error.
    pub fn mark_email_deleted(&self, remote_id: &str) -> StorageResult<()> {
        let mut conn = self.open_connection()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();

        let email_id: Option<i64> = tx
            .query_row("SELECT id FROM emails WHERE remote_id = ?1", params![remote_id], |r| r.get(0))
            .optional()?;

        let Some(email_id) = email_id else {
            tx.commit()?;
            return Ok(());
        };

        tx.execute(
            "UPDATE emails SET is_deleted = 1, updated_at = ?2 WHERE id = ?1",
            params![email_id, now],
        )?;
        tx.execute("DELETE FROM email_search WHERE email_id = ?1", params![email_id])?;
        tx.commit()?;
        Ok(())
    }
}

fn upsert_email_tx(tx: &Transaction<'_>, input: &EmailUpsert) -> StorageResult<Email> {
    let now = now_rfc3339();
    let mut flags = input.flags.clone();
    // Canonical derivation: never trust a caller-supplied is_read/is_flagged,
    // only the $seen/$flagged keywords.
    let is_read = flags.get(Email::FLAG_SEEN).copied().unwrap_or(false);
    let is_flagged = flags.get(Email::FLAG_FLAGGED).copied().unwrap_or(false);
    flags.entry(Email::FLAG_SEEN.to_string()).or_insert(is_read);
    flags.entry(Email::FLAG_FLAGGED.to_string()).or_insert(is_flagged);

    tx.execute(
        r#"
        INSERT INTO emails (
          remote_id, thread_id, mailbox_id, subject, from_address,
          to_addresses, cc_addresses, bcc_addresses, reply_to_addresses,
          date_received, date_sent, message_id, in_reply_to, "references",
          body_text, body_html, attachments, flags, size_bytes,
          is_read, is_flagged, is_deleted, created_at, updated_at
        ) VALUES (
          ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
          ?15, ?16, ?17, ?18, ?19, ?20, ?21, 0, ?22, ?22
        )
        ON CONFLICT(remote_id) DO UPDATE SET
          thread_id = excluded.thread_id,
          mailbox_id = excluded.mailbox_id,
          subject = excluded.subject,
          from_address = excluded.from_address,
          to_addresses = excluded.to_addresses,
          cc_addresses = excluded.cc_addresses,
          bcc_addresses = excluded.bcc_addresses,
          reply_to_addresses = excluded.reply_to_addresses,
          date_received = excluded.date_received,
          date_sent = excluded.date_sent,
          message_id = excluded.message_id,
          in_reply_to = excluded.in_reply_to,
          "references" = excluded."references",
          body_text = excluded.body_text,
          body_html = excluded.body_html,
          attachments = excluded.attachments,
          flags = excluded.flags,
          size_bytes = excluded.size_bytes,
          is_read = excluded.is_read,
          is_flagged = excluded.is_flagged,
          updated_at = excluded.updated_at
        "#,
        params![
            input.remote_id,
            input.thread_id,
            input.mailbox_id,
            input.subject,
            input.from_address,
            json_encode(&input.to_addresses)?,
            json_encode(&input.cc_addresses)?,
            json_encode(&input.bcc_addresses)?,
            json_encode(&input.reply_to_addresses)?,
            input.date_received.map(crate::format_rfc3339),
            input.date_sent.map(crate::format_rfc3339),
            input.message_id,
            input.in_reply_to,
            json_encode(&input.references)?,
            input.body_text,
            input.body_html,
            json_encode(&input.attachments)?,
            json_encode(&flags)?,
            input.size_bytes,
            bool_to_int(is_read),
            bool_to_int(is_flagged),
            now,
        ],
    )?;

    let email_id: i64 = tx.query_row(
        "SELECT id FROM emails WHERE remote_id = ?1",
        params![input.remote_id],
        |r| r.get(0),
    )?;

    crate::search::recompute_search_row_tx(
        tx,
        email_id,
        input.subject.as_deref(),
        input.from_address.as_deref(),
        input.body_text.as_deref(),
        input.body_html.as_deref(),
    )?;

    let mut stmt = tx.prepare(&format!("{EMAIL_SELECT} WHERE id = ?1"))?;
    let raw = stmt.query_row(params![email_id], map_email_row)?;
    Email::try_from(raw)
}

const EMAIL_SELECT: &str = r#"
SELECT id, remote_id, thread_id, mailbox_id, subject, from_address,
       to_addresses, cc_addresses, bcc_addresses, reply_to_addresses,
       date_received, date_sent, message_id, in_reply_to, "references",
       body_text, body_html, attachments, flags, size_bytes,
       is_read, is_flagged, is_deleted, created_at, updated_at
FROM emails
"#;

struct EmailRawRow {
    id: i64,
    remote_id: String,
    thread_id: Option<String>,
    mailbox_id: String,
    subject: Option<String>,
    from_address: Option<String>,
    to_addresses: String,
    cc_addresses: String,
    bcc_addresses: String,
    reply_to_addresses: String,
    date_received: Option<String>,
    date_sent: Option<String>,
    message_id: Option<String>,
    in_reply_to: Option<String>,
    references: String,
    body_text: Option<String>,
    body_html: Option<String>,
    attachments: String,
    flags: String,
    size_bytes: i64,
    is_read: i64,
    is_flagged: i64,
    is_deleted: i64,
    created_at: String,
    updated_at: String,
}

fn map_email_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmailRawRow> {
    Ok(EmailRawRow {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        thread_id: row.get(2)?,
        mailbox_id: row.get(3)?,
        subject: row.get(4)?,
        from_address: row.get(5)?,
        to_addresses: row.get(6)?,
        cc_addresses: row.get(7)?,
        bcc_addresses: row.get(8)?,
        reply_to_addresses: row.get(9)?,
        date_received: row.get(10)?,
        date_sent: row.get(11)?,
        message_id: row.get(12)?,
        in_reply_to: row.get(13)?,
        references: row.get(14)?,
        body_text: row.get(15)?,
        body_html: row.get(16)?,
        attachments: row.get(17)?,
        flags: row.get(18)?,
        size_bytes: row.get(19)?,
        is_read: row.get(20)?,
        is_flagged: row.get(21)?,
        is_deleted: row.get(22)?,
        created_at: row.get(23)?,
        updated_at: row.get(24)?,
    })
}

impl TryFrom<EmailRawRow> for Email {
    type Error = crate::StorageError;

    fn try_from(raw: EmailRawRow) -> StorageResult<Self> {
        Ok(Email {
            id: raw.id,
            remote_id: raw.remote_id,
            thread_id: raw.thread_id,
            mailbox_id: raw.mailbox_id,
            subject: raw.subject,
            from_address: raw.from_address,
            to_addresses: json_decode(Some(raw.to_addresses))?,
            cc_addresses: json_decode(Some(raw.cc_addresses))?,
            bcc_addresses: json_decode(Some(raw.bcc_addresses))?,
            reply_to_addresses: json_decode(Some(raw.reply_to_addresses))?,
            date_received: raw.date_received.map(|v| parse_rfc3339(&v)).transpose()?,
            date_sent: raw.date_sent.map(|v| parse_rfc3339(&v)).transpose()?,
            message_id: raw.message_id,
            in_reply_to: raw.in_reply_to,
            references: json_decode(Some(raw.references))?,
            body_text: raw.body_text,
            body_html: raw.body_html,
            attachments: json_decode::<Vec<Attachment>>(Some(raw.attachments))?,
            flags: json_decode::<BTreeMap<String, bool>>(Some(raw.flags))?,
            size_bytes: raw.size_bytes,
            is_read: int_to_bool(raw.is_read),
            is_flagged: int_to_bool(raw.is_flagged),
            is_deleted: int_to_bool(raw.is_deleted),
            created_at: parse_rfc3339(&raw.created_at)?,
            updated_at: parse_rfc3339(&raw.updated_at)?,
        })
    }
}
