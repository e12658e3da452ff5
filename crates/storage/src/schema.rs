use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::StorageResult;

pub(crate) const SCHEMA_VERSION: i64 = 1;
const SCHEMA_META_KEY_SCHEMA_VERSION: &str = "schema_version";

pub(crate) fn migrate(conn: &mut Connection) -> StorageResult<()> {
    let tx = conn.transaction()?;
    create_schema_meta_table(&tx)?;
    let existing_version = get_schema_version_tx(&tx)?;

    let Some(existing_version) = existing_version else {
        create_schema_v1(&tx)?;
        set_schema_version(&tx, SCHEMA_VERSION)?;
        tx.commit()?;
        return Ok(());
    };

    if existing_version > SCHEMA_VERSION {
        return Err(crate::StorageError::UnsupportedSchemaVersion {
            found: existing_version,
            supported: SCHEMA_VERSION,
        });
    }

    tx.commit()?;
    Ok(())
}

pub(crate) fn get_schema_version(conn: &Connection) -> StorageResult<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = ?1")?;
    let value: Option<String> = stmt
        .query_row([SCHEMA_META_KEY_SCHEMA_VERSION], |row| row.get(0))
        .optional()?;
    Ok(value.map(|v| v.parse::<i64>().unwrap_or(0)))
}

fn get_schema_version_tx(tx: &Transaction<'_>) -> StorageResult<Option<i64>> {
    let mut stmt = tx.prepare("SELECT value FROM schema_meta WHERE key = ?1")?;
    let mut rows = stmt.query([SCHEMA_META_KEY_SCHEMA_VERSION])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let value: String = row.get(0)?;
    Ok(Some(value.parse().unwrap_or(0)))
}

fn create_schema_meta_table(tx: &Transaction<'_>) -> StorageResult<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn set_schema_version(tx: &Transaction<'_>, version: i64) -> StorageResult<()> {
    tx.execute(
        r#"
        INSERT INTO schema_meta (key, value) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
        params![SCHEMA_META_KEY_SCHEMA_VERSION, version.to_string()],
    )?;
    Ok(())
}

fn create_schema_v1(tx: &Transaction<'_>) -> StorageResult<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS mailboxes (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          remote_id TEXT NOT NULL UNIQUE,
          name TEXT NOT NULL,
          parent_remote_id TEXT,
          role TEXT,
          sort_order INTEGER NOT NULL DEFAULT 0,
          total_emails INTEGER NOT NULL DEFAULT 0,
          unread_emails INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS emails (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          remote_id TEXT NOT NULL UNIQUE,
          thread_id TEXT,
          mailbox_id TEXT NOT NULL,
          subject TEXT,
          from_address TEXT,
          to_addresses TEXT NOT NULL DEFAULT '[]',
          cc_addresses TEXT NOT NULL DEFAULT '[]',
          bcc_addresses TEXT NOT NULL DEFAULT '[]',
          reply_to_addresses TEXT NOT NULL DEFAULT '[]',
          date_received TEXT,
          date_sent TEXT,
          message_id TEXT,
          in_reply_to TEXT,
          "references" TEXT NOT NULL DEFAULT '[]',
          body_text TEXT,
          body_html TEXT,
          attachments TEXT NOT NULL DEFAULT '[]',
          flags TEXT NOT NULL DEFAULT '{}',
          size_bytes INTEGER NOT NULL DEFAULT 0,
          is_read INTEGER NOT NULL DEFAULT 0,
          is_flagged INTEGER NOT NULL DEFAULT 0,
          is_deleted INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_emails_mailbox_received
          ON emails(mailbox_id, date_received DESC);

        CREATE INDEX IF NOT EXISTS idx_emails_is_read_received
          ON emails(is_read, date_received DESC);

        CREATE TABLE IF NOT EXISTS email_threads (
          id TEXT PRIMARY KEY,
          email_remote_ids TEXT NOT NULL DEFAULT '[]',
          subject TEXT,
          mailbox_membership TEXT NOT NULL DEFAULT '{}',
          message_count INTEGER NOT NULL DEFAULT 0,
          unread_count INTEGER NOT NULL DEFAULT 0,
          last_message_date TEXT,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS email_search (
          email_id INTEGER PRIMARY KEY,
          subject TEXT,
          from_address TEXT,
          body TEXT,
          content_hash TEXT NOT NULL,
          FOREIGN KEY(email_id) REFERENCES emails(id)
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS email_search_fts USING fts5(
          subject,
          from_address,
          body,
          content='email_search',
          content_rowid='email_id'
        );

        CREATE TRIGGER IF NOT EXISTS email_search_ai AFTER INSERT ON email_search BEGIN
          INSERT INTO email_search_fts(rowid, subject, from_address, body)
          VALUES (new.email_id, new.subject, new.from_address, new.body);
        END;

        CREATE TRIGGER IF NOT EXISTS email_search_ad AFTER DELETE ON email_search BEGIN
          INSERT INTO email_search_fts(email_search_fts, rowid, subject, from_address, body)
          VALUES ('delete', old.email_id, old.subject, old.from_address, old.body);
        END;

        CREATE TRIGGER IF NOT EXISTS email_search_au AFTER UPDATE ON email_search BEGIN
          INSERT INTO email_search_fts(email_search_fts, rowid, subject, from_address, body)
          VALUES ('delete', old.email_id, old.subject, old.from_address, old.body);
          INSERT INTO email_search_fts(rowid, subject, from_address, body)
          VALUES (new.email_id, new.subject, new.from_address, new.body);
        END;

        CREATE TABLE IF NOT EXISTS sync_state (
          account_id TEXT PRIMARY KEY,
          last_sync_token TEXT,
          last_sync_date TEXT,
          total_emails_synced INTEGER NOT NULL DEFAULT 0,
          last_error TEXT,
          sync_status TEXT NOT NULL DEFAULT 'idle',
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS oauth_tokens (
          account_id TEXT PRIMARY KEY,
          access_token_ciphertext BLOB NOT NULL,
          access_token_nonce BLOB NOT NULL,
          refresh_token_ciphertext BLOB,
          refresh_token_nonce BLOB,
          token_type TEXT NOT NULL,
          expires_at TEXT NOT NULL,
          scope TEXT,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}
