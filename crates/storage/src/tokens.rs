use rusqlite::{params, OptionalExtension};

use crate::{now_rfc3339, parse_rfc3339, Storage, StorageResult};

/// The persisted shape of an OAuth Token row: ciphertext and its nonce,
/// never plaintext. Encryption/decryption is owned by the token store
/// adapter, not by this crate — the archive store only ever sees bytes.
#[derive(Debug, Clone)]
pub struct EncryptedTokenRow {
    pub account_id: String,
    pub access_token_ciphertext: Vec<u8>,
    pub access_token_nonce: Vec<u8>,
    pub refresh_token_ciphertext: Option<Vec<u8>>,
    pub refresh_token_nonce: Option<Vec<u8>>,
    pub token_type: String,
    pub expires_at: time::OffsetDateTime,
    pub scope: Option<String>,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

impl Storage {
    /// Insert under `account_id`; on conflict, overwrite the full row
    /// (including ciphertext/nonce). Existing row is replaced entirely.
    pub fn upsert_oauth_token(&self, row: &EncryptedTokenRow) -> StorageResult<()> {
        let conn = self.open_connection()?;
        let now = now_rfc3339();
        conn.execute(
            r#"
            INSERT INTO oauth_tokens (
              account_id, access_token_ciphertext, access_token_nonce,
              refresh_token_ciphertext, refresh_token_nonce,
              token_type, expires_at, scope, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(account_id) DO UPDATE SET
              access_token_ciphertext = excluded.access_token_ciphertext,
              access_token_nonce = excluded.access_token_nonce,
              refresh_token_ciphertext = excluded.refresh_token_ciphertext,
              refresh_token_nonce = excluded.refresh_token_nonce,
              token_type = excluded.token_type,
              expires_at = excluded.expires_at,
              scope = excluded.scope,
              updated_at = excluded.updated_at
            "#,
            params![
                row.account_id,
                row.access_token_ciphertext,
                row.access_token_nonce,
                row.refresh_token_ciphertext,
                row.refresh_token_nonce,
                row.token_type,
                crate::format_rfc3339(row.expires_at),
                row.scope,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_oauth_token(&self, account_id: &str) -> StorageResult<Option<EncryptedTokenRow>> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT account_id, access_token_ciphertext, access_token_nonce,
                   refresh_token_ciphertext, refresh_token_nonce,
                   token_type, expires_at, scope, created_at, updated_at
            FROM oauth_tokens WHERE account_id = ?1
            "#,
        )?;
        let raw: Option<RawRow> = stmt.query_row(params![account_id], map_row).optional()?;
        raw.map(RawRow::into_row).transpose()
    }

    /// Idempotent: deleting an absent or already-deleted token is not an
    /// error.
    pub fn delete_oauth_token(&self, account_id: &str) -> StorageResult<()> {
        let conn = self.open_connection()?;
        conn.execute("DELETE FROM oauth_tokens WHERE account_id = ?1", params![account_id])?;
        Ok(())
    }
}

struct RawRow {
    account_id: String,
    access_token_ciphertext: Vec<u8>,
    access_token_nonce: Vec<u8>,
    refresh_token_ciphertext: Option<Vec<u8>>,
    refresh_token_nonce: Option<Vec<u8>>,
    token_type: String,
    expires_at: String,
    scope: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn into_row(self) -> StorageResult<EncryptedTokenRow> {
        Ok(EncryptedTokenRow {
            account_id: self.account_id,
            access_token_ciphertext: self.access_token_ciphertext,
            access_token_nonce: self.access_token_nonce,
            refresh_token_ciphertext: self.refresh_token_ciphertext,
            refresh_token_nonce: self.refresh_token_nonce,
            token_type: self.token_type,
            expires_at: parse_rfc3339(&self.expires_at)?,
            scope: self.scope,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        account_id: row.get(0)?,
        access_token_ciphertext: row.get(1)?,
        access_token_nonce: row.get(2)?,
        refresh_token_ciphertext: row.get(3)?,
        refresh_token_nonce: row.get(4)?,
        token_type: row.get(5)?,
        expires_at: row.get(6)?,
        scope: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
