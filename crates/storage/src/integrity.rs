use rusqlite::params;
use sync_engine_core::model::{IntegrityCheck, IntegrityRepairAction};

use crate::{Storage, StorageResult};

impl Storage {
    /// One row per required check, PASS/FAIL with an issue count. Read-only.
    pub fn validate_integrity(&self) -> StorageResult<Vec<IntegrityCheck>> {
        let conn = self.open_connection()?;

        let orphan_mailbox_emails: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM emails e
            WHERE e.is_deleted = 0
              AND NOT EXISTS (SELECT 1 FROM mailboxes m WHERE m.remote_id = e.mailbox_id)
            "#,
            [],
            |r| r.get(0),
        )?;

        let duplicate_remote_ids: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM (
              SELECT remote_id FROM emails GROUP BY remote_id HAVING COUNT(*) > 1
            )
            "#,
            [],
            |r| r.get(0),
        )?;

        let orphan_search_rows: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM email_search s
            WHERE NOT EXISTS (SELECT 1 FROM emails e WHERE e.id = s.email_id AND e.is_deleted = 0)
            "#,
            [],
            |r| r.get(0),
        )?;

        let emails_missing_search_row: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM emails e
            WHERE e.is_deleted = 0
              AND NOT EXISTS (SELECT 1 FROM email_search s WHERE s.email_id = e.id)
            "#,
            [],
            |r| r.get(0),
        )?;

        let malformed_address_arrays = self.count_malformed_address_arrays(&conn)?;

        Ok(vec![
            IntegrityCheck {
                name: "emails_reference_existing_mailbox",
                passed: orphan_mailbox_emails == 0,
                issue_count: orphan_mailbox_emails,
            },
            IntegrityCheck {
                name: "no_duplicate_email_remote_ids",
                passed: duplicate_remote_ids == 0,
                issue_count: duplicate_remote_ids,
            },
            IntegrityCheck {
                name: "no_orphan_search_rows",
                passed: orphan_search_rows == 0,
                issue_count: orphan_search_rows,
            },
            IntegrityCheck {
                name: "every_email_has_search_row",
                passed: emails_missing_search_row == 0,
                issue_count: emails_missing_search_row,
            },
            IntegrityCheck {
                name: "address_arrays_well_formed",
                passed: malformed_address_arrays == 0,
                issue_count: malformed_address_arrays,
            },
        ])
    }

    /// (a) deletes orphan Search Rows, (b) creates missing Search Rows from
    /// current email content, (c) recomputes mailbox counters. One row per
    /// action with items affected.
    pub fn repair_integrity(&self) -> StorageResult<Vec<IntegrityRepairAction>> {
        let mut conn = self.open_connection()?;
        let tx = conn.transaction()?;

        let orphans_deleted = tx.execute(
            r#"
            DELETE FROM email_search
            WHERE NOT EXISTS (SELECT 1 FROM emails e WHERE e.id = email_search.email_id AND e.is_deleted = 0)
            "#,
            [],
        )?;

        let missing: Vec<(i64, Option<String>, Option<String>, Option<String>, Option<String>)> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT e.id, e.subject, e.from_address, e.body_text, e.body_html
                FROM emails e
                WHERE e.is_deleted = 0
                  AND NOT EXISTS (SELECT 1 FROM email_search s WHERE s.email_id = e.id)
                "#,
            )?;
            stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };

        let search_rows_created = missing.len() as i64;
        for (email_id, subject, from_address, body_text, body_html) in &missing {
            crate::search::recompute_search_row_tx(
                &tx,
                *email_id,
                subject.as_deref(),
                from_address.as_deref(),
                body_text.as_deref(),
                body_html.as_deref(),
            )?;
        }

        let mailbox_remote_ids: Vec<String> = {
            let mut stmt = tx.prepare("SELECT remote_id FROM mailboxes")?;
            stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()?
        };
        let mailboxes_recomputed = mailbox_remote_ids.len() as i64;
        for remote_id in &mailbox_remote_ids {
            tx.execute(
                r#"
                UPDATE mailboxes SET
                  total_emails = (
                    SELECT COUNT(*) FROM emails WHERE mailbox_id = ?1 AND is_deleted = 0
                  ),
                  unread_emails = (
                    SELECT COUNT(*) FROM emails WHERE mailbox_id = ?1 AND is_deleted = 0 AND is_read = 0
                  ),
                  updated_at = ?2
                WHERE remote_id = ?1
                "#,
                params![remote_id, crate::now_rfc3339()],
            )?;
        }

        tx.commit()?;

        Ok(vec![
            IntegrityRepairAction { name: "deleted_orphan_search_rows", items_affected: orphans_deleted as i64 },
            IntegrityRepairAction { name: "created_missing_search_rows", items_affected: search_rows_created },
            IntegrityRepairAction { name: "recomputed_mailbox_counters", items_affected: mailboxes_recomputed },
        ])
    }

    fn count_malformed_address_arrays(&self, conn: &rusqlite::Connection) -> StorageResult<i64> {
        let mut stmt = conn.prepare(
            "SELECT to_addresses, cc_addresses, bcc_addresses, reply_to_addresses FROM emails WHERE is_deleted = 0",
        )?;
        let rows: Vec<(String, String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let malformed = rows
            .iter()
            .filter(|(to, cc, bcc, reply_to)| {
                [to, cc, bcc, reply_to]
                    .iter()
                    .any(|raw| serde_json::from_str::<Vec<String>>(raw).is_err())
            })
            .count();

        Ok(malformed as i64)
    }
}
