use std::collections::BTreeMap;

use sync_engine_core::model::{ArchiveStats, HealthReport, HealthStatus, SyncStatus};

use crate::{Storage, StorageResult};

impl Storage {
    /// Three independent aggregate queries, never a join between them —
    /// joining the per-mailbox and per-month group-bys against the totals
    /// query would multiply rows across the join and over-count.
    pub fn stats(&self) -> StorageResult<ArchiveStats> {
        let conn = self.open_connection()?;

        let (total_emails, unread_emails, flagged_emails) = conn.query_row(
            r#"
            SELECT
              COUNT(*),
              SUM(CASE WHEN is_read = 0 THEN 1 ELSE 0 END),
              SUM(CASE WHEN is_flagged = 1 THEN 1 ELSE 0 END)
            FROM emails WHERE is_deleted = 0
            "#,
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                ))
            },
        )?;

        let per_mailbox: BTreeMap<String, i64> = {
            let mut stmt = conn.prepare(
                "SELECT mailbox_id, COUNT(*) FROM emails WHERE is_deleted = 0 GROUP BY mailbox_id",
            )?;
            stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<_, _>>()?
        };

        let per_month: BTreeMap<String, i64> = {
            let mut stmt = conn.prepare(
                r#"
                SELECT strftime('%Y-%m', date_received), COUNT(*)
                FROM emails
                WHERE is_deleted = 0 AND date_received IS NOT NULL
                GROUP BY strftime('%Y-%m', date_received)
                "#,
            )?;
            stmt.query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?.unwrap_or_default(), row.get::<_, i64>(1)?))
            })?
            .collect::<Result<_, _>>()?
        };

        Ok(ArchiveStats { total_emails, unread_emails, flagged_emails, per_mailbox, per_month })
    }

    /// ERROR if any account cursor is in `error`. WARNING if any cursor is
    /// `syncing` or `completed` but has not advanced in 24 hours. HEALTHY
    /// otherwise.
    pub fn health(&self) -> StorageResult<HealthReport> {
        let cursors = self.list_cursors()?;
        let now = time::OffsetDateTime::now_utc();

        let accounts_in_error = cursors.iter().filter(|c| c.sync_status == SyncStatus::Error).count() as i64;

        let stalest_age_hours = cursors
            .iter()
            .filter(|c| matches!(c.sync_status, SyncStatus::Syncing | SyncStatus::Completed))
            .filter_map(|c| c.last_sync_date)
            .map(|last| (now - last).whole_minutes() as f64 / 60.0)
            .fold(None, |acc: Option<f64>, age| Some(acc.map_or(age, |a| a.max(age))));

        let status = if accounts_in_error > 0 {
            HealthStatus::Error
        } else if stalest_age_hours.is_some_and(|age| age > 24.0) {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        Ok(HealthReport {
            status,
            account_count: cursors.len() as i64,
            accounts_in_error,
            stalest_sync_age_hours: stalest_age_hours,
        })
    }
}
