use rusqlite::{params, Transaction};
use sha2::{Digest, Sha256};
use sync_engine_core::model::{SearchFilters, SearchHit, SearchSort};

use crate::{bool_to_int, parse_rfc3339, Storage, StorageResult};

impl Storage {
    /// Non-deleted emails only. `sort = SearchSort::Rank` orders by
    /// text-relevance score descending (`rank` is the negated bm25 score,
    /// so higher is a better match); any other sort orders by the
    /// requested field/direction with `rank` returned as 0.
    ///
    /// Every filter value is bound as a parameter — the query text itself
    /// is tokenized and quoted (see `build_fts5_query`) rather than spliced
    /// into the SQL string, so user input can never reach FTS5 or SQLite as
    /// raw syntax.
    pub fn search(
        &self,
        query_text: &str,
        filters: &SearchFilters,
        sort: SearchSort,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<SearchHit>> {
        let conn = self.open_connection()?;

        let order_by = match sort {
            SearchSort::Rank => "rank DESC",
            SearchSort::DateReceivedAsc => "e.date_received ASC, e.id ASC",
            SearchSort::DateReceivedDesc => "e.date_received DESC, e.id DESC",
        };

        let mailbox_ids_json = filters.mailbox_ids.as_ref().map(crate::json_encode).transpose()?;

        let fts_query = build_fts5_query(query_text);
        let base_select = format!(
            r#"
            SELECT
              e.id, e.subject, e.from_address,
              substr(coalesce(e.body_text, ''), 1, 200) AS snippet,
              {rank_expr} AS rank,
              e.date_received, e.is_read, e.is_flagged
            FROM emails e
            {join_clause}
            WHERE e.is_deleted = 0
              {match_clause}
              AND (?1 IS NULL OR e.mailbox_id IN (SELECT value FROM json_each(?1)))
              AND (?2 IS NULL OR e.date_received >= ?2)
              AND (?3 IS NULL OR e.date_received <= ?3)
              AND (?4 IS NULL OR e.is_read = ?4)
              AND (?5 IS NULL OR e.is_flagged = ?5)
              AND (?6 IS NULL OR (json_array_length(e.attachments) > 0) = ?6)
            ORDER BY {order_by}
            LIMIT ?7 OFFSET ?8
            "#,
            rank_expr = if fts_query.is_some() { "-bm25(email_search_fts)" } else { "0.0" },
            join_clause = if fts_query.is_some() {
                "JOIN email_search_fts ON email_search_fts.rowid = e.id"
            } else {
                ""
            },
            match_clause = if fts_query.is_some() { "AND email_search_fts MATCH ?9" } else { "" },
        );

        let mut stmt = conn.prepare(&base_select)?;

        let date_from = filters.date_from.map(crate::format_rfc3339);
        let date_to = filters.date_to.map(crate::format_rfc3339);
        let is_read = filters.is_read.map(bool_to_int);
        let is_flagged = filters.is_flagged.map(bool_to_int);
        let has_attachments = filters.has_attachments.map(bool_to_int);

        let rows = if let Some(fts_query) = fts_query {
            stmt.query_map(
                params![
                    mailbox_ids_json,
                    date_from,
                    date_to,
                    is_read,
                    is_flagged,
                    has_attachments,
                    limit as i64,
                    offset as i64,
                    fts_query,
                ],
                map_search_hit_row,
            )?
            .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(
                params![
                    mailbox_ids_json,
                    date_from,
                    date_to,
                    is_read,
                    is_flagged,
                    has_attachments,
                    limit as i64,
                    offset as i64,
                ],
                map_search_hit_row,
            )?
            .collect::<Result<Vec<_>, _>>()?
        };

        rows.into_iter().map(SearchHitRaw::into_hit).collect()
    }
}

struct SearchHitRaw {
    email_id: i64,
    subject: Option<String>,
    from_address: Option<String>,
    snippet: String,
    rank: f64,
    date_received: Option<String>,
    is_read: i64,
    is_flagged: i64,
}

impl SearchHitRaw {
    fn into_hit(self) -> StorageResult<SearchHit> {
        Ok(SearchHit {
            email_id: self.email_id,
            subject: self.subject,
            from_address: self.from_address,
            snippet: self.snippet,
            rank: self.rank,
            date_received: self.date_received.map(|v| parse_rfc3339(&v)).transpose()?,
            is_read: self.is_read != 0,
            is_flagged: self.is_flagged != 0,
        })
    }
}

fn map_search_hit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchHitRaw> {
    Ok(SearchHitRaw {
        email_id: row.get(0)?,
        subject: row.get(1)?,
        from_address: row.get(2)?,
        snippet: row.get(3)?,
        rank: row.get(4)?,
        date_received: row.get(5)?,
        is_read: row.get(6)?,
        is_flagged: row.get(7)?,
    })
}

/// Recomputes the Search Row for `email_id` from the given content and
/// writes a stable `content_hash` alongside it for cheap change detection.
pub(crate) fn recompute_search_row_tx(
    tx: &Transaction<'_>,
    email_id: i64,
    subject: Option<&str>,
    from_address: Option<&str>,
    body_text: Option<&str>,
    body_html: Option<&str>,
) -> StorageResult<()> {
    let body = body_text.or(body_html).unwrap_or("");
    let content_hash = content_hash(subject.unwrap_or(""), from_address.unwrap_or(""), body);

    tx.execute(
        r#"
        INSERT INTO email_search (email_id, subject, from_address, body, content_hash)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(email_id) DO UPDATE SET
          subject = excluded.subject,
          from_address = excluded.from_address,
          body = excluded.body,
          content_hash = excluded.content_hash
        "#,
        params![email_id, subject, from_address, body, content_hash],
    )?;
    Ok(())
}

pub(crate) fn content_hash(subject: &str, from_address: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(b"\0");
    hasher.update(from_address.as_bytes());
    hasher.update(b"\0");
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Tokenizes a user search string into a quoted, AND-joined FTS5 MATCH
/// expression. Returns `None` when there are no usable tokens (caller
/// should fall back to an unfiltered listing).
fn build_fts5_query(user_query: &str) -> Option<String> {
    let tokens = user_query
        .split_whitespace()
        .filter_map(normalize_fts5_token)
        .collect::<Vec<_>>();

    if tokens.is_empty() {
        return None;
    }

    Some(tokens.join(" AND "))
}

fn normalize_fts5_token(token: &str) -> Option<String> {
    let normalized = token
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '_' | '-' | '+'))
        .collect::<String>();
    let normalized = normalized.trim_matches(|c: char| !c.is_alphanumeric());
    if normalized.is_empty() {
        return None;
    }

    // Quote the token to escape FTS5 operators (AND/OR/NOT/NEAR) in user input.
    let escaped = normalized.replace('"', "\"\"");
    Some(format!("\"{escaped}\"*"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_fts5_query_normalizes_and_quotes_tokens() {
        assert_eq!(build_fts5_query(""), None);
        assert_eq!(build_fts5_query("   "), None);

        let query = build_fts5_query("hello world").unwrap();
        assert_eq!(query, "\"hello\"* AND \"world\"*");

        let query = build_fts5_query("re: hello@example.com").unwrap();
        assert_eq!(query, "\"re\"* AND \"hello@example.com\"*");
    }

    #[test]
    fn content_hash_is_stable_for_identical_input() {
        let a = content_hash("subj", "a@b.com", "body");
        let b = content_hash("subj", "a@b.com", "body");
        assert_eq!(a, b);

        let c = content_hash("subj", "a@b.com", "different body");
        assert_ne!(a, c);
    }
}
