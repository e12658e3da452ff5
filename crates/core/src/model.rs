//! Tagged domain types shared by every crate in the workspace.
//!
//! Each type mirrors one entity of the archive's data model exactly. There
//! is deliberately no loosely-typed "record" or "attributes bag" anywhere —
//! callers get compile-time checked fields, not stringly-typed maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type AccountId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Completed,
    Error,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(SyncStatus::Idle),
            "syncing" => Some(SyncStatus::Syncing),
            "completed" => Some(SyncStatus::Completed),
            "error" => Some(SyncStatus::Error),
            _ => None,
        }
    }
}

/// OAuth credential for one account. `access_token`/`refresh_token` here are
/// always plaintext — this is the in-memory shape handed to callers. The
/// token store never returns the ciphertext form.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub account_id: AccountId,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: time::OffsetDateTime,
    pub scope: Option<String>,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("account_id", &self.account_id)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl OAuthToken {
    /// True when `expires_at` is within five minutes of `now`.
    pub fn needs_refresh(&self, now: time::OffsetDateTime) -> bool {
        self.expires_at <= now + time::Duration::minutes(5)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: i64,
    pub remote_id: String,
    pub name: String,
    pub parent_remote_id: Option<String>,
    pub role: Option<String>,
    pub sort_order: i64,
    pub total_emails: i64,
    pub unread_emails: i64,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxUpsert {
    pub remote_id: String,
    pub name: String,
    pub parent_remote_id: Option<String>,
    pub role: Option<String>,
    pub sort_order: i64,
    pub total_emails: i64,
    pub unread_emails: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub blob_id: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub size: i64,
    pub content_id: Option<String>,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: i64,
    pub remote_id: String,
    pub thread_id: Option<String>,
    pub mailbox_id: String,
    pub subject: Option<String>,
    pub from_address: Option<String>,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
    pub bcc_addresses: Vec<String>,
    pub reply_to_addresses: Vec<String>,
    pub date_received: Option<time::OffsetDateTime>,
    pub date_sent: Option<time::OffsetDateTime>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub attachments: Vec<Attachment>,
    pub flags: BTreeMap<String, bool>,
    pub size_bytes: i64,
    pub is_read: bool,
    pub is_flagged: bool,
    pub is_deleted: bool,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

impl Email {
    pub const FLAG_SEEN: &'static str = "$seen";
    pub const FLAG_FLAGGED: &'static str = "$flagged";

    /// `is_read`/`is_flagged` are derived, never stored independently of
    /// the canonical keyword flags.
    pub fn derive_read_and_flagged(&mut self) {
        self.is_read = self.flags.get(Self::FLAG_SEEN).copied().unwrap_or(false);
        self.is_flagged = self.flags.get(Self::FLAG_FLAGGED).copied().unwrap_or(false);
    }

    /// Stable text used to build the Search Row; also hashed into
    /// `content_hash` for cheap change detection.
    pub fn search_text(&self) -> String {
        [
            self.subject.as_deref().unwrap_or(""),
            self.from_address.as_deref().unwrap_or(""),
            self.body_text.as_deref().unwrap_or(""),
            self.body_html.as_deref().unwrap_or(""),
        ]
        .join("\n")
    }
}

/// Upsert input for an Email; identical shape to `Email` minus the local id
/// and derived booleans, which the store computes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailUpsert {
    pub remote_id: String,
    pub thread_id: Option<String>,
    pub mailbox_id: String,
    pub subject: Option<String>,
    pub from_address: Option<String>,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
    pub bcc_addresses: Vec<String>,
    pub reply_to_addresses: Vec<String>,
    pub date_received: Option<time::OffsetDateTime>,
    pub date_sent: Option<time::OffsetDateTime>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub attachments: Vec<Attachment>,
    pub flags: BTreeMap<String, bool>,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub email_remote_ids: Vec<String>,
    pub subject: Option<String>,
    pub mailbox_membership: BTreeMap<String, bool>,
    pub message_count: i64,
    pub unread_count: i64,
    pub last_message_date: Option<time::OffsetDateTime>,
}

impl Thread {
    pub fn invariant_holds(&self) -> bool {
        self.message_count == self.email_remote_ids.len() as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub email_id: i64,
    pub subject: Option<String>,
    pub from_address: Option<String>,
    pub snippet: String,
    pub rank: f64,
    pub date_received: Option<time::OffsetDateTime>,
    pub is_read: bool,
    pub is_flagged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSort {
    Rank,
    DateReceivedAsc,
    DateReceivedDesc,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub mailbox_ids: Option<Vec<String>>,
    pub date_from: Option<time::OffsetDateTime>,
    pub date_to: Option<time::OffsetDateTime>,
    pub is_read: Option<bool>,
    pub is_flagged: Option<bool>,
    pub has_attachments: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub account_id: AccountId,
    pub last_sync_token: Option<String>,
    pub last_sync_date: Option<time::OffsetDateTime>,
    pub total_emails_synced: i64,
    pub last_error: Option<String>,
    pub sync_status: SyncStatus,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub account_count: i64,
    pub accounts_in_error: i64,
    pub stalest_sync_age_hours: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveStats {
    pub total_emails: i64,
    pub unread_emails: i64,
    pub flagged_emails: i64,
    pub per_mailbox: BTreeMap<String, i64>,
    pub per_month: BTreeMap<String, i64>,
}

#[derive(Debug, Clone)]
pub struct IntegrityCheck {
    pub name: &'static str,
    pub passed: bool,
    pub issue_count: i64,
}

#[derive(Debug, Clone)]
pub struct IntegrityRepairAction {
    pub name: &'static str,
    pub items_affected: i64,
}
