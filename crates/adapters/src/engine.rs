//! C4 Sync Engine: drives one account to eventual consistency with its
//! remote mailbox.
//!
//! Retry/backoff policy lives entirely here — C1 and C2 each issue one
//! round trip and return a typed error; this module decides whether to
//! retry, how long to wait, and when to give up on the current tick.

use std::sync::Arc;
use std::time::Duration;

use sync_engine_core::config::EngineConfig;
use sync_engine_core::error::ErrorTaxon;
use sync_engine_core::model::{EmailUpsert, SyncCursor, SyncStatus, Thread};
use sync_engine_storage::{Storage, StorageError};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::jmap::{self, JmapClient, JmapError, JmapState, Session};
use crate::token_store::{TokenStore, TokenStoreError};

#[derive(Debug, Error)]
pub enum TickError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failure: {0}")]
    AuthFailure(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("archive store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("a tick is already in flight for this account")]
    AlreadySyncing,
}

impl TickError {
    pub fn taxon(&self) -> Option<ErrorTaxon> {
        match self {
            TickError::Config(_) => Some(ErrorTaxon::Config),
            TickError::AuthFailure(_) => Some(ErrorTaxon::AuthFailure),
            TickError::Network(_) => Some(ErrorTaxon::Network),
            TickError::RateLimited(_) => Some(ErrorTaxon::RateLimited),
            TickError::Protocol(_) => Some(ErrorTaxon::Protocol),
            TickError::StoreUnavailable(_) => Some(ErrorTaxon::StoreUnavailable),
            TickError::IntegrityViolation(_) => Some(ErrorTaxon::IntegrityViolation),
            TickError::Cancelled => Some(ErrorTaxon::Cancelled),
            TickError::AlreadySyncing => None,
        }
    }
}

impl From<JmapError> for TickError {
    fn from(err: JmapError) -> Self {
        match err.taxon() {
            ErrorTaxon::AuthFailure => TickError::AuthFailure(err.to_string()),
            ErrorTaxon::Network => TickError::Network(err.to_string()),
            ErrorTaxon::RateLimited => TickError::RateLimited(err.to_string()),
            _ => TickError::Protocol(err.to_string()),
        }
    }
}

impl From<StorageError> for TickError {
    fn from(err: StorageError) -> Self {
        match err.taxon() {
            ErrorTaxon::IntegrityViolation => TickError::IntegrityViolation(err.to_string()),
            _ => TickError::StoreUnavailable(err.to_string()),
        }
    }
}

impl From<TokenStoreError> for TickError {
    fn from(err: TokenStoreError) -> Self {
        match err.taxon() {
            ErrorTaxon::AuthFailure => TickError::AuthFailure(err.to_string()),
            ErrorTaxon::Network => TickError::Network(err.to_string()),
            ErrorTaxon::Config => TickError::Config(err.to_string()),
            _ => TickError::StoreUnavailable(err.to_string()),
        }
    }
}

/// Access credential the engine presents to C1. A static bearer token never
/// refreshes — a 401 against it is immediately fatal to the tick, matching
/// spec §4.2's "refresh impossible" case.
enum Credential {
    Static(String),
    OAuth(TokenStore),
}

pub struct SyncEngine {
    storage: Storage,
    jmap: JmapClient,
    credential: Credential,
    account_id: String,
    batch_size: usize,
    max_retries: u32,
    retry_delay: Duration,
    sync_interval: Duration,
    tick_lock: Arc<Mutex<()>>,
    ticker: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl SyncEngine {
    pub fn new(
        storage: Storage,
        jmap: JmapClient,
        credential_store: Option<TokenStore>,
        static_token: Option<String>,
        config: &EngineConfig,
    ) -> Result<Self, TickError> {
        let credential = match (static_token, credential_store) {
            (Some(token), _) => Credential::Static(token),
            (None, Some(store)) => Credential::OAuth(store),
            (None, None) => {
                return Err(TickError::Config(
                    "SyncEngine requires either a static token or a token store".to_string(),
                ))
            }
        };

        Ok(Self {
            storage,
            jmap,
            credential,
            account_id: config.account_id.clone(),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            sync_interval: Duration::from_secs(config.sync_interval_minutes * 60),
            tick_lock: Arc::new(Mutex::new(())),
            ticker: Mutex::new(None),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Begins periodic ticks at the configured interval; performs an
    /// initial tick immediately. Idempotent: calling `start` while already
    /// started replaces the prior ticker.
    pub async fn start(self: &Arc<Self>) {
        self.stop().await;

        let (tx, mut rx) = oneshot::channel();
        let engine = Arc::clone(self);
        let interval = self.sync_interval;

        let handle = tokio::spawn(async move {
            if let Err(err) = engine.tick().await {
                tracing::warn!(account_id = %engine.account_id, error = %err, "initial tick failed");
            }
            loop {
                tokio::select! {
                    _ = &mut rx => {
                        tracing::info!(account_id = %engine.account_id, "ticker stopping");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(err) = engine.tick().await {
                            tracing::warn!(account_id = %engine.account_id, error = %err, "scheduled tick failed");
                        }
                    }
                }
            }
        });

        *self.ticker.lock().await = Some((tx, handle));
    }

    /// Halts the ticker and waits for any in-flight tick to complete.
    pub async fn stop(&self) {
        if let Some((tx, handle)) = self.ticker.lock().await.take() {
            let _ = tx.send(());
            let _ = handle.await;
        }
        // Block until a currently running tick releases the lock.
        let _ = self.tick_lock.lock().await;
    }

    /// One pass of the per-account sync algorithm (spec §4.4). Rejects a
    /// concurrent tick for the same account rather than queuing behind it.
    pub async fn tick(&self) -> Result<SyncCursor, TickError> {
        let _permit = self.tick_lock.try_lock().map_err(|_| TickError::AlreadySyncing)?;
        self.run_tick().await
    }

    async fn run_tick(&self) -> Result<SyncCursor, TickError> {
        self.storage.initialize_cursor(&self.account_id)?;
        let cursor = self.storage.advance_cursor(&self.account_id, None, 0, SyncStatus::Syncing)?;

        let outcome = self.run_tick_body(&cursor).await;
        match outcome {
            Ok(()) => Ok(self.storage.get_cursor(&self.account_id)?.unwrap_or(cursor)),
            Err(err) => {
                if matches!(err, TickError::Cancelled) {
                    return Err(err);
                }
                self.storage.record_error(&self.account_id, &err.to_string())?;
                Err(err)
            }
        }
    }

    async fn run_tick_body(&self, cursor: &SyncCursor) -> Result<(), TickError> {
        let (session, access_token) = self.obtain_session().await?;

        let mailboxes = self.with_retries(|| self.jmap.list_mailboxes(&access_token, &session)).await?;
        for mailbox in mailboxes {
            self.storage.upsert_mailbox(&jmap::mailbox_to_upsert(mailbox))?;
        }

        let mut since = cursor.last_sync_token.clone();
        loop {
            let since_state = since.clone().map(JmapState);
            let page = self
                .with_retries(|| self.jmap.query_emails(&access_token, &session, None, since_state.as_ref(), self.batch_size as u64))
                .await?;

            if page.ids.is_empty() {
                break;
            }

            let emails = self.with_retries(|| self.jmap.get_emails(&access_token, &session, &page.ids)).await?;
            let upserts: Vec<EmailUpsert> = emails.into_iter().map(jmap::email_to_upsert).collect();
            let written = self.storage.batch_upsert_emails(&upserts)?;

            self.refresh_touched_threads(&access_token, &session, &upserts).await;

            let is_final_page = page.ids.len() < self.batch_size;
            let status = if is_final_page { SyncStatus::Completed } else { SyncStatus::Syncing };
            self.storage.advance_cursor(&self.account_id, Some(&page.next_state.0), written.len() as i64, status)?;

            since = Some(page.next_state.0);
            if is_final_page {
                break;
            }
        }

        Ok(())
    }

    /// Webhook-triggered single-item pull and upsert. May run concurrently
    /// with a tick — both paths only ever perform idempotent upserts.
    pub async fn sync_one(&self, remote_email_id: &str) -> Result<(), TickError> {
        let (session, access_token) = self.obtain_session().await?;
        let id = jmap::Id(remote_email_id.to_string());

        let Some(email) = self.with_retries(|| self.jmap.get_email(&access_token, &session, &id)).await? else {
            tracing::warn!(remote_id = remote_email_id, "sync_one: email not found upstream, ignoring");
            return Ok(());
        };

        let upsert = jmap::email_to_upsert(email);
        self.storage.upsert_email(&upsert)?;
        self.refresh_touched_threads(&access_token, &session, std::slice::from_ref(&upsert)).await;
        Ok(())
    }

    /// Webhook-triggered tombstone.
    pub async fn mark_deleted(&self, remote_email_id: &str) -> Result<(), TickError> {
        self.storage.mark_email_deleted(remote_email_id)?;
        Ok(())
    }

    /// Clears or pins the cursor for a full re-pull.
    pub async fn reset(&self, new_cursor: Option<&str>) -> Result<SyncCursor, TickError> {
        Ok(self.storage.reset_cursor(&self.account_id, new_cursor)?)
    }

    async fn obtain_session(&self) -> Result<(Session, String), TickError> {
        let mut access_token = self.current_access_token().await?;

        match self.jmap.open_session(&access_token).await {
            Ok(session) => Ok((session, access_token)),
            Err(JmapError::Unauthorized(_)) => {
                access_token = self.refresh_credential().await?;
                match self.jmap.open_session(&access_token).await {
                    Ok(session) => Ok((session, access_token)),
                    Err(JmapError::Unauthorized(msg)) => Err(TickError::AuthFailure(msg)),
                    Err(other) => Err(other.into()),
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn current_access_token(&self) -> Result<String, TickError> {
        match &self.credential {
            Credential::Static(token) => Ok(token.clone()),
            Credential::OAuth(store) => {
                let token = store
                    .get(&self.account_id)?
                    .ok_or_else(|| TickError::AuthFailure(format!("no token on file for account {}", self.account_id)))?;
                if store.needs_refresh(&token) {
                    self.refresh_credential().await
                } else {
                    Ok(token.access_token)
                }
            }
        }
    }

    async fn refresh_credential(&self) -> Result<String, TickError> {
        match &self.credential {
            Credential::Static(_) => Err(TickError::AuthFailure("static credential cannot be refreshed".to_string())),
            Credential::OAuth(store) => Ok(store.refresh(&self.account_id).await?.access_token),
        }
    }

    /// Retries transient failures (`Network`, `RateLimited`) up to
    /// `max_retries` times with exponential backoff from `retry_delay`.
    /// `AuthFailure` is handled one level up via refresh-then-retry;
    /// `Protocol`/`Config`/`IntegrityViolation` are not retried.
    async fn with_retries<T, F, Fut>(&self, mut call: F) -> Result<T, TickError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, JmapError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if matches!(err, JmapError::Network(_) | JmapError::RateLimited(_)) && attempt < self.max_retries => {
                    let delay = self.retry_delay * 2u32.pow(attempt);
                    tracing::warn!(account_id = %self.account_id, attempt, error = %err, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Best-effort refresh of Thread rows touched by a batch of upserted
    /// emails. Failure here does not fail the tick — Thread rows are a
    /// derived convenience view, and the next tick naturally retries them
    /// as more emails in the same thread arrive.
    async fn refresh_touched_threads(&self, access_token: &str, session: &Session, upserts: &[EmailUpsert]) {
        use std::collections::BTreeSet;

        let thread_ids: BTreeSet<String> = upserts.iter().filter_map(|e| e.thread_id.clone()).collect();
        if thread_ids.is_empty() {
            return;
        }

        let ids: Vec<jmap::Id> = thread_ids.into_iter().map(jmap::Id).collect();
        let threads = match self.jmap.get_threads(access_token, session, &ids).await {
            Ok(threads) => threads,
            Err(err) => {
                tracing::warn!(error = %err, "failed to refresh thread metadata, continuing tick");
                return;
            }
        };

        for jmap_thread in threads {
            if let Err(err) = self.upsert_thread_from_emails(jmap_thread) {
                tracing::warn!(error = %err, "failed to persist thread metadata, continuing tick");
            }
        }
    }

    fn upsert_thread_from_emails(&self, jmap_thread: jmap::JmapThread) -> Result<(), TickError> {
        use std::collections::BTreeMap;

        let mut mailbox_membership = BTreeMap::new();
        let mut unread_count = 0i64;
        let mut last_message_date = None;
        let mut subject = None;

        for email_id in &jmap_thread.email_ids {
            let Some(email) = self.storage.get_email_by_remote_id(&email_id.0)? else {
                continue;
            };
            mailbox_membership.insert(email.mailbox_id.clone(), true);
            if !email.is_read {
                unread_count += 1;
            }
            if subject.is_none() {
                subject = email.subject.clone();
            }
            if let Some(date) = email.date_received {
                last_message_date = Some(last_message_date.map_or(date, |current: time::OffsetDateTime| current.max(date)));
            }
        }

        let email_remote_ids: Vec<String> = jmap_thread.email_ids.iter().map(|id| id.0.clone()).collect();
        let thread = Thread {
            id: jmap_thread.id.0,
            message_count: email_remote_ids.len() as i64,
            email_remote_ids,
            subject,
            mailbox_membership,
            unread_count,
            last_message_date,
        };

        self.storage.upsert_thread(&thread)?;
        Ok(())
    }
}
