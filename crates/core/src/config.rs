use crate::error::EngineError;

const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 5000;
const DEFAULT_WEBHOOK_PORT: u16 = 8080;
const DEFAULT_OAUTH_PORT: u16 = 8081;

/// Credential configuration for C1/C2. Either a static bearer token or a
/// full OAuth client credential set must be present.
#[derive(Clone)]
pub enum RemoteCredential {
    StaticToken { token: String },
    OAuthClient { client_id: String, client_secret: String, token_endpoint: String },
}

impl std::fmt::Debug for RemoteCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteCredential::StaticToken { .. } => {
                f.debug_struct("StaticToken").field("token", &"[REDACTED]").finish()
            }
            RemoteCredential::OAuthClient { client_id, token_endpoint, .. } => f
                .debug_struct("OAuthClient")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("token_endpoint", token_endpoint)
                .finish(),
        }
    }
}

#[derive(Clone)]
pub struct EngineConfig {
    /// The natural key under which this account's Sync Cursor and OAuth
    /// Token rows are stored (spec §3's "Account" identifier). Not itself
    /// named in spec §6 — this single-process engine serves one account,
    /// and something has to name its cursor/token rows before the first
    /// JMAP session call resolves the provider's own account id.
    pub account_id: String,
    pub remote_credential: RemoteCredential,
    /// The JMAP session document URL (RFC 8620 §2 well-known discovery
    /// endpoint, or a provider-specific one). Not itself named in spec §6 —
    /// it is the address a `REMOTE_API_TOKEN`/OAuth credential is presented
    /// against, analogous to `STORE_URL` for the archive store.
    pub jmap_session_url: String,
    pub store_url: String,
    pub store_service_key: String,
    pub store_anon_key: Option<String>,
    pub sync_interval_minutes: u64,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub webhook_secret: Option<String>,
    pub webhook_port: u16,
    pub oauth_port: u16,
    pub encryption_key: String,
    pub log_level: String,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("account_id", &self.account_id)
            .field("remote_credential", &self.remote_credential)
            .field("jmap_session_url", &self.jmap_session_url)
            .field("store_url", &self.store_url)
            .field("store_service_key", &"[REDACTED]")
            .field("store_anon_key", &self.store_anon_key.as_ref().map(|_| "[REDACTED]"))
            .field("sync_interval_minutes", &self.sync_interval_minutes)
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .field("webhook_port", &self.webhook_port)
            .field("oauth_port", &self.oauth_port)
            .field("encryption_key", &"[REDACTED]")
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_reader(|key| std::env::var(key).ok())
    }

    /// Testable indirection over the environment lookup.
    pub fn from_reader(read: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let account_id = read("ACCOUNT_ID").unwrap_or_else(|| "default".to_string());

        let remote_credential = match read("REMOTE_API_TOKEN") {
            Some(token) => RemoteCredential::StaticToken { token },
            None => {
                let client_id = read("OAUTH_CLIENT_ID").ok_or_else(|| {
                    EngineError::Config(
                        "one of REMOTE_API_TOKEN or OAUTH_CLIENT_ID/OAUTH_CLIENT_SECRET is required"
                            .to_string(),
                    )
                })?;
                let client_secret = read("OAUTH_CLIENT_SECRET").ok_or_else(|| {
                    EngineError::Config("OAUTH_CLIENT_SECRET is required with OAUTH_CLIENT_ID".to_string())
                })?;
                let token_endpoint = read("OAUTH_TOKEN_ENDPOINT").ok_or_else(|| {
                    EngineError::Config("OAUTH_TOKEN_ENDPOINT is required with OAUTH_CLIENT_ID".to_string())
                })?;
                RemoteCredential::OAuthClient { client_id, client_secret, token_endpoint }
            }
        };

        let jmap_session_url = require(&read, "JMAP_SESSION_URL")?;
        let store_url = require(&read, "STORE_URL")?;
        let store_service_key = require(&read, "STORE_SERVICE_KEY")?;
        let store_anon_key = read("STORE_ANON_KEY");

        let sync_interval_minutes = parse_or_default(&read, "SYNC_INTERVAL_MINUTES", DEFAULT_SYNC_INTERVAL_MINUTES)?;
        let batch_size = parse_or_default(&read, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let max_retries = parse_or_default(&read, "MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let retry_delay_ms = parse_or_default(&read, "RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?;
        let webhook_port = parse_or_default(&read, "WEBHOOK_PORT", DEFAULT_WEBHOOK_PORT)?;
        let oauth_port = parse_or_default(&read, "OAUTH_PORT", DEFAULT_OAUTH_PORT)?;

        let webhook_secret = read("WEBHOOK_SECRET");
        let encryption_key = require(&read, "ENCRYPTION_KEY")?;
        let log_level = read("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            account_id,
            remote_credential,
            jmap_session_url,
            store_url,
            store_service_key,
            store_anon_key,
            sync_interval_minutes,
            batch_size,
            max_retries,
            retry_delay_ms,
            webhook_secret,
            webhook_port,
            oauth_port,
            encryption_key,
            log_level,
        })
    }

    /// `false` if no shared secret is configured — the webhook listener
    /// must fail closed in that case rather than skip verification.
    pub fn webhooks_configured(&self) -> bool {
        self.webhook_secret.is_some()
    }
}

fn require(read: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, EngineError> {
    read(key).ok_or_else(|| EngineError::Config(format!("{key} is required")))
}

fn parse_or_default<T: std::str::FromStr>(
    read: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, EngineError> {
    match read(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| EngineError::Config(format!("{key} has an invalid value: '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_encryption_key_is_fatal() {
        let read = env(&[
            ("REMOTE_API_TOKEN", "t"),
            ("JMAP_SESSION_URL", "https://mail.example.com/.well-known/jmap"),
            ("STORE_URL", "https://store"),
            ("STORE_SERVICE_KEY", "k"),
        ]);
        let err = EngineConfig::from_reader(read).unwrap_err();
        assert_eq!(err.taxon(), crate::error::ErrorTaxon::Config);
    }

    #[test]
    fn defaults_applied_when_optional_keys_absent() {
        let read = env(&[
            ("REMOTE_API_TOKEN", "t"),
            ("JMAP_SESSION_URL", "https://mail.example.com/.well-known/jmap"),
            ("STORE_URL", "https://store"),
            ("STORE_SERVICE_KEY", "k"),
            ("ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef"),
        ]);
        let config = EngineConfig::from_reader(read).unwrap();
        assert_eq!(config.sync_interval_minutes, DEFAULT_SYNC_INTERVAL_MINUTES);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!config.webhooks_configured());
    }
}
