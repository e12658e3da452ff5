//! C2 Token Store: durable, confidential storage of OAuth credentials.
//!
//! Tokens are persisted through the Archive Store (the sole writer of any
//! row) but encrypted and decrypted here — the store never sees plaintext
//! and never returns ciphertext to callers.

use reqwest::Client as HttpClient;
use serde::Deserialize;
use sync_engine_core::error::ErrorTaxon;
use sync_engine_core::model::OAuthToken;
use sync_engine_storage::{EncryptedTokenRow, Storage, StorageError};
use thiserror::Error;
use time::OffsetDateTime;

use crate::crypto::{CryptoError, TokenCipher};

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("no token on file for account {0}")]
    MissingToken(String),

    #[error("refresh is not possible: account uses a static credential")]
    StaticCredential,
}

impl TokenStoreError {
    pub fn taxon(&self) -> ErrorTaxon {
        match self {
            TokenStoreError::Storage(e) => e.taxon(),
            TokenStoreError::Crypto(_) => ErrorTaxon::Config,
            TokenStoreError::Unauthorized(_) => ErrorTaxon::AuthFailure,
            TokenStoreError::Network(_) => ErrorTaxon::Network,
            TokenStoreError::MissingToken(_) => ErrorTaxon::AuthFailure,
            TokenStoreError::StaticCredential => ErrorTaxon::Config,
        }
    }
}

/// Credentials needed to exchange a refresh token with the provider's
/// authorization endpoint (the "external OAuth collaborator" in spec
/// §4.2). Absent when the account was configured with a static bearer
/// token (`REMOTE_API_TOKEN`), in which case `refresh` is never called.
#[derive(Clone)]
pub struct OAuthClientCredentials {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    expires_in: i64,
    scope: Option<String>,
}

pub struct TokenStore {
    storage: Storage,
    cipher: TokenCipher,
    http: HttpClient,
    oauth: Option<OAuthClientCredentials>,
}

impl TokenStore {
    pub fn new(storage: Storage, cipher: TokenCipher, oauth: Option<OAuthClientCredentials>) -> Self {
        Self { storage, cipher, http: HttpClient::new(), oauth }
    }

    /// Upsert; existing row for `account_id` is overwritten entirely.
    pub fn put(&self, token: &OAuthToken) -> Result<(), TokenStoreError> {
        let (access_ciphertext, access_nonce) = self.cipher.encrypt(token.access_token.as_bytes())?;
        let (refresh_ciphertext, refresh_nonce) = match &token.refresh_token {
            Some(refresh) => {
                let (c, n) = self.cipher.encrypt(refresh.as_bytes())?;
                (Some(c), Some(n))
            }
            None => (None, None),
        };

        self.storage.upsert_oauth_token(&EncryptedTokenRow {
            account_id: token.account_id.clone(),
            access_token_ciphertext: access_ciphertext,
            access_token_nonce: access_nonce,
            refresh_token_ciphertext: refresh_ciphertext,
            refresh_token_nonce: refresh_nonce,
            token_type: token.token_type.clone(),
            expires_at: token.expires_at,
            scope: token.scope.clone(),
            created_at: token.created_at,
            updated_at: token.updated_at,
        })?;
        Ok(())
    }

    /// Returns the decrypted token or `None` — never errors on absence.
    pub fn get(&self, account_id: &str) -> Result<Option<OAuthToken>, TokenStoreError> {
        let Some(row) = self.storage.get_oauth_token(account_id)? else {
            return Ok(None);
        };
        Ok(Some(self.decrypt_row(row)?))
    }

    /// Idempotent.
    pub fn delete(&self, account_id: &str) -> Result<(), TokenStoreError> {
        self.storage.delete_oauth_token(account_id)?;
        Ok(())
    }

    pub fn needs_refresh(&self, token: &OAuthToken) -> bool {
        token.needs_refresh(OffsetDateTime::now_utc())
    }

    /// Exchanges the stored refresh token with the provider. The new token
    /// replaces the prior row atomically only after a successful exchange
    /// — a failed refresh leaves the previous row untouched.
    pub async fn refresh(&self, account_id: &str) -> Result<OAuthToken, TokenStoreError> {
        let Some(oauth) = &self.oauth else {
            return Err(TokenStoreError::StaticCredential);
        };

        let current = self.get(account_id)?.ok_or_else(|| TokenStoreError::MissingToken(account_id.to_string()))?;
        let Some(refresh_token) = &current.refresh_token else {
            return Err(TokenStoreError::Unauthorized("no refresh token on file".to_string()));
        };

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&oauth.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|err| TokenStoreError::Network(err.to_string()))?;

        if response.status().as_u16() == 401 || response.status().as_u16() == 400 {
            return Err(TokenStoreError::Unauthorized("refresh token rejected by provider".to_string()));
        }
        if !response.status().is_success() {
            return Err(TokenStoreError::Network(format!("token endpoint returned {}", response.status())));
        }

        let body: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|err| TokenStoreError::Network(format!("malformed token response: {err}")))?;

        let now = OffsetDateTime::now_utc();
        let refreshed = OAuthToken {
            account_id: account_id.to_string(),
            access_token: body.access_token,
            refresh_token: body.refresh_token.or(current.refresh_token),
            token_type: body.token_type,
            expires_at: now + time::Duration::seconds(body.expires_in.max(0)),
            scope: body.scope.or(current.scope),
            created_at: current.created_at,
            updated_at: now,
        };

        self.put(&refreshed)?;
        Ok(refreshed)
    }

    fn decrypt_row(&self, row: EncryptedTokenRow) -> Result<OAuthToken, TokenStoreError> {
        let access_token = String::from_utf8(self.cipher.decrypt(&row.access_token_ciphertext, &row.access_token_nonce)?)
            .map_err(|_| CryptoError::Decrypt)?;

        let refresh_token = match (row.refresh_token_ciphertext, row.refresh_token_nonce) {
            (Some(ciphertext), Some(nonce)) => {
                Some(String::from_utf8(self.cipher.decrypt(&ciphertext, &nonce)?).map_err(|_| CryptoError::Decrypt)?)
            }
            _ => None,
        };

        Ok(OAuthToken {
            account_id: row.account_id,
            access_token,
            refresh_token,
            token_type: row.token_type,
            expires_at: row.expires_at,
            scope: row.scope,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> TokenStore {
        let storage = Storage::open_in_memory_for_tests().unwrap();
        let cipher = TokenCipher::from_hex_key("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd").unwrap();
        TokenStore::new(storage, cipher, None)
    }

    fn sample_token(account_id: &str) -> OAuthToken {
        let now = OffsetDateTime::now_utc();
        OAuthToken {
            account_id: account_id.to_string(),
            access_token: "access-xyz".to_string(),
            refresh_token: Some("refresh-xyz".to_string()),
            token_type: "Bearer".to_string(),
            expires_at: now + time::Duration::hours(1),
            scope: Some("mail".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn put_then_get_round_trips_plaintext() {
        let store = test_store();
        let token = sample_token("acct-1");
        store.put(&token).unwrap();

        let fetched = store.get("acct-1").unwrap().unwrap();
        assert_eq!(fetched.access_token, "access-xyz");
        assert_eq!(fetched.refresh_token.as_deref(), Some("refresh-xyz"));
    }

    #[test]
    fn get_on_absent_account_returns_none_not_error() {
        let store = test_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = test_store();
        store.put(&sample_token("acct-1")).unwrap();
        store.delete("acct-1").unwrap();
        store.delete("acct-1").unwrap();
        assert!(store.get("acct-1").unwrap().is_none());
    }

    #[test]
    fn needs_refresh_true_within_five_minutes_of_expiry() {
        let store = test_store();
        let mut token = sample_token("acct-1");
        token.expires_at = OffsetDateTime::now_utc() + time::Duration::minutes(1);
        assert!(store.needs_refresh(&token));

        token.expires_at = OffsetDateTime::now_utc() + time::Duration::hours(1);
        assert!(!store.needs_refresh(&token));
    }

    #[tokio::test]
    async fn refresh_without_oauth_client_is_an_error() {
        let store = test_store();
        store.put(&sample_token("acct-1")).unwrap();
        let err = store.refresh("acct-1").await.unwrap_err();
        assert!(matches!(err, TokenStoreError::StaticCredential));
    }
}
