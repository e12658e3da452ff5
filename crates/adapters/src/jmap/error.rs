use sync_engine_core::error::ErrorTaxon;
use thiserror::Error;

/// Errors C1 can return. Every variant preserves enough of the provider's
/// own error code/message for logging, but callers (C4) dispatch on
/// `taxon()`, never on `Display` text.
#[derive(Debug, Error)]
pub enum JmapError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl JmapError {
    pub fn taxon(&self) -> ErrorTaxon {
        match self {
            JmapError::Unauthorized(_) => ErrorTaxon::AuthFailure,
            JmapError::Network(_) => ErrorTaxon::Network,
            JmapError::RateLimited(_) => ErrorTaxon::RateLimited,
            JmapError::Protocol(_) => ErrorTaxon::Protocol,
        }
    }
}

impl From<reqwest::Error> for JmapError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().is_some_and(|status| status.as_u16() == 401 || status.as_u16() == 403) {
            JmapError::Unauthorized(err.to_string())
        } else if err.status().is_some_and(|status| status.as_u16() == 429) {
            JmapError::RateLimited(err.to_string())
        } else if err.is_timeout() || err.is_connect() || err.is_request() {
            JmapError::Network(err.to_string())
        } else {
            JmapError::Protocol(err.to_string())
        }
    }
}
