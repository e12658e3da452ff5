use thiserror::Error;

/// The closed set of failure categories the engine reasons about.
///
/// Every error type in every crate of this workspace exposes a `taxon()`
/// accessor into this enum. The sync engine's retry/backoff dispatch
/// matches on the taxon, never on `Display` text or a substring of an
/// upstream error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorTaxon {
    Config,
    AuthFailure,
    Network,
    RateLimited,
    Protocol,
    StoreUnavailable,
    IntegrityViolation,
    Cancelled,
}

impl ErrorTaxon {
    /// Whether a tick-level failure of this taxon should be retried on the
    /// next tick (after backoff) or is terminal for the current tick only.
    ///
    /// All taxa are retryable at the account level — the engine never gives
    /// up on an account permanently on its own; it just keeps recording
    /// errors and backing off. `Cancelled` is the one exception: it means
    /// shutdown was requested and the tick should not be rescheduled.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorTaxon::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
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
}

impl EngineError {
    pub fn taxon(&self) -> ErrorTaxon {
        match self {
            EngineError::Config(_) => ErrorTaxon::Config,
            EngineError::AuthFailure(_) => ErrorTaxon::AuthFailure,
            EngineError::Network(_) => ErrorTaxon::Network,
            EngineError::RateLimited(_) => ErrorTaxon::RateLimited,
            EngineError::Protocol(_) => ErrorTaxon::Protocol,
            EngineError::StoreUnavailable(_) => ErrorTaxon::StoreUnavailable,
            EngineError::IntegrityViolation(_) => ErrorTaxon::IntegrityViolation,
            EngineError::Cancelled => ErrorTaxon::Cancelled,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
