//! C1 Remote Mail Client: a JMAP (RFC 8620) request/response client scoped
//! to the methods the sync engine needs (`Mailbox/get`, `Email/query`,
//! `Email/get`, `Email/set`, `Thread/query`, `Thread/get`).
//!
//! Shaped after the compound-request / parallel-response protocol: every
//! method issues one `Request` carrying a list of `method_calls`, each
//! tagged with a call id, and receives back a parallel list of
//! `method_responses`. This module only describes the wire shapes and the
//! single HTTP round trip; retry policy belongs to the sync engine (C4), not
//! here.

mod client;
mod convert;
mod error;
mod request;
mod response;
mod session;

pub use client::{JmapClient, QueryPage};
pub use convert::{email_to_upsert, mailbox_to_upsert};
pub use error::JmapError;
pub use request::*;
pub use response::*;
pub use session::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A JMAP identifier. Opaque to us — never parsed, only compared and
/// round-tripped.
#[derive(Eq, PartialEq, Hash, Clone, Serialize, Deserialize, Debug)]
pub struct Id(pub String);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id(value.to_string())
    }
}

/// A JMAP state token (`sinceState`/`newState`). Opaque — stored and
/// presented unchanged, per spec cursor semantics.
#[derive(Eq, PartialEq, Hash, Clone, Serialize, Deserialize, Debug)]
pub struct JmapState(pub String);

impl fmt::Display for JmapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
