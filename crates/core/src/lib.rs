//! Core logic for the sync engine.
//!
//! This crate is designed to be pure and deterministic. Side effects
//! (JMAP calls, the archive database, the clock, encryption) live in
//! adapters and are injected through traits.

pub mod config;
pub mod error;
pub mod model;

pub use config::{EngineConfig, RemoteCredential};
pub use error::{EngineError, EngineResult, ErrorTaxon};
