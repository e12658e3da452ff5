//! Side-effect adapters for the sync engine: the JMAP remote mail client
//! (C1), the encrypted OAuth token store (C2), and the per-account sync
//! engine driver (C4). Storage (C3) and the HTTP listener (C5) live in
//! their own crates.

pub mod crypto;
pub mod engine;
pub mod jmap;
pub mod token_store;

pub use crypto::{CryptoError, TokenCipher};
pub use engine::{SyncEngine, TickError};
pub use token_store::{OAuthClientCredentials, TokenStore, TokenStoreError};
