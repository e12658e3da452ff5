use serde::Deserialize;
use std::collections::HashMap;

use super::{Id, JmapState};

/// The JMAP session document, fetched once per `open_session` call and held
/// for the lifetime of one sync tick. Exposes the account id, API URL,
/// advertised capabilities, and current session state per the C1 contract.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub capabilities: Capabilities,
    pub accounts: HashMap<Id, Account>,
    pub primary_accounts: PrimaryAccounts,
    pub username: String,
    pub api_url: String,
    pub download_url: String,
    pub upload_url: String,
    pub event_source_url: String,
    pub state: JmapState,
}

impl Session {
    /// The mail account id to operate on — the server's advertised primary
    /// account for the mail capability.
    pub fn account_id(&self) -> &Id {
        &self.primary_accounts.mail
    }
}

#[derive(Debug, Deserialize)]
pub struct PrimaryAccounts {
    #[serde(rename = "urn:ietf:params:jmap:core")]
    pub core: Id,
    #[serde(rename = "urn:ietf:params:jmap:mail")]
    pub mail: Id,
}

#[derive(Debug, Deserialize)]
pub struct Capabilities {
    #[serde(rename = "urn:ietf:params:jmap:core")]
    pub core: CoreCapabilities,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreCapabilities {
    pub max_size_request: u64,
    pub max_calls_in_request: u64,
    pub max_objects_in_get: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub name: String,
    pub is_personal: bool,
    pub is_read_only: bool,
}
