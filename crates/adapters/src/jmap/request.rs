use serde::{ser::SerializeSeq, Serialize, Serializer};
use std::collections::HashMap;

use super::{Id, JmapState};

#[derive(Serialize)]
pub enum CapabilityKind {
    #[serde(rename = "urn:ietf:params:jmap:core")]
    Core,
    #[serde(rename = "urn:ietf:params:jmap:mail")]
    Mail,
}

pub const USING: &[CapabilityKind] = &[CapabilityKind::Core, CapabilityKind::Mail];

/// One compound request: every method carries the capability identifiers
/// it needs and a list of tagged method calls, processed sequentially by
/// the server.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<'a> {
    pub using: &'a [CapabilityKind],
    pub method_calls: &'a [RequestInvocation<'a>],
}

pub struct RequestInvocation<'a> {
    pub call: MethodCall<'a>,
    pub id: &'a str,
}

impl<'a> Serialize for RequestInvocation<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(self.call.method_name())?;
        seq.serialize_element(&self.call)?;
        seq.serialize_element(self.id)?;
        seq.end()
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum MethodCall<'a> {
    MailboxGet(MethodCallGet<'a>),
    EmailQuery(MethodCallQuery<'a>),
    EmailGet(MethodCallEmailGet<'a>),
    EmailSet(MethodCallSetKeywords<'a>),
    ThreadQuery(MethodCallQuery<'a>),
    ThreadGet(MethodCallGet<'a>),
}

impl<'a> MethodCall<'a> {
    fn method_name(&self) -> &'static str {
        match self {
            MethodCall::MailboxGet(_) => "Mailbox/get",
            MethodCall::EmailQuery(_) => "Email/query",
            MethodCall::EmailGet(_) => "Email/get",
            MethodCall::EmailSet(_) => "Email/set",
            MethodCall::ThreadQuery(_) => "Thread/query",
            MethodCall::ThreadGet(_) => "Thread/get",
        }
    }
}

/// `Email/get`'s projection is fixed by the C1 contract: identifiers,
/// thread id, mailbox ids, headers, subject, timestamps, bodies,
/// attachments, keywords, size. `fetch_*_body_values` asks the server to
/// inline the body part contents instead of returning only `bodyStructure`
/// references.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodCallEmailGet<'a> {
    pub account_id: &'a Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<&'a [Id]>,
    pub properties: &'a [&'a str],
    pub fetch_text_body_values: bool,
    pub fetch_html_body_values: bool,
}

/// The fixed projection named in the C1 contract (spec §4.1).
pub const EMAIL_PROJECTION: &[&str] = &[
    "id",
    "threadId",
    "mailboxIds",
    "from",
    "to",
    "cc",
    "bcc",
    "replyTo",
    "messageId",
    "inReplyTo",
    "references",
    "subject",
    "receivedAt",
    "header:Date:asDate",
    "textBody",
    "htmlBody",
    "bodyValues",
    "attachments",
    "keywords",
    "size",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodCallGet<'a> {
    pub account_id: &'a Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<&'a [Id]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<&'a [&'a str]>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodCallQuery<'a> {
    pub account_id: &'a Id,
    /// Opaque provider sync token: `Email/query`'s nearest equivalent in
    /// this client is expressed via `Email/changes`-style `since_state`
    /// when present; omitted entirely for a first (cold-start) query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_state: Option<&'a JmapState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// The spec mandates provider-order results and forbids depending on a
    /// client-requested global date order — this client never sends a
    /// `sort` argument, matching the Open Question resolution in
    /// `SPEC_FULL.md` §12.1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<QueryFilter<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_mailbox: Option<&'a Id>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodCallSetKeywords<'a> {
    pub account_id: &'a Id,
    pub update: HashMap<&'a Id, HashMap<&'static str, bool>>,
}
