use serde::{
    de::{Error, SeqAccess, Visitor},
    Deserialize, Deserializer,
};
use std::{collections::HashMap, fmt};

use super::{Id, JmapState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub method_responses: Vec<ResponseInvocation>,
    pub session_state: JmapState,
}

#[derive(Debug)]
pub struct ResponseInvocation {
    pub call: MethodResponse,
    pub id: String,
}

impl<'de> Deserialize<'de> for ResponseInvocation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;

        impl<'de> Visitor<'de> for V {
            type Value = ResponseInvocation;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a [name, arguments, id] triple")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let name: String = seq.next_element()?.ok_or_else(|| Error::invalid_length(0, &"3"))?;
                let missing = || Error::invalid_length(1, &"3");

                let call = match name.as_str() {
                    "Mailbox/get" => MethodResponse::MailboxGet(seq.next_element()?.ok_or_else(missing)?),
                    "Email/query" => MethodResponse::EmailQuery(seq.next_element()?.ok_or_else(missing)?),
                    "Email/get" => MethodResponse::EmailGet(seq.next_element()?.ok_or_else(missing)?),
                    "Email/set" => MethodResponse::EmailSet(seq.next_element()?.ok_or_else(missing)?),
                    "Thread/query" => MethodResponse::ThreadQuery(seq.next_element()?.ok_or_else(missing)?),
                    "Thread/get" => MethodResponse::ThreadGet(seq.next_element()?.ok_or_else(missing)?),
                    "error" => MethodResponse::Error(seq.next_element()?.ok_or_else(missing)?),
                    other => {
                        return Err(Error::unknown_field(
                            other,
                            &["Mailbox/get", "Email/query", "Email/get", "Email/set", "Thread/query", "Thread/get", "error"],
                        ))
                    }
                };

                let id: String = seq.next_element()?.ok_or_else(|| Error::invalid_length(2, &"3"))?;
                Ok(ResponseInvocation { call, id })
            }
        }

        deserializer.deserialize_seq(V)
    }
}

#[derive(Debug)]
pub enum MethodResponse {
    MailboxGet(MethodResponseGet<JmapMailbox>),
    EmailQuery(MethodResponseQuery),
    EmailGet(MethodResponseGet<JmapEmail>),
    EmailSet(MethodResponseSet),
    ThreadQuery(MethodResponseQuery),
    ThreadGet(MethodResponseGet<JmapThread>),
    Error(MethodResponseError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodResponseGet<T> {
    pub account_id: Id,
    pub state: JmapState,
    pub list: Vec<T>,
    pub not_found: Vec<Id>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodResponseQuery {
    pub account_id: Id,
    pub query_state: JmapState,
    pub ids: Vec<Id>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodResponseSet {
    pub account_id: Id,
    #[serde(default)]
    pub updated: Option<HashMap<Id, serde_json::Value>>,
    #[serde(default)]
    pub not_updated: Option<HashMap<Id, MethodResponseError>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodResponseError {
    #[serde(rename = "type")]
    pub kind: MethodResponseErrorKind,
    pub description: Option<String>,
}

/// The subset of the JMAP error-type registry the engine needs to tell
/// apart; anything else is collapsed into `Other` and treated as
/// `Protocol` by the taxon mapping — it is still the provider violating
/// its own contract from our point of view.
#[derive(Debug, Deserialize, Copy, Clone)]
#[serde(rename_all = "camelCase")]
pub enum MethodResponseErrorKind {
    AccountNotFound,
    Forbidden,
    RequestTooLarge,
    InvalidArguments,
    CannotCalculateChanges,
    ServerUnavailable,
    #[serde(rename = "serverFail")]
    ServerFail,
    RateLimit,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JmapMailbox {
    pub id: Id,
    pub parent_id: Option<Id>,
    pub name: String,
    pub role: Option<String>,
    #[serde(default)]
    pub sort_order: u64,
    #[serde(default)]
    pub total_emails: u64,
    #[serde(default)]
    pub unread_emails: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailBodyValue {
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailBodyPart {
    pub part_id: Option<String>,
    pub blob_id: Option<Id>,
    #[serde(default)]
    pub size: u64,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub cid: Option<String>,
    pub disposition: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JmapEmail {
    pub id: Id,
    pub thread_id: Id,
    #[serde(default)]
    pub mailbox_ids: HashMap<Id, bool>,
    pub subject: Option<String>,
    #[serde(default)]
    pub from: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub to: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub cc: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub bcc: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub reply_to: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub message_id: Option<Vec<String>>,
    #[serde(default)]
    pub in_reply_to: Option<Vec<String>>,
    #[serde(default)]
    pub references: Option<Vec<String>>,
    pub received_at: Option<String>,
    #[serde(rename = "header:Date:asDate")]
    pub sent_at: Option<String>,
    #[serde(default)]
    pub text_body: Vec<EmailBodyPart>,
    #[serde(default)]
    pub html_body: Vec<EmailBodyPart>,
    #[serde(default)]
    pub body_values: HashMap<String, EmailBodyValue>,
    #[serde(default)]
    pub attachments: Vec<EmailBodyPart>,
    #[serde(default)]
    pub keywords: HashMap<String, bool>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JmapThread {
    pub id: Id,
    pub email_ids: Vec<Id>,
}
