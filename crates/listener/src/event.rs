//! Webhook event envelope (spec §6).

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub account_id: String,
    pub email_id: Option<String>,
    pub mailbox_id: Option<String>,
    #[serde(default)]
    pub changes: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[serde(rename = "email.received")]
    EmailReceived,
    #[serde(rename = "email.updated")]
    EmailUpdated,
    #[serde(rename = "email.deleted")]
    EmailDeleted,
    #[serde(rename = "mailbox.updated")]
    MailboxUpdated,
    /// Forward-compatibility: an event type we don't recognize yet is
    /// logged and acknowledged with 200, never rejected.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_event_types() {
        let raw = r#"{"type":"email.received","accountId":"acct-1","emailId":"e1"}"#;
        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, EventKind::EmailReceived);
        assert_eq!(event.email_id.as_deref(), Some("e1"));
    }

    #[test]
    fn unknown_event_type_does_not_fail_to_parse() {
        let raw = r#"{"type":"mailbox.renamed","accountId":"acct-1"}"#;
        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
    }
}
