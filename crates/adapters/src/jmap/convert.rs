use std::collections::BTreeMap;

use sync_engine_core::model::{Attachment, EmailUpsert, MailboxUpsert};
use time::OffsetDateTime;

use super::{EmailAddress, JmapEmail, JmapMailbox};

pub fn mailbox_to_upsert(mailbox: JmapMailbox) -> MailboxUpsert {
    MailboxUpsert {
        remote_id: mailbox.id.0,
        name: mailbox.name,
        parent_remote_id: mailbox.parent_id.map(|id| id.0),
        role: mailbox.role,
        sort_order: mailbox.sort_order as i64,
        total_emails: mailbox.total_emails as i64,
        unread_emails: mailbox.unread_emails as i64,
    }
}

pub fn email_to_upsert(email: JmapEmail) -> EmailUpsert {
    let mailbox_id = email
        .mailbox_ids
        .iter()
        .find(|(_, in_mailbox)| **in_mailbox)
        .map(|(id, _)| id.0.clone())
        .unwrap_or_default();

    let body_text = first_body_text(&email.text_body, &email.body_values);
    let body_html = first_body_text(&email.html_body, &email.body_values);

    let attachments = email
        .attachments
        .into_iter()
        .map(|part| Attachment {
            id: part.part_id.clone().unwrap_or_default(),
            blob_id: part.blob_id.map(|id| id.0).unwrap_or_default(),
            name: part.name,
            mime_type: part.mime_type,
            size: part.size as i64,
            content_id: part.cid,
            inline: part.disposition.as_deref() == Some("inline"),
        })
        .collect();

    let flags: BTreeMap<String, bool> = email.keywords.into_iter().collect();

    EmailUpsert {
        remote_id: email.id.0,
        thread_id: Some(email.thread_id.0),
        mailbox_id,
        subject: email.subject,
        from_address: email.from.as_ref().and_then(|addrs| addrs.first()).map(format_address),
        to_addresses: format_addresses(email.to),
        cc_addresses: format_addresses(email.cc),
        bcc_addresses: format_addresses(email.bcc),
        reply_to_addresses: format_addresses(email.reply_to),
        date_received: email.received_at.as_deref().and_then(parse_utc_date),
        date_sent: email.sent_at.as_deref().and_then(parse_utc_date),
        message_id: email.message_id.and_then(|ids| ids.into_iter().next()),
        in_reply_to: email.in_reply_to.and_then(|ids| ids.into_iter().next()),
        references: email.references.unwrap_or_default(),
        body_text,
        body_html,
        attachments,
        flags,
        size_bytes: email.size as i64,
    }
}

fn format_address(addr: &EmailAddress) -> String {
    match &addr.name {
        Some(name) if !name.is_empty() => format!("{name} <{}>", addr.email),
        _ => addr.email.clone(),
    }
}

fn format_addresses(addrs: Option<Vec<EmailAddress>>) -> Vec<String> {
    addrs.unwrap_or_default().iter().map(format_address).collect()
}

fn first_body_text(
    parts: &[super::EmailBodyPart],
    values: &std::collections::HashMap<String, super::EmailBodyValue>,
) -> Option<String> {
    parts
        .first()
        .and_then(|part| part.part_id.as_ref())
        .and_then(|part_id| values.get(part_id))
        .map(|value| value.value.clone())
}

/// JMAP `UTCDate` is RFC 3339. Malformed dates are dropped rather than
/// failing the whole email — a missing timestamp is not a reason to lose
/// the rest of the record.
fn parse_utc_date(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jmap::Id;
    use std::collections::HashMap;

    #[test]
    fn mailbox_conversion_preserves_remote_id_as_natural_key() {
        let mailbox = JmapMailbox {
            id: Id("mbx-1".to_string()),
            parent_id: None,
            name: "Inbox".to_string(),
            role: Some("inbox".to_string()),
            sort_order: 0,
            total_emails: 10,
            unread_emails: 3,
        };
        let upsert = mailbox_to_upsert(mailbox);
        assert_eq!(upsert.remote_id, "mbx-1");
        assert_eq!(upsert.total_emails, 10);
    }

    #[test]
    fn email_conversion_picks_first_in_mailbox_true() {
        let mut mailbox_ids = HashMap::new();
        mailbox_ids.insert(Id("mbx-1".to_string()), true);
        let email = JmapEmail {
            id: Id("e1".to_string()),
            thread_id: Id("t1".to_string()),
            mailbox_ids,
            subject: Some("hi".to_string()),
            from: Some(vec![EmailAddress { name: Some("Alice".to_string()), email: "a@example.com".to_string() }]),
            to: None,
            cc: None,
            bcc: None,
            reply_to: None,
            message_id: None,
            in_reply_to: None,
            references: None,
            received_at: None,
            sent_at: None,
            text_body: vec![],
            html_body: vec![],
            body_values: HashMap::new(),
            attachments: vec![],
            keywords: HashMap::new(),
            size: 0,
        };
        let upsert = email_to_upsert(email);
        assert_eq!(upsert.mailbox_id, "mbx-1");
        assert_eq!(upsert.from_address.as_deref(), Some("Alice <a@example.com>"));
    }
}
