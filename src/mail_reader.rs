use async_trait::async_trait;
use log::{debug, info, warn};

use crate::error::Result;
use crate::group_rules::admits;
use crate::group_rules::group_settings::{MailboxIdentity, SubscriberRule};
use crate::mail_reader::attachments::ContentStore;
use crate::mail_reader::message::{CanonicalMessage, RawMessage};

pub mod attachments;
pub mod display;
pub mod imap;
pub mod message;

/// Something that can hand over the unread messages of a mailbox.
#[async_trait(?Send)]
pub trait MailboxSource {
    async fn fetch_unread(&self, mailbox: &MailboxIdentity) -> Result<Vec<RawMessage>>;
}

/// Runs one raw message through normalisation, rule matching and
/// attachment extraction. `None` means the message is not surfaced.
pub fn process_message(
    raw: &RawMessage,
    rules: &[&SubscriberRule],
    store: &ContentStore,
) -> Option<CanonicalMessage> {
    let parsed = match message::parse(&raw.body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Dropping message {}: {}", raw.id, e);
            return None;
        }
    };
    let mut message = match message::normalize(&parsed) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping message {}: {}", raw.id, e);
            return None;
        }
    };

    if !rules
        .iter()
        .any(|rule| admits(rule, &message.from_email, &message.subject))
    {
        debug!("Message {} from {} matches no rule", raw.id, message.from_email);
        return None;
    }

    message.attachments = attachments::extract(&parsed, store);
    if message.attachments.is_empty() {
        debug!("Message {} has no usable attachments", raw.id);
        return None;
    }

    message.message_id = Some(raw.id);
    Some(message)
}

pub fn process_messages(
    raw_messages: &[RawMessage],
    rules: &[&SubscriberRule],
    store: &ContentStore,
) -> Vec<CanonicalMessage> {
    raw_messages
        .iter()
        .filter_map(|raw| process_message(raw, rules, store))
        .collect()
}

/// Fetches the unread messages of `mailbox` and keeps those that one of
/// `rules` admits and that carry at least one accepted attachment.
pub async fn fetch_unread_metadata<S: MailboxSource + ?Sized>(
    source: &S,
    mailbox: &MailboxIdentity,
    rules: &[&SubscriberRule],
    store: &ContentStore,
) -> Result<Vec<CanonicalMessage>> {
    let raw_messages = source.fetch_unread(mailbox).await?;
    let messages = process_messages(&raw_messages, rules, store);
    info!(
        "Mailbox {} ({}): {} unread, {} surfaced",
        mailbox.id,
        mailbox.host,
        raw_messages.len(),
        messages.len()
    );
    Ok(messages)
}
