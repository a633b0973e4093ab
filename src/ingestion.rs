use futures::future::join_all;
use itertools::Itertools;
use log::{error, info};

use crate::group_rules::admits;
use crate::group_rules::group_settings::{MailboxIdentity, SubscriberRule};
use crate::mail_reader::attachments::ContentStore;
use crate::mail_reader::message::CanonicalMessage;
use crate::mail_reader::{fetch_unread_metadata, MailboxSource};

/// Distinct mailboxes referenced by `rules`, in order of first appearance.
pub fn unique_mailboxes(rules: &[SubscriberRule]) -> Vec<&MailboxIdentity> {
    rules.iter().map(|rule| &rule.mailbox).unique().collect()
}

pub fn rules_for_mailbox<'r>(rules: &'r [SubscriberRule], mailbox: &MailboxIdentity) -> Vec<&'r SubscriberRule> {
    rules.iter().filter(|rule| &rule.mailbox == mailbox).collect()
}

/// Records on every message the id of every rule that admits it, whichever
/// mailbox the rule belongs to. Ids already present are not repeated.
pub fn tag_matching_rules(messages: &mut [CanonicalMessage], rules: &[SubscriberRule]) {
    for message in messages.iter_mut() {
        for rule in rules {
            if admits(rule, &message.from_email, &message.subject)
                && !message.group_settings_ids.contains(&rule.id)
            {
                message.group_settings_ids.push(rule.id.clone());
            }
        }
    }
}

/// One ingestion pass over all mailboxes the rules point at.
pub struct Ingestion<S> {
    source: S,
    store: ContentStore,
}

impl<S: MailboxSource> Ingestion<S> {
    pub fn new(source: S, store: ContentStore) -> Self {
        Ingestion { source, store }
    }

    async fn run_session(&self, mailbox: &MailboxIdentity, rules: Vec<&SubscriberRule>) -> Vec<CanonicalMessage> {
        match fetch_unread_metadata(&self.source, mailbox, &rules, &self.store).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(
                    "Skipping mailbox {} ({}@{}), {} error: {}",
                    mailbox.id,
                    mailbox.username,
                    mailbox.host,
                    e.kind(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Reads every distinct mailbox once, concurrently, and returns the
    /// surfaced messages tagged with the ids of all rules that admit them.
    /// A mailbox that cannot be read contributes nothing.
    pub async fn run(&self, rules: &[SubscriberRule]) -> Vec<CanonicalMessage> {
        let mailboxes = unique_mailboxes(rules);
        if mailboxes.is_empty() {
            info!("No system emails found");
            return Vec::new();
        }
        info!("Reading {} mailboxes for {} rules", mailboxes.len(), rules.len());

        let sessions = mailboxes
            .iter()
            .map(|mailbox| self.run_session(mailbox, rules_for_mailbox(rules, mailbox)));
        let mut messages: Vec<CanonicalMessage> = join_all(sessions).await.into_iter().flatten().collect();

        tag_matching_rules(&mut messages, rules);
        info!("Surfaced {} messages", messages.len());
        messages
    }
}
