//! Build, sign, broadcast and optimistically merge user actions.

use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::prelude::*;
use parking_lot::RwLock;

use super::auth::SessionStore;
use super::pool::{ConnectionPool, PublishReport};
use crate::constants::{kinds, DEFAULT_REACTION};
use crate::error::{CoreError, TransportError};
use crate::store::FeedStore;

/// A signed event and what each relay said about it.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub event: Event,
    pub report: PublishReport,
}

impl PublishReceipt {
    pub fn accepted(&self) -> bool {
        self.report.any_accepted()
    }
}

pub struct PublishPipeline {
    session: Arc<SessionStore>,
    pool: Arc<ConnectionPool>,
    feed: Arc<RwLock<FeedStore>>,
    timeout: Duration,
}

impl PublishPipeline {
    pub fn new(
        session: Arc<SessionStore>,
        pool: Arc<ConnectionPool>,
        feed: Arc<RwLock<FeedStore>>,
        timeout: Duration,
    ) -> Self {
        Self {
            session,
            pool,
            feed,
            timeout,
        }
    }

    pub async fn publish_note(&self, content: &str) -> Result<PublishReceipt, CoreError> {
        self.ensure_authenticated()?;
        if content.trim().is_empty() {
            return Err(CoreError::validation("Note content is empty"));
        }
        self.publish(EventBuilder::text_note(content)).await
    }

    /// Kind-7 reaction; `symbol` defaults to "+" when blank.
    pub async fn publish_reaction(
        &self,
        target: EventId,
        target_author: Option<PublicKey>,
        symbol: &str,
    ) -> Result<PublishReceipt, CoreError> {
        self.ensure_authenticated()?;
        let symbol = match symbol.trim() {
            "" => DEFAULT_REACTION,
            s => s,
        };
        let mut builder = EventBuilder::new(Kind::from(kinds::REACTION), symbol).tag(Tag::event(target));
        if let Some(author) = target_author {
            builder = builder.tag(Tag::public_key(author));
        }
        self.publish(builder).await
    }

    /// Kind-6 repost with empty content.
    pub async fn publish_repost(
        &self,
        target: EventId,
        target_author: Option<PublicKey>,
    ) -> Result<PublishReceipt, CoreError> {
        self.ensure_authenticated()?;
        let mut builder = EventBuilder::new(Kind::from(kinds::REPOST), "").tag(Tag::event(target));
        if let Some(author) = target_author {
            builder = builder.tag(Tag::public_key(author));
        }
        self.publish(builder).await
    }

    /// Kind-4 direct message, NIP-04 encrypted for `recipient`.
    pub async fn send_direct_message(
        &self,
        recipient: PublicKey,
        plaintext: &str,
    ) -> Result<PublishReceipt, CoreError> {
        self.ensure_authenticated()?;
        if plaintext.trim().is_empty() {
            return Err(CoreError::validation("Message is empty"));
        }
        let encrypted = self.session.encrypt_for(&recipient, plaintext)?;
        let builder = EventBuilder::new(Kind::from(kinds::DIRECT_MESSAGE), encrypted)
            .tag(Tag::public_key(recipient));
        self.publish(builder).await
    }

    /// Republish my contact list with `target` added.
    ///
    /// `lookup` is how the latest contact-list read went (see
    /// `Settled::conclusive`). Without a list in the feed store, only a
    /// conclusive read may start a fresh one; otherwise the error is
    /// returned and nothing is published.
    pub async fn follow(
        &self,
        target: PublicKey,
        lookup: Result<(), CoreError>,
    ) -> Result<PublishReceipt, CoreError> {
        let me = self.ensure_authenticated()?;
        let current = self.current_contact_list(&me, lookup)?;
        let mut tags = current.tags.clone();
        if tags.iter().any(|tag| is_p_tag_for(tag, &target)) {
            return Err(CoreError::validation("Already following this user"));
        }
        tags.push(Tag::public_key(target));
        self.publish(current.rebuild(tags)).await
    }

    /// Republish my contact list with `target` removed. `lookup` as for
    /// `follow`.
    pub async fn unfollow(
        &self,
        target: PublicKey,
        lookup: Result<(), CoreError>,
    ) -> Result<PublishReceipt, CoreError> {
        let me = self.ensure_authenticated()?;
        let current = self.current_contact_list(&me, lookup)?;
        let tags: Vec<Tag> = current
            .tags
            .iter()
            .filter(|tag| !is_p_tag_for(tag, &target))
            .cloned()
            .collect();
        if tags.len() == current.tags.len() {
            return Err(CoreError::validation("Not following this user"));
        }
        self.publish(current.rebuild(tags)).await
    }

    fn ensure_authenticated(&self) -> Result<PublicKey, CoreError> {
        if !self.session.can_sign() {
            return Err(CoreError::NotAuthenticated);
        }
        self.session.public_key().ok_or(CoreError::NotAuthenticated)
    }

    fn current_contact_list(
        &self,
        me: &PublicKey,
        lookup: Result<(), CoreError>,
    ) -> Result<ContactListDraft, CoreError> {
        let feed = self.feed.read();
        if let Some(event) = feed.latest_contact_list(me) {
            return Ok(ContactListDraft {
                tags: event.tags.iter().cloned().collect(),
                content: event.content.clone(),
                previous: Some(event.created_at),
            });
        }
        if let Err(e) = lookup {
            tracing::warn!("Refusing to replace an unread contact list: {}", e);
            return Err(e);
        }
        Ok(ContactListDraft {
            tags: Vec::new(),
            content: String::new(),
            previous: None,
        })
    }

    /// Sign, merge optimistically, then broadcast. If no relay accepts, the
    /// optimistic entry is retracted and the failure returned.
    async fn publish(&self, builder: EventBuilder) -> Result<PublishReceipt, CoreError> {
        let author = self.ensure_authenticated()?;
        let event = self.session.sign(builder.build(author))?;
        let inserted = self.feed.write().append_optimistic(event.clone());
        tracing::info!("Publishing kind {} event {}", event.kind.as_u16(), event.id.to_hex());

        let report = self.pool.publish(&event, self.pool.relays(), self.timeout).await;
        if report.any_accepted() {
            let failures = report.failures().len();
            if failures > 0 {
                tracing::warn!("{} of {} relay(s) did not accept {}", failures, report.outcomes.len(), event.id.to_hex());
            }
            return Ok(PublishReceipt { event, report });
        }

        if inserted {
            self.feed.write().retract_optimistic(&event.id);
        }
        let reasons: Vec<String> = report
            .failures()
            .iter()
            .map(|(relay, e)| format!("{relay}: {e}"))
            .collect();
        tracing::warn!("No relay accepted {}", event.id.to_hex());
        let summary = if reasons.is_empty() {
            "no relays configured".to_string()
        } else {
            reasons.join("; ")
        };
        Err(TransportError::Rejected(summary).into())
    }
}

struct ContactListDraft {
    tags: Vec<Tag>,
    content: String,
    previous: Option<Timestamp>,
}

impl ContactListDraft {
    /// The replacement must sort after the list it replaces, even when both
    /// are created within the same second.
    fn rebuild(&self, tags: Vec<Tag>) -> EventBuilder {
        let now = Timestamp::now();
        let created_at = match self.previous {
            Some(previous) if previous >= now => Timestamp::from(previous.as_u64() + 1),
            _ => now,
        };
        EventBuilder::new(Kind::from(kinds::CONTACT_LIST), self.content.clone())
            .tags(tags)
            .custom_created_at(created_at)
    }
}

fn is_p_tag_for(tag: &Tag, pubkey: &PublicKey) -> bool {
    match tag.as_slice() {
        [name, value, ..] => name == "p" && *value == pubkey.to_hex(),
        _ => false,
    }
}
