//! Scripted relays and signed fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use nostr_sdk::nips::nip04;
use nostr_sdk::prelude::*;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::nostr::transport::{Capabilities, RelayStream, RelayTransport, StreamItem};

pub(crate) fn relay(n: u8) -> RelayUrl {
    RelayUrl::parse(&format!("wss://relay{n}.example.com")).unwrap()
}

pub(crate) fn event_by(keys: &Keys, kind: u16, content: &str, tags: Vec<Vec<&str>>, created_at: u64) -> Event {
    let tags = tags.into_iter().map(|t| Tag::parse(t).unwrap());
    EventBuilder::new(Kind::from(kind), content)
        .tags(tags)
        .custom_created_at(Timestamp::from(created_at))
        .sign_with_keys(keys)
        .unwrap()
}

pub(crate) fn note_by(keys: &Keys, content: &str, created_at: u64) -> Event {
    event_by(keys, 1, content, vec![], created_at)
}

pub(crate) fn signed_note(content: &str, created_at: u64) -> Event {
    note_by(&Keys::generate(), content, created_at)
}

pub(crate) fn profile_event(keys: &Keys, json: &str, created_at: u64) -> Event {
    event_by(keys, 0, json, vec![], created_at)
}

pub(crate) fn contact_list(keys: &Keys, follows: &[PublicKey], created_at: u64) -> Event {
    let hexes: Vec<String> = follows.iter().map(|pk| pk.to_hex()).collect();
    let tags = hexes.iter().map(|h| vec!["p", h.as_str()]).collect();
    event_by(keys, 3, "", tags, created_at)
}

pub(crate) fn direct_message(sender: &Keys, recipient: &PublicKey, plaintext: &str, created_at: u64) -> Event {
    let encrypted = nip04::encrypt(sender.secret_key(), recipient, plaintext).unwrap();
    let recipient_hex = recipient.to_hex();
    event_by(sender, 4, &encrypted, vec![vec!["p", &recipient_hex]], created_at)
}

/// Same event with its content changed after signing, so `verify()` fails.
pub(crate) fn tampered(event: &Event) -> Event {
    let mut value = serde_json::to_value(event).unwrap();
    value["content"] = serde_json::Value::String("tampered".to_string());
    serde_json::from_value(value).unwrap()
}

fn matches(filter: &Filter, event: &Event) -> bool {
    if let Some(ids) = &filter.ids {
        if !ids.contains(&event.id) {
            return false;
        }
    }
    if let Some(authors) = &filter.authors {
        if !authors.contains(&event.pubkey) {
            return false;
        }
    }
    if let Some(kinds) = &filter.kinds {
        if !kinds.contains(&event.kind) {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if event.created_at < since {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if event.created_at > until {
            return false;
        }
    }
    filter.generic_tags.iter().all(|(letter, values)| {
        let name = letter.as_char().to_string();
        event.tags.iter().any(|tag| match tag.as_slice() {
            [tag_name, value, ..] => *tag_name == name && values.contains(value),
            _ => false,
        })
    })
}

#[derive(Debug, Clone)]
enum Behavior {
    Answer,
    Silent,
    Fail(String),
}

/// One scripted relay.
#[derive(Debug, Clone)]
pub(crate) struct MockRelay {
    behavior: Behavior,
    events: Vec<Event>,
    end_of_stream: bool,
    after_end: Vec<Event>,
    publish_delay: Duration,
}

impl MockRelay {
    /// Serves `events` (filtered), then end-of-stream. Accepts publishes.
    pub(crate) fn answering(events: Vec<Event>) -> Self {
        Self {
            behavior: Behavior::Answer,
            events,
            end_of_stream: true,
            after_end: Vec::new(),
            publish_delay: Duration::ZERO,
        }
    }

    /// Never answers anything.
    pub(crate) fn silent() -> Self {
        Self {
            behavior: Behavior::Silent,
            ..Self::answering(Vec::new())
        }
    }

    /// Fails every request with `reason`.
    pub(crate) fn failing(reason: &str) -> Self {
        Self {
            behavior: Behavior::Fail(reason.to_string()),
            ..Self::answering(Vec::new())
        }
    }

    pub(crate) fn without_end_of_stream(mut self) -> Self {
        self.end_of_stream = false;
        self
    }

    pub(crate) fn with_events_after_end(mut self, events: Vec<Event>) -> Self {
        self.after_end = events;
        self
    }

    pub(crate) fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }

    fn matching(&self, filter: &Filter) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.iter().filter(|e| matches(filter, e)).cloned().collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }
        events
    }
}

pub(crate) struct MockTransport {
    capabilities: Capabilities,
    relays: HashMap<RelayUrl, MockRelay>,
    published: Mutex<Vec<(RelayUrl, Event)>>,
    shut_down: AtomicBool,
}

impl MockTransport {
    fn with_capabilities(batch: bool, stream: bool) -> Self {
        Self {
            capabilities: Capabilities { batch, stream },
            relays: HashMap::new(),
            published: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn batch() -> Self {
        Self::with_capabilities(true, false)
    }

    pub(crate) fn stream() -> Self {
        Self::with_capabilities(false, true)
    }

    pub(crate) fn incapable() -> Self {
        Self::with_capabilities(false, false)
    }

    pub(crate) fn with_relay(mut self, url: RelayUrl, relay: MockRelay) -> Self {
        self.relays.insert(url, relay);
        self
    }

    pub(crate) fn published(&self) -> Vec<(RelayUrl, Event)> {
        self.published.lock().clone()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn relay(&self, url: &RelayUrl) -> Result<&MockRelay, TransportError> {
        self.relays
            .get(url)
            .ok_or_else(|| TransportError::Unreachable(format!("{url}: unknown relay")))
    }
}

impl RelayTransport for MockTransport {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Box::pin(async {})
    }

    fn publish<'a>(&'a self, relay: &'a RelayUrl, event: &'a Event) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let mock = self.relay(relay)?;
            match &mock.behavior {
                Behavior::Answer => {
                    tokio::time::sleep(mock.publish_delay).await;
                    self.published.lock().push((relay.clone(), event.clone()));
                    Ok(())
                }
                Behavior::Silent => futures::future::pending().await,
                Behavior::Fail(reason) => Err(TransportError::Rejected(reason.clone())),
            }
        })
    }

    fn fetch<'a>(
        &'a self,
        relay: &'a RelayUrl,
        filter: Filter,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<Event>, TransportError>> {
        Box::pin(async move {
            let mock = self.relay(relay)?;
            match &mock.behavior {
                Behavior::Answer if mock.end_of_stream => Ok(mock.matching(&filter)),
                Behavior::Answer | Behavior::Silent => futures::future::pending().await,
                Behavior::Fail(reason) => Err(TransportError::Unreachable(reason.clone())),
            }
        })
    }

    fn open_stream<'a>(&'a self, relay: &'a RelayUrl, filter: Filter) -> BoxFuture<'a, Result<RelayStream, TransportError>> {
        Box::pin(async move {
            let mock = self.relay(relay)?.clone();
            if let Behavior::Fail(reason) = &mock.behavior {
                return Err(TransportError::Unreachable(reason.clone()));
            }
            let (tx, rx) = mpsc::channel(256);
            tokio::spawn(async move {
                if let Behavior::Answer = mock.behavior {
                    let mut items: Vec<StreamItem> = mock
                        .matching(&filter)
                        .into_iter()
                        .map(|e| StreamItem::Event(Box::new(e)))
                        .collect();
                    if mock.end_of_stream {
                        items.push(StreamItem::EndOfStream);
                    }
                    items.extend(mock.after_end.iter().cloned().map(|e| StreamItem::Event(Box::new(e))));
                    for item in items {
                        if tx.send(item).await.is_err() {
                            return;
                        }
                    }
                }
                tx.closed().await;
            });
            Ok(RelayStream::new(rx))
        })
    }
}
