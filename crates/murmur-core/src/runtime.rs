//! Presentation-facing facade.
//!
//! Every getter resolves to a `ViewSnapshot`: relay trouble shows up as
//! `partial` plus an `EmptyReason`, never as an error. Errors are reserved
//! for bad user input and for publishing.

use std::collections::HashSet;
use std::sync::Arc;

use nostr_sdk::prelude::*;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::CoreConfig;
use crate::constants::{kinds, PROFILE_NOTES_LIMIT, SUGGESTED_AUTHORS, SUGGESTED_SHOWN, TIMELINE_LIMIT, TRENDING_TOP_N};
use crate::error::CoreError;
use crate::models::{
    Contact, DirectMessage, EmptyReason, Note, Notification, Profile, SearchResults, TrendingView, ViewSnapshot,
};
use crate::nostr::auth::{parse_public_key, SessionStore};
use crate::nostr::pool::{Completion, ConnectionPool, SubscriptionHandle};
use crate::nostr::publish::{PublishPipeline, PublishReceipt};
use crate::nostr::query::{QueryEngine, Settled};
use crate::nostr::transport::{RelayTransport, SdkRelayTransport};
use crate::search::{search_notes, search_profiles};
use crate::storage::KeyValueStore;
use crate::store::{self, FeedStore, FollowSet, ProfileCache, Tab};

/// Accepts hex or NIP-19 `note1...`.
pub fn parse_event_id(input: &str) -> Result<EventId, CoreError> {
    let input = input.trim();
    EventId::from_hex(input)
        .or_else(|_| EventId::from_bech32(input))
        .map_err(|e| CoreError::validation(format!("Invalid event id: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub public_key: Option<String>,
    pub npub: Option<String>,
    pub can_sign: bool,
    /// A password-protected key is stored but not unlocked yet
    pub locked: bool,
}

impl SessionInfo {
    pub fn from_store(session: &SessionStore) -> Self {
        let public_key = session.public_key();
        Self {
            public_key: public_key.map(|pk| pk.to_hex()),
            npub: public_key.and_then(|pk| pk.to_bech32().ok()),
            can_sign: session.can_sign(),
            locked: session.is_locked(),
        }
    }
}

/// Classify a settled query for the view built from it.
fn snapshot<T, U>(settled: &Settled<U>, relays_asked: usize, data: T, is_empty: bool) -> ViewSnapshot<T> {
    let partial = !settled.complete || !settled.failed_relays.is_empty();
    let reason = if !is_empty {
        None
    } else if settled.all_failed(relays_asked) {
        let reasons: Vec<String> = settled
            .failed_relays
            .iter()
            .map(|(relay, reason)| format!("{relay}: {reason}"))
            .collect();
        Some(EmptyReason::Unavailable(reasons.join("; ")))
    } else if !settled.complete {
        Some(EmptyReason::TimedOut)
    } else {
        Some(EmptyReason::NoResults)
    };
    ViewSnapshot {
        data,
        loading: false,
        partial,
        reason,
    }
}

/// Empty "following" view, classified by how the contact-list read went.
/// Only a conclusive read means I follow nobody.
fn not_following<T>(follows: &Settled<FollowSet>, relays_asked: usize, data: T) -> ViewSnapshot<T> {
    let mut view = snapshot(follows, relays_asked, data, true);
    if view.reason == Some(EmptyReason::NoResults) {
        view.reason = Some(EmptyReason::NotFollowingAnyone);
    }
    view
}

/// An open live view. Dropping it closes the subscription; no update is
/// delivered afterwards.
pub struct LiveView {
    handle: Option<SubscriptionHandle>,
}

impl LiveView {
    pub fn close(self) {}

    pub fn is_live(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

pub struct MurmurCore {
    session: Arc<SessionStore>,
    query: QueryEngine,
    publisher: PublishPipeline,
    feed: Arc<RwLock<FeedStore>>,
    profiles: Arc<RwLock<ProfileCache>>,
}

impl MurmurCore {
    /// Build over an existing transport and resume any persisted session.
    pub fn new(
        config: &CoreConfig,
        storage: Arc<dyn KeyValueStore>,
        transport: Arc<dyn RelayTransport>,
    ) -> Result<Self, CoreError> {
        let relays = config.relay_urls()?;
        let pool = Arc::new(ConnectionPool::new(transport, relays)?);
        let session = Arc::new(SessionStore::new(storage));
        session.resume();

        let feed = Arc::new(RwLock::new(FeedStore::new()));
        let publisher = PublishPipeline::new(
            session.clone(),
            pool.clone(),
            feed.clone(),
            config.timeouts.publish(),
        );
        let query = QueryEngine::new(pool, config.timeouts.clone(), config.relay_scope);

        Ok(Self {
            session,
            query,
            publisher,
            feed,
            profiles: Arc::new(RwLock::new(ProfileCache::new())),
        })
    }

    /// Connect to the configured relays over websockets.
    pub async fn connect(config: &CoreConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self, CoreError> {
        let relays = config.relay_urls()?;
        let mut transport = SdkRelayTransport::connect(&relays, config.timeouts.connect()).await?;
        if config.stream_only {
            transport = transport.streaming_only();
        }
        Self::new(config, storage, Arc::new(transport))
    }

    /// Disconnect from every relay.
    pub async fn shutdown(&self) {
        self.query.pool().shutdown().await;
    }

    // ===== Session =====

    pub fn session_store(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn session(&self) -> SessionInfo {
        SessionInfo::from_store(&self.session)
    }

    pub fn login(&self, private_key: Option<&str>) -> Result<PublicKey, CoreError> {
        self.login_with_password(private_key, None)
    }

    /// Log in and keep the key encrypted at rest under `password`.
    pub fn login_with_password(&self, private_key: Option<&str>, password: Option<&str>) -> Result<PublicKey, CoreError> {
        let previous = self.session.public_key();
        let public_key = self.session.login_with_password(private_key, password)?;
        if previous != Some(public_key) {
            self.discard_views();
        }
        Ok(public_key)
    }

    /// Regain signing for a resumed password-protected session.
    pub fn unlock(&self, password: &str) -> Result<PublicKey, CoreError> {
        self.session.unlock(password)
    }

    pub fn login_public_key(&self, input: &str) -> Result<PublicKey, CoreError> {
        let previous = self.session.public_key();
        let public_key = self.session.login_public_key(input)?;
        if previous != Some(public_key) {
            self.discard_views();
        }
        Ok(public_key)
    }

    pub fn logout(&self) -> Result<(), CoreError> {
        self.session.logout()?;
        self.discard_views();
        Ok(())
    }

    fn discard_views(&self) {
        self.feed.write().clear();
    }

    // ===== Views =====

    pub async fn get_timeline(&self, tab: Tab) -> ViewSnapshot<Vec<Note>> {
        let relays_asked = self.query.relays().len();
        match tab {
            Tab::ForYou => {
                let settled = self.query.recent_notes().await;
                let notes = self.merge_timeline(&settled.value, None, TIMELINE_LIMIT);
                let is_empty = notes.is_empty();
                snapshot(&settled, relays_asked, notes, is_empty)
            }
            Tab::Following => {
                let Some(me) = self.session.public_key() else {
                    return ViewSnapshot::empty(Vec::new(), EmptyReason::NotAuthenticated);
                };
                let follows = self.follow_set(me).await;
                let FollowSet::Authors(authors) = &follows.value else {
                    return not_following(&follows, relays_asked, Vec::new());
                };
                let settled = self.query.notes_by_authors(authors.clone()).await;
                let notes = self.merge_timeline(&settled.value, Some(authors.as_slice()), TIMELINE_LIMIT);
                let is_empty = notes.is_empty();
                snapshot(&settled, relays_asked, notes, is_empty)
            }
        }
    }

    pub async fn get_contacts(&self) -> ViewSnapshot<Vec<Contact>> {
        let Some(me) = self.session.public_key() else {
            return ViewSnapshot::empty(Vec::new(), EmptyReason::NotAuthenticated);
        };
        let settled = self.query.direct_messages(me).await;
        self.feed.write().merge_relay_events(settled.value.iter().cloned());

        let keys = self.session.keys().ok();
        let messages: Vec<Event> = self
            .feed
            .read()
            .events_of_kind(kinds::DIRECT_MESSAGE)
            .cloned()
            .collect();
        let contacts = store::contacts_from_direct_messages(&messages, &me, keys.as_ref());
        let is_empty = contacts.is_empty();
        snapshot(&settled, self.query.relays().len(), contacts, is_empty)
    }

    pub async fn get_conversation(&self, other: &str) -> Result<ViewSnapshot<Vec<DirectMessage>>, CoreError> {
        let other = parse_public_key(other)?;
        let Some(me) = self.session.public_key() else {
            return Ok(ViewSnapshot::empty(Vec::new(), EmptyReason::NotAuthenticated));
        };
        let settled = self.query.conversation(me, other).await;
        self.feed.write().merge_relay_events(settled.value.iter().cloned());

        let keys = self.session.keys().ok();
        let messages: Vec<Event> = self
            .feed
            .read()
            .events_of_kind(kinds::DIRECT_MESSAGE)
            .cloned()
            .collect();
        let thread = store::conversation(&messages, &me, &other, keys.as_ref());
        let is_empty = thread.is_empty();
        Ok(snapshot(&settled, self.query.relays().len(), thread, is_empty))
    }

    pub async fn get_profile(&self, pubkey: &str) -> Result<ViewSnapshot<Option<Profile>>, CoreError> {
        let pubkey = parse_public_key(pubkey)?;
        let settled = self.query.profiles(vec![pubkey]).await;
        self.profiles.write().ingest(&settled.value);
        let profile = self.profiles.read().get(&pubkey).cloned();
        let is_empty = profile.is_none();
        Ok(snapshot(&settled, self.query.relays().len(), profile, is_empty))
    }

    pub async fn get_profile_notes(&self, pubkey: &str) -> Result<ViewSnapshot<Vec<Note>>, CoreError> {
        let pubkey = parse_public_key(pubkey)?;
        let settled = self.query.author_notes(pubkey).await;
        let mut notes = self.merge_timeline(&settled.value, Some(std::slice::from_ref(&pubkey)), usize::MAX);
        notes.retain(|note| !note.is_repost());
        notes.truncate(PROFILE_NOTES_LIMIT);
        let is_empty = notes.is_empty();
        Ok(snapshot(&settled, self.query.relays().len(), notes, is_empty))
    }

    /// Trends over the recent-note window plus "who to follow" drawn from
    /// the window's first authors.
    pub async fn get_trending(&self) -> ViewSnapshot<TrendingView> {
        let window = self.query.trending_window().await;
        let trends = store::trending(&window.value, TRENDING_TOP_N);
        let authors = store::active_authors(&window.value, SUGGESTED_AUTHORS);

        let profiles = self.query.profiles(authors.clone()).await;
        self.profiles.write().ingest(&profiles.value);
        let suggested_users = self.profiles.read().suggestions(&authors, SUGGESTED_SHOWN);

        let view = TrendingView {
            trends,
            suggested_users,
        };
        let is_empty = view.trends.is_empty() && view.suggested_users.is_empty();
        let mut snapshot = snapshot(&window, self.query.relays().len(), view, is_empty);
        snapshot.partial |= !profiles.complete || !profiles.failed_relays.is_empty();
        snapshot
    }

    /// Notes from the recent window and profiles of their authors matching
    /// `query`.
    pub async fn search(&self, query: &str) -> Result<ViewSnapshot<SearchResults>, CoreError> {
        if query.trim().is_empty() {
            return Err(CoreError::validation("Search query is empty"));
        }
        let window = self.query.search_window().await;
        let notes: Vec<Note> = window
            .value
            .iter()
            .filter_map(|event| Note::from_event(event, true))
            .collect();

        let authors = store::active_authors(&window.value, SUGGESTED_AUTHORS);
        let profiles = self.query.profiles(authors.clone()).await;
        self.profiles.write().ingest(&profiles.value);
        let candidates: Vec<Profile> = {
            let cache = self.profiles.read();
            authors.iter().filter_map(|pk| cache.get(pk)).cloned().collect()
        };

        let results = SearchResults {
            notes: search_notes(notes, query),
            profiles: search_profiles(&candidates, query),
        };
        let is_empty = results.is_empty();
        let mut snapshot = snapshot(&window, self.query.relays().len(), results, is_empty);
        snapshot.partial |= !profiles.complete;
        Ok(snapshot)
    }

    pub async fn get_notifications(&self) -> ViewSnapshot<Vec<Notification>> {
        let Some(me) = self.session.public_key() else {
            return ViewSnapshot::empty(Vec::new(), EmptyReason::NotAuthenticated);
        };
        let settled = self.query.notifications(me).await;
        let items = store::notifications(&settled.value, &me);
        let is_empty = items.is_empty();
        snapshot(&settled, self.query.relays().len(), items, is_empty)
    }

    /// Live "for you" or "following" timeline. `on_update` receives a fresh
    /// snapshot per new event (`loading: true`) and a final one when the
    /// subscription completes.
    pub async fn open_view<F>(&self, tab: Tab, on_update: F) -> LiveView
    where
        F: Fn(ViewSnapshot<Vec<Note>>) + Send + Sync + 'static,
    {
        let relays_asked = self.query.relays().len();
        let (filter, authors) = match tab {
            Tab::ForYou => (QueryEngine::recent_notes_filter(TIMELINE_LIMIT), None),
            Tab::Following => {
                let Some(me) = self.session.public_key() else {
                    on_update(ViewSnapshot::empty(Vec::new(), EmptyReason::NotAuthenticated));
                    return LiveView { handle: None };
                };
                let follows = self.follow_set(me).await;
                match &follows.value {
                    FollowSet::Authors(authors) => (
                        QueryEngine::following_filter(authors.clone(), TIMELINE_LIMIT),
                        Some(authors.clone()),
                    ),
                    FollowSet::NotFollowingAnyone => {
                        on_update(not_following(&follows, relays_asked, Vec::new()));
                        return LiveView { handle: None };
                    }
                }
            }
        };

        let on_update = Arc::new(on_update);
        let authors = Arc::new(authors);
        let seen: Arc<parking_lot::Mutex<HashSet<EventId>>> = Arc::default();

        let (feed, update, scope, delivered) = (self.feed.clone(), on_update.clone(), authors.clone(), seen.clone());
        let on_event = move |event: Event| {
            let ids = {
                let mut delivered = delivered.lock();
                delivered.insert(event.id);
                delivered.clone()
            };
            let notes = {
                let mut feed = feed.write();
                feed.merge_relay_events([event]);
                live_timeline(&feed, &ids, scope.as_deref())
            };
            update(ViewSnapshot {
                data: notes,
                loading: true,
                partial: false,
                reason: None,
            });
        };

        let feed = self.feed.clone();
        let on_complete = move |completion: Completion| {
            let ids = seen.lock().clone();
            let notes = live_timeline(&feed.read(), &ids, authors.as_deref());
            let settled = Settled {
                value: (),
                complete: completion.is_complete(),
                failed_relays: completion.failed_relays,
            };
            let is_empty = notes.is_empty();
            on_update(snapshot(&settled, relays_asked, notes, is_empty));
        };

        let handle = self
            .query
            .watch(filter, self.query.timeouts().feed(), on_event, on_complete);
        LiveView { handle: Some(handle) }
    }

    // ===== Publishing =====

    pub async fn publish_note(&self, content: &str) -> Result<PublishReceipt, CoreError> {
        self.publisher.publish_note(content).await
    }

    pub async fn publish_reaction(&self, event_id: &str, symbol: &str) -> Result<PublishReceipt, CoreError> {
        let target = parse_event_id(event_id)?;
        let author = self.author_of(target).await;
        self.publisher.publish_reaction(target, author, symbol).await
    }

    pub async fn publish_repost(&self, event_id: &str) -> Result<PublishReceipt, CoreError> {
        let target = parse_event_id(event_id)?;
        let author = self.author_of(target).await;
        self.publisher.publish_repost(target, author).await
    }

    pub async fn send_direct_message(&self, recipient: &str, content: &str) -> Result<PublishReceipt, CoreError> {
        let recipient = parse_public_key(recipient)?;
        self.publisher.send_direct_message(recipient, content).await
    }

    pub async fn follow(&self, pubkey: &str) -> Result<PublishReceipt, CoreError> {
        let target = parse_public_key(pubkey)?;
        let lookup = self.contact_list_lookup().await?;
        self.publisher.follow(target, lookup).await
    }

    pub async fn unfollow(&self, pubkey: &str) -> Result<PublishReceipt, CoreError> {
        let target = parse_public_key(pubkey)?;
        let lookup = self.contact_list_lookup().await?;
        self.publisher.unfollow(target, lookup).await
    }

    // ===== Helpers =====

    /// Merge a query's events and render them beside my unconfirmed notes,
    /// newest first, at most `limit`.
    fn merge_timeline(&self, events: &[Event], authors: Option<&[PublicKey]>, limit: usize) -> Vec<Note> {
        let ids: HashSet<EventId> = events.iter().map(|event| event.id).collect();
        let mut feed = self.feed.write();
        feed.merge_relay_events(events.iter().cloned());
        let mut notes = store::timeline(feed.notes_among(&ids), authors);
        notes.truncate(limit);
        notes
    }

    /// Fetch my latest contact list into the feed store and read it back.
    async fn follow_set(&self, me: PublicKey) -> Settled<FollowSet> {
        let settled = self.query.contact_list(me).await;
        let mut feed = self.feed.write();
        feed.merge_relay_events(settled.value.iter().cloned());
        let follows = FollowSet::from_latest(feed.latest_contact_list(&me));
        settled.map(|_| follows)
    }

    /// Refresh my contact list ahead of rewriting it. The inner result says
    /// whether the read was conclusive.
    async fn contact_list_lookup(&self) -> Result<Result<(), CoreError>, CoreError> {
        let me = self.session.public_key().ok_or(CoreError::NotAuthenticated)?;
        let follows = self.follow_set(me).await;
        Ok(follows.conclusive(self.query.relays().len(), self.query.timeouts().profile()))
    }

    async fn author_of(&self, id: EventId) -> Option<PublicKey> {
        let known = self.feed.read().get(&id).map(|event| event.pubkey);
        if known.is_some() {
            return known;
        }
        let settled = self.query.event_by_id(id).await;
        settled.value.map(|event| event.pubkey)
    }
}

fn live_timeline(feed: &FeedStore, ids: &HashSet<EventId>, authors: Option<&[PublicKey]>) -> Vec<Note> {
    let mut notes = store::timeline(feed.notes_among(ids), authors);
    notes.truncate(TIMELINE_LIMIT);
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::storage::MemoryKeyValueStore;
    use crate::testing::{
        contact_list, direct_message, event_by, note_by, profile_event, relay, signed_note, MockRelay, MockTransport,
    };
    use std::time::Duration;

    fn config(relays: usize) -> CoreConfig {
        CoreConfig {
            relays: (1..=relays as u8).map(|n| relay(n).to_string()).collect(),
            timeouts: Timeouts {
                feed: 1,
                profile: 1,
                search: 1,
                publish: 1,
                connect: 1,
            },
            ..CoreConfig::new(std::env::temp_dir())
        }
    }

    fn core(transport: MockTransport, relays: usize) -> MurmurCore {
        watched(Arc::new(transport), relays)
    }

    /// Core over a transport the test keeps a handle on.
    fn watched(transport: Arc<MockTransport>, relays: usize) -> MurmurCore {
        MurmurCore::new(&config(relays), Arc::new(MemoryKeyValueStore::new()), transport).unwrap()
    }

    #[test]
    fn test_parse_event_id_accepts_hex_and_bech32() {
        let id = signed_note("x", 1).id;
        assert_eq!(parse_event_id(&id.to_hex()).unwrap(), id);
        assert_eq!(parse_event_id(&id.to_bech32().unwrap()).unwrap(), id);
        assert!(matches!(parse_event_id("nope"), Err(CoreError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_for_you_timeline_is_sorted_and_deduplicated() {
        let older = signed_note("older", 100);
        let newer = signed_note("newer", 200);
        let transport = MockTransport::batch()
            .with_relay(relay(1), MockRelay::answering(vec![older.clone(), newer.clone()]))
            .with_relay(relay(2), MockRelay::answering(vec![newer.clone()]));
        let core = core(transport, 2);

        let view = core.get_timeline(Tab::ForYou).await;
        let times: Vec<u64> = view.data.iter().map(|n| n.created_at).collect();
        assert_eq!(times, vec![200, 100]);
        assert!(!view.partial);
        assert_eq!(view.reason, None);
    }

    #[tokio::test]
    async fn test_empty_and_timed_out_views_report_distinct_reasons() {
        let answered = core(MockTransport::batch().with_relay(relay(1), MockRelay::answering(vec![])), 1);
        let view = answered.get_timeline(Tab::ForYou).await;
        assert_eq!(view.reason, Some(EmptyReason::NoResults));

        let stalled = core(MockTransport::batch().with_relay(relay(1), MockRelay::silent()), 1);
        let view = stalled.get_timeline(Tab::ForYou).await;
        assert!(view.partial);
        assert_eq!(view.reason, Some(EmptyReason::TimedOut));

        let down = core(MockTransport::batch().with_relay(relay(1), MockRelay::failing("refused")), 1);
        let view = down.get_timeline(Tab::ForYou).await;
        assert!(matches!(view.reason, Some(EmptyReason::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_following_without_contact_list_is_distinct_state() {
        let transport = MockTransport::batch().with_relay(relay(1), MockRelay::answering(vec![signed_note("hi", 1)]));
        let core = core(transport, 1);

        let view = core.get_timeline(Tab::Following).await;
        assert_eq!(view.reason, Some(EmptyReason::NotAuthenticated));

        core.login(None).unwrap();
        let view = core.get_timeline(Tab::Following).await;
        assert!(view.data.is_empty());
        assert_eq!(view.reason, Some(EmptyReason::NotFollowingAnyone));
    }

    #[tokio::test]
    async fn test_following_filters_by_contact_list() {
        let me = Keys::generate();
        let friend = Keys::generate();
        let stranger = Keys::generate();
        let transport = MockTransport::batch().with_relay(
            relay(1),
            MockRelay::answering(vec![
                contact_list(&me, &[friend.public_key()], 50),
                note_by(&friend, "from a friend", 100),
                note_by(&stranger, "from a stranger", 200),
            ]),
        );
        let core = core(transport, 1);
        core.login(Some(&me.secret_key().to_secret_hex())).unwrap();

        let view = core.get_timeline(Tab::Following).await;
        assert_eq!(view.data.len(), 1);
        assert_eq!(view.data[0].content, "from a friend");
    }

    #[tokio::test]
    async fn test_published_note_shows_in_timeline() {
        let core = core(MockTransport::batch().with_relay(relay(1), MockRelay::answering(vec![])), 1);
        core.login(None).unwrap();

        let receipt = core.publish_note("my first note").await.unwrap();
        let view = core.get_timeline(Tab::ForYou).await;
        assert_eq!(view.data.len(), 1);
        assert_eq!(view.data[0].id, receipt.event.id.to_hex());
        assert_eq!(view.reason, None);
    }

    #[tokio::test]
    async fn test_contacts_require_login_and_aggregate() {
        let me = Keys::generate();
        let alice = Keys::generate();
        let transport = MockTransport::batch().with_relay(
            relay(1),
            MockRelay::answering(vec![
                direct_message(&alice, &me.public_key(), "old", 100),
                direct_message(&alice, &me.public_key(), "new", 200),
            ]),
        );
        let core = core(transport, 1);
        assert_eq!(core.get_contacts().await.reason, Some(EmptyReason::NotAuthenticated));

        core.login(Some(&me.secret_key().to_secret_hex())).unwrap();
        let view = core.get_contacts().await;
        assert_eq!(view.data.len(), 1);
        assert_eq!(view.data[0].last_message, "new");
    }

    #[tokio::test]
    async fn test_trending_and_suggestions() {
        let a = Keys::generate();
        let b = Keys::generate();
        let transport = MockTransport::batch().with_relay(
            relay(1),
            MockRelay::answering(vec![
                note_by(&a, "hello #nostr and #Bitcoin world #nostr", 200),
                note_by(&b, "plain", 100),
                profile_event(&a, r#"{"name":"alice"}"#, 1),
                profile_event(&b, "{broken", 1),
            ]),
        );
        let core = core(transport, 1);

        let view = core.get_trending().await;
        let tags: Vec<(&str, usize)> = view.data.trends.iter().map(|t| (t.tag.as_str(), t.count)).collect();
        assert_eq!(tags, vec![("nostr", 2), ("Bitcoin", 1)]);
        assert_eq!(view.data.suggested_users.len(), 1);
        assert_eq!(view.data.suggested_users[0].name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_profile_with_malformed_metadata_is_no_results() {
        let keys = Keys::generate();
        let transport = MockTransport::batch()
            .with_relay(relay(1), MockRelay::answering(vec![profile_event(&keys, "oops", 1)]));
        let core = core(transport, 1);

        let view = core.get_profile(&keys.public_key().to_hex()).await.unwrap();
        assert_eq!(view.data, None);
        assert_eq!(view.reason, Some(EmptyReason::NoResults));
        assert!(core.get_profile("garbage").await.is_err());
    }

    #[tokio::test]
    async fn test_search_matches_notes_and_profiles() {
        let a = Keys::generate();
        let transport = MockTransport::batch().with_relay(
            relay(1),
            MockRelay::answering(vec![
                note_by(&a, "Rust on nostr", 200),
                note_by(&a, "unrelated", 100),
                profile_event(&a, r#"{"name":"rustacean"}"#, 1),
            ]),
        );
        let core = core(transport, 1);

        let view = core.search("rust").await.unwrap();
        assert_eq!(view.data.notes.len(), 1);
        assert_eq!(view.data.profiles.len(), 1);
        assert!(core.search("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_logout_discards_views() {
        let core = core(MockTransport::batch().with_relay(relay(1), MockRelay::answering(vec![])), 1);
        core.login(None).unwrap();
        core.publish_note("soon gone").await.unwrap();

        core.logout().unwrap();
        assert_eq!(core.session().public_key, None);
        assert!(core.feed.read().is_empty());
        assert!(matches!(core.publish_note("nope").await, Err(CoreError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_live_view_stops_updating_after_drop() {
        let transport = MockTransport::stream().with_relay(
            relay(1),
            MockRelay::answering(vec![signed_note("first", 1)])
                .without_end_of_stream()
                .with_events_after_end(vec![signed_note("second", 2)]),
        );
        let core = core(transport, 1);
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = updates.clone();

        let view = core
            .open_view(Tab::ForYou, move |snapshot| sink.lock().push(snapshot.data.len()))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(view.is_live());
        drop(view);

        let seen = updates.lock().len();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(updates.lock().len(), seen);
        assert!(seen >= 1);
    }

    #[tokio::test]
    async fn test_live_view_completes_with_final_snapshot() {
        let transport = MockTransport::stream().with_relay(relay(1), MockRelay::answering(vec![signed_note("only", 1)]));
        let core = core(transport, 1);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let _view = core
            .open_view(Tab::ForYou, move |snapshot| {
                let _ = tx.send(snapshot);
            })
            .await;

        let first = rx.recv().await.unwrap();
        assert!(first.loading);
        let last = rx.recv().await.unwrap();
        assert!(!last.loading);
        assert_eq!(last.data.len(), 1);
        assert_eq!(last.reason, None);
    }

    #[tokio::test]
    async fn test_following_reports_relay_trouble_instead_of_no_follows() {
        let down = core(MockTransport::batch().with_relay(relay(1), MockRelay::failing("refused")), 1);
        down.login(None).unwrap();
        let view = down.get_timeline(Tab::Following).await;
        assert!(view.partial);
        assert!(matches!(view.reason, Some(EmptyReason::Unavailable(_))));

        let stalled = core(
            MockTransport::batch().with_relay(relay(1), MockRelay::answering(vec![]).without_end_of_stream()),
            1,
        );
        stalled.login(None).unwrap();
        let view = stalled.get_timeline(Tab::Following).await;
        assert!(view.partial);
        assert_eq!(view.reason, Some(EmptyReason::TimedOut));
    }

    #[tokio::test]
    async fn test_live_following_reports_relay_trouble() {
        let transport = MockTransport::stream().with_relay(relay(1), MockRelay::failing("refused"));
        let core = core(transport, 1);
        core.login(None).unwrap();
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = updates.clone();

        let view = core
            .open_view(Tab::Following, move |snapshot| sink.lock().push(snapshot))
            .await;
        assert!(!view.is_live());
        let updates = updates.lock();
        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0].reason, Some(EmptyReason::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_follow_after_stalled_contact_list_read_publishes_nothing() {
        let transport = Arc::new(
            MockTransport::batch().with_relay(relay(1), MockRelay::answering(vec![]).without_end_of_stream()),
        );
        let core = watched(transport.clone(), 1);
        core.login(None).unwrap();

        let result = core.follow(&Keys::generate().public_key().to_hex()).await;
        assert!(matches!(result, Err(CoreError::Timeout(_))));
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_unfollow_with_unreachable_relays_publishes_nothing() {
        let transport = Arc::new(MockTransport::batch().with_relay(relay(1), MockRelay::failing("refused")));
        let core = watched(transport.clone(), 1);
        core.login(None).unwrap();

        let result = core.unfollow(&Keys::generate().public_key().to_hex()).await;
        assert!(matches!(result, Err(CoreError::Transport(_))));
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_first_follow_starts_a_list_after_conclusive_read() {
        let transport = Arc::new(MockTransport::batch().with_relay(relay(1), MockRelay::answering(vec![])));
        let core = watched(transport.clone(), 1);
        core.login(None).unwrap();
        let target = Keys::generate().public_key();

        let receipt = core.follow(&target.to_hex()).await.unwrap();
        assert_eq!(receipt.event.kind.as_u16(), kinds::CONTACT_LIST);
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn test_for_you_excludes_notes_fetched_for_other_views() {
        let prolific = Keys::generate();
        let mut events: Vec<Event> = (0..20).map(|n| signed_note("recent", 1_000 + n)).collect();
        events.extend((0..20).map(|n| note_by(&prolific, "archived", 1 + n)));
        let core = core(MockTransport::batch().with_relay(relay(1), MockRelay::answering(events)), 1);

        assert_eq!(core.get_timeline(Tab::ForYou).await.data.len(), TIMELINE_LIMIT);
        let profile = core.get_profile_notes(&prolific.public_key().to_hex()).await.unwrap();
        assert_eq!(profile.data.len(), PROFILE_NOTES_LIMIT);

        let view = core.get_timeline(Tab::ForYou).await;
        assert_eq!(view.data.len(), TIMELINE_LIMIT);
        assert!(view.data.iter().all(|note| note.content == "recent"));
    }

    #[tokio::test]
    async fn test_live_following_includes_reposts() {
        let me = Keys::generate();
        let friend = Keys::generate();
        let reposted = signed_note("worth sharing", 10);
        let reposted_id = reposted.id.to_hex();
        let transport = MockTransport::stream().with_relay(
            relay(1),
            MockRelay::answering(vec![
                contact_list(&me, &[friend.public_key()], 5),
                note_by(&friend, "original", 20),
                event_by(&friend, kinds::REPOST, "", vec![vec!["e", &reposted_id]], 30),
            ]),
        );
        let core = core(transport, 1);
        core.login(Some(&me.secret_key().to_secret_hex())).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let _view = core
            .open_view(Tab::Following, move |snapshot| {
                let _ = tx.send(snapshot);
            })
            .await;

        let last = loop {
            let snapshot = rx.recv().await.unwrap();
            if !snapshot.loading {
                break snapshot;
            }
        };
        let shown: Vec<u16> = last.data.iter().map(|note| note.kind).collect();
        assert_eq!(shown, vec![kinds::REPOST, kinds::TEXT_NOTE]);
    }

    #[tokio::test]
    async fn test_shutdown_releases_the_transport() {
        let transport = Arc::new(MockTransport::batch().with_relay(relay(1), MockRelay::answering(vec![])));
        let core = watched(transport.clone(), 1);

        core.shutdown().await;
        assert!(transport.is_shut_down());
    }

    #[tokio::test]
    async fn test_locked_session_browses_but_cannot_publish_until_unlocked() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let transport = || Arc::new(MockTransport::batch().with_relay(relay(1), MockRelay::answering(vec![])));
        let first = MurmurCore::new(&config(1), storage.clone(), transport()).unwrap();
        let pk = first.login_with_password(None, Some("correct horse")).unwrap();

        let resumed = MurmurCore::new(&config(1), storage, transport()).unwrap();
        let info = resumed.session();
        assert_eq!(info.public_key, Some(pk.to_hex()));
        assert!(info.locked);
        assert!(!info.can_sign);
        assert!(matches!(resumed.publish_note("hi").await, Err(CoreError::NotAuthenticated)));

        resumed.unlock("correct horse").unwrap();
        assert!(resumed.session().can_sign);
        assert!(resumed.publish_note("hi").await.is_ok());
    }
}
