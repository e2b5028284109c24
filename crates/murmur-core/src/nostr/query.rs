//! Domain questions as filters, resolved into settled event sets.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use nostr_sdk::prelude::*;

use super::pool::{Completion, ConnectionPool, QueryOutcome, SubscriptionHandle};
use crate::config::{RelayScope, Timeouts};
use crate::constants::{kinds, PROFILE_NOTES_LIMIT, SEARCH_NOTES_LIMIT, TIMELINE_LIMIT, TRENDING_WINDOW};
use crate::error::{CoreError, TransportError};

const NOTIFICATIONS_LIMIT: usize = 50;
const FOLLOWERS_LIMIT: usize = 20;

/// A resolved query: deduplicated by id, newest first.
#[derive(Debug, Clone)]
pub struct Settled<T> {
    pub value: T,
    /// False when the fallback ceiling fired before every relay finished
    pub complete: bool,
    pub failed_relays: Vec<(RelayUrl, String)>,
}

impl<T> Settled<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Settled<U> {
        Settled {
            value: f(self.value),
            complete: self.complete,
            failed_relays: self.failed_relays,
        }
    }

    /// True when every relay asked failed outright.
    pub fn all_failed(&self, relays_asked: usize) -> bool {
        relays_asked > 0 && self.failed_relays.len() >= relays_asked
    }

    /// Ok when the read finished and at least one relay answered, so an
    /// empty value means "none exists" rather than "not seen yet".
    pub fn conclusive(&self, relays_asked: usize, ceiling: Duration) -> Result<(), CoreError> {
        if self.all_failed(relays_asked) {
            let reasons: Vec<String> = self
                .failed_relays
                .iter()
                .map(|(relay, reason)| format!("{relay}: {reason}"))
                .collect();
            return Err(TransportError::Unreachable(reasons.join("; ")).into());
        }
        if !self.complete {
            return Err(CoreError::Timeout(ceiling));
        }
        Ok(())
    }
}

impl Settled<Vec<Event>> {
    pub fn empty() -> Self {
        Self {
            value: Vec::new(),
            complete: true,
            failed_relays: Vec::new(),
        }
    }
}

/// Merge per-filter outcomes: one entry per event id (first arrival wins),
/// sorted by `created_at` descending with arrival order kept among ties.
pub fn settle(outcomes: Vec<QueryOutcome>) -> Settled<Vec<Event>> {
    let mut seen: HashSet<EventId> = HashSet::new();
    let mut events = Vec::new();
    let mut complete = true;
    let mut failed_relays: Vec<(RelayUrl, String)> = Vec::new();

    for outcome in outcomes {
        complete &= outcome.complete;
        for (relay, reason) in outcome.failed_relays {
            if !failed_relays.iter().any(|(r, _)| *r == relay) {
                failed_relays.push((relay, reason));
            }
        }
        for event in outcome.events {
            if seen.insert(event.id) {
                events.push(event);
            }
        }
    }

    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Settled {
        value: events,
        complete,
        failed_relays,
    }
}

fn p_tagging(pubkey: &PublicKey) -> Filter {
    Filter::new().custom_tag(SingleLetterTag::lowercase(Alphabet::P), pubkey.to_hex())
}

pub struct QueryEngine {
    pool: Arc<ConnectionPool>,
    timeouts: Timeouts,
    scope: RelayScope,
}

impl QueryEngine {
    pub fn new(pool: Arc<ConnectionPool>, timeouts: Timeouts, scope: RelayScope) -> Self {
        Self { pool, timeouts, scope }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn relays(&self) -> Vec<RelayUrl> {
        self.pool.select(self.scope)
    }

    /// Run every filter concurrently against the scoped relays and settle.
    pub async fn run(&self, filters: Vec<Filter>, timeout: Duration) -> Settled<Vec<Event>> {
        let relays = self.relays();
        tracing::debug!("Running {} filter(s) on {} relay(s)", filters.len(), relays.len());
        let outcomes = join_all(
            filters
                .into_iter()
                .map(|filter| self.pool.query(filter, &relays, timeout)),
        )
        .await;
        let settled = settle(outcomes);
        if !settled.complete {
            tracing::debug!("Query resolved at fallback ceiling with {} event(s)", settled.value.len());
        }
        settled
    }

    /// Live subscription on the scoped relays.
    pub fn watch<E, C>(&self, filter: Filter, timeout: Duration, on_event: E, on_complete: C) -> SubscriptionHandle
    where
        E: FnMut(Event) + Send + 'static,
        C: FnOnce(Completion) + Send + 'static,
    {
        self.pool
            .subscribe(filter, &self.relays(), timeout, on_event, on_complete)
    }

    // ===== Notes =====

    pub fn recent_notes_filter(limit: usize) -> Filter {
        Filter::new().kind(Kind::from(kinds::TEXT_NOTE)).limit(limit)
    }

    pub async fn recent_notes(&self) -> Settled<Vec<Event>> {
        self.run(vec![Self::recent_notes_filter(TIMELINE_LIMIT)], self.timeouts.feed())
            .await
    }

    /// Bounded window the trending panel and suggestions are computed over.
    pub async fn trending_window(&self) -> Settled<Vec<Event>> {
        self.run(vec![Self::recent_notes_filter(TRENDING_WINDOW)], self.timeouts.feed())
            .await
    }

    pub async fn search_window(&self) -> Settled<Vec<Event>> {
        self.run(vec![Self::recent_notes_filter(SEARCH_NOTES_LIMIT)], self.timeouts.search())
            .await
    }

    /// Notes and reposts by `authors`, for the one-shot and live
    /// "following" views alike.
    pub fn following_filter(authors: Vec<PublicKey>, limit: usize) -> Filter {
        Filter::new()
            .kinds([Kind::from(kinds::TEXT_NOTE), Kind::from(kinds::REPOST)])
            .authors(authors)
            .limit(limit)
    }

    pub async fn notes_by_authors(&self, authors: Vec<PublicKey>) -> Settled<Vec<Event>> {
        if authors.is_empty() {
            return Settled::empty();
        }
        let filter = Self::following_filter(authors, TIMELINE_LIMIT);
        self.run(vec![filter], self.timeouts.feed()).await
    }

    pub async fn author_notes(&self, author: PublicKey) -> Settled<Vec<Event>> {
        let filter = Filter::new()
            .kind(Kind::from(kinds::TEXT_NOTE))
            .author(author)
            .limit(PROFILE_NOTES_LIMIT);
        self.run(vec![filter], self.timeouts.profile()).await
    }

    pub async fn event_by_id(&self, id: EventId) -> Settled<Option<Event>> {
        let filter = Filter::new().id(id).limit(1);
        self.run(vec![filter], self.timeouts.feed())
            .await
            .map(|events| events.into_iter().next())
    }

    // ===== Profiles and social graph =====

    pub async fn profiles(&self, authors: Vec<PublicKey>) -> Settled<Vec<Event>> {
        if authors.is_empty() {
            return Settled::empty();
        }
        let filter = Filter::new()
            .kind(Kind::from(kinds::METADATA))
            .authors(authors);
        self.run(vec![filter], self.timeouts.profile()).await
    }

    pub async fn contact_list(&self, owner: PublicKey) -> Settled<Vec<Event>> {
        let filter = Filter::new()
            .kind(Kind::from(kinds::CONTACT_LIST))
            .author(owner)
            .limit(1);
        self.run(vec![filter], self.timeouts.profile()).await
    }

    // ===== Messages and notifications =====

    /// Kind-4 events addressed to me and sent by me.
    pub async fn direct_messages(&self, me: PublicKey) -> Settled<Vec<Event>> {
        let dm = Kind::from(kinds::DIRECT_MESSAGE);
        let received = p_tagging(&me).kind(dm);
        let sent = Filter::new().kind(dm).author(me);
        self.run(vec![received, sent], self.timeouts.feed()).await
    }

    pub async fn conversation(&self, me: PublicKey, other: PublicKey) -> Settled<Vec<Event>> {
        let dm = Kind::from(kinds::DIRECT_MESSAGE);
        let received = p_tagging(&me).kind(dm).author(other);
        let sent = p_tagging(&other).kind(dm).author(me);
        self.run(vec![received, sent], self.timeouts.feed()).await
    }

    pub async fn notifications(&self, me: PublicKey) -> Settled<Vec<Event>> {
        let interactions = p_tagging(&me)
            .kinds([
                Kind::from(kinds::TEXT_NOTE),
                Kind::from(kinds::REPOST),
                Kind::from(kinds::REACTION),
            ])
            .limit(NOTIFICATIONS_LIMIT);
        let follows = p_tagging(&me)
            .kind(Kind::from(kinds::CONTACT_LIST))
            .limit(FOLLOWERS_LIMIT);
        self.run(vec![interactions, follows], self.timeouts.feed()).await
    }
}
