use std::collections::{HashMap, HashSet};

use nostr_sdk::prelude::{Event, EventId, PublicKey};

use super::timeline::latest_contact_list;
use crate::constants::{kinds, FEED_CAPACITY};
use crate::models::Note;

#[derive(Debug, Clone)]
struct Entry {
    event: Event,
    /// Seen on at least one relay
    confirmed: bool,
    /// Merge generation this entry was last delivered in
    touched: u64,
}

/// Backing store for aggregated events, keyed by id.
///
/// Relay data and optimistic local publishes land here through separate
/// entry points so the two can be reconciled: a relay copy of an event
/// that was appended optimistically replaces it in place.
///
/// Past `capacity`, the least recently delivered relay entries are evicted.
/// Contact lists and unconfirmed entries are never evicted.
#[derive(Debug)]
pub struct FeedStore {
    entries: Vec<Entry>,
    index: HashMap<EventId, usize>,
    capacity: usize,
    generation: u64,
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            capacity,
            generation: 0,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    // ===== Getters =====

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.index.get(id).map(|&i| &self.entries[i].event)
    }

    /// Events of one kind, in insertion order.
    pub fn events_of_kind(&self, kind: u16) -> impl Iterator<Item = &Event> {
        self.entries
            .iter()
            .filter(move |entry| entry.event.kind.as_u16() == kind)
            .map(|entry| &entry.event)
    }

    /// Notes and reposts among `ids`, plus every unconfirmed one, newest
    /// first. Ties keep insertion order.
    pub fn notes_among(&self, ids: &HashSet<EventId>) -> Vec<Note> {
        let mut notes: Vec<Note> = self
            .entries
            .iter()
            .filter(|entry| !entry.confirmed || ids.contains(&entry.event.id))
            .filter_map(|entry| Note::from_event(&entry.event, entry.confirmed))
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notes
    }

    /// The newest contact list authored by `owner`.
    pub fn latest_contact_list(&self, owner: &PublicKey) -> Option<&Event> {
        latest_contact_list(self.events_of_kind(kinds::CONTACT_LIST), owner)
    }

    // ===== Mutations =====

    /// Insert events received from relays. Returns how many ids were new.
    pub fn merge_relay_events<I>(&mut self, events: I) -> usize
    where
        I: IntoIterator<Item = Event>,
    {
        self.generation += 1;
        let touched = self.generation;
        let mut added = 0;
        for event in events {
            match self.index.get(&event.id) {
                Some(&i) => {
                    let entry = &mut self.entries[i];
                    if !entry.confirmed {
                        tracing::debug!("Relay confirmed optimistic event {}", event.id.to_hex());
                    }
                    entry.event = event;
                    entry.confirmed = true;
                    entry.touched = touched;
                }
                None => {
                    self.push(Entry {
                        event,
                        confirmed: true,
                        touched,
                    });
                    added += 1;
                }
            }
        }
        self.evict();
        added
    }

    /// Insert a locally signed event ahead of relay confirmation.
    /// Returns false if the id is already known.
    pub fn append_optimistic(&mut self, event: Event) -> bool {
        if self.index.contains_key(&event.id) {
            return false;
        }
        self.push(Entry {
            event,
            confirmed: false,
            touched: self.generation,
        });
        true
    }

    /// Remove an optimistic entry no relay accepted. Confirmed entries stay.
    pub fn retract_optimistic(&mut self, id: &EventId) -> bool {
        let Some(&i) = self.index.get(id) else {
            return false;
        };
        if self.entries[i].confirmed {
            return false;
        }
        self.entries.remove(i);
        self.reindex();
        true
    }

    fn evict(&mut self) {
        let overflow = self.entries.len().saturating_sub(self.capacity);
        if overflow == 0 {
            return;
        }
        let mut candidates: Vec<(u64, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.confirmed && entry.event.kind.as_u16() != kinds::CONTACT_LIST)
            .map(|(i, entry)| (entry.touched, i))
            .collect();
        candidates.sort_unstable();
        let doomed: HashSet<usize> = candidates.into_iter().take(overflow).map(|(_, i)| i).collect();
        if doomed.is_empty() {
            return;
        }

        let mut position = 0;
        self.entries.retain(|_| {
            let keep = !doomed.contains(&position);
            position += 1;
            keep
        });
        self.reindex();
        tracing::debug!("Evicted {} event(s) past capacity {}", doomed.len(), self.capacity);
    }

    fn push(&mut self, entry: Entry) {
        self.index.insert(entry.event.id, self.entries.len());
        self.entries.push(entry);
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.event.id, i))
            .collect();
    }
}
