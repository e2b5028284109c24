use std::collections::HashSet;

use nostr_sdk::prelude::{Event, PublicKey};
use serde::{Deserialize, Serialize};

use crate::constants::kinds;
use crate::models::tag_utils::all_tag_values;
use crate::models::Note;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    /// Every recent note
    #[default]
    ForYou,
    /// Notes by the authors in my latest contact list
    Following,
}

/// Who I follow, as far as my contact list says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowSet {
    Authors(Vec<PublicKey>),
    /// No contact list was found, or it tags nobody
    NotFollowingAnyone,
}

/// The newest kind-3 event authored by `owner`. Ties keep the first seen.
pub fn latest_contact_list<'a, I>(events: I, owner: &PublicKey) -> Option<&'a Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    events
        .into_iter()
        .filter(|e| e.kind.as_u16() == kinds::CONTACT_LIST && e.pubkey == *owner)
        .fold(None, |latest: Option<&Event>, event| match latest {
            Some(current) if current.created_at >= event.created_at => Some(current),
            _ => Some(event),
        })
}

impl FollowSet {
    /// Read the `p` tags of my newest contact list, if there is one.
    pub fn from_latest(contact_list: Option<&Event>) -> Self {
        contact_list.map_or(Self::NotFollowingAnyone, Self::from_contact_list)
    }

    pub fn from_contact_list(event: &Event) -> Self {
        let mut authors: Vec<PublicKey> = Vec::new();
        for value in all_tag_values(event, "p") {
            match PublicKey::from_hex(value) {
                Ok(pk) if !authors.contains(&pk) => authors.push(pk),
                Ok(_) => {}
                Err(e) => tracing::debug!("Ignoring bad contact entry {}: {}", value, e),
            }
        }
        if authors.is_empty() {
            Self::NotFollowingAnyone
        } else {
            Self::Authors(authors)
        }
    }
}

/// Notes newest first, optionally restricted to `authors`.
pub fn timeline(notes: Vec<Note>, authors: Option<&[PublicKey]>) -> Vec<Note> {
    let allowed: Option<HashSet<String>> = authors.map(|a| a.iter().map(|pk| pk.to_hex()).collect());
    let mut notes: Vec<Note> = notes
        .into_iter()
        .filter(|note| allowed.as_ref().map_or(true, |set| set.contains(&note.author)))
        .collect();
    notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    notes
}
