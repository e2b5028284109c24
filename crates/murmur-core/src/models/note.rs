use nostr_sdk::prelude::Event;
use serde::Serialize;

use super::tag_utils::first_tag_value;
use crate::constants::kinds;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: String,
    pub author: String,
    pub created_at: u64,
    pub kind: u16,
    pub content: String,
    /// Event this note replies to or reposts (first `e` tag)
    pub references: Option<String>,
    /// False while only the local optimistic copy is known
    pub confirmed: bool,
}

impl Note {
    /// Build a note from a text-note or repost event.
    pub fn from_event(event: &Event, confirmed: bool) -> Option<Self> {
        let kind = event.kind.as_u16();
        if kind != kinds::TEXT_NOTE && kind != kinds::REPOST {
            return None;
        }
        Some(Self {
            id: event.id.to_hex(),
            author: event.pubkey.to_hex(),
            created_at: event.created_at.as_u64(),
            kind,
            content: event.content.clone(),
            references: first_tag_value(event, "e").map(str::to_string),
            confirmed,
        })
    }

    pub fn is_repost(&self) -> bool {
        self.kind == kinds::REPOST
    }
}
