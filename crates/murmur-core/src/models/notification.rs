use nostr_sdk::prelude::Event;
use serde::Serialize;

use super::tag_utils::first_tag_value;
use crate::constants::kinds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Repost,
    Mention,
    Follow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_event_id: Option<String>,
    pub created_at: u64,
}

impl Notification {
    pub fn from_event(event: &Event) -> Option<Self> {
        let kind = match event.kind.as_u16() {
            kinds::REACTION => NotificationKind::Like,
            kinds::REPOST => NotificationKind::Repost,
            kinds::TEXT_NOTE => NotificationKind::Mention,
            kinds::CONTACT_LIST => NotificationKind::Follow,
            _ => return None,
        };
        let content = match kind {
            NotificationKind::Mention | NotificationKind::Like => Some(event.content.clone()),
            _ => None,
        };
        Some(Self {
            id: event.id.to_hex(),
            kind,
            author: event.pubkey.to_hex(),
            content,
            target_event_id: first_tag_value(event, "e").map(str::to_string),
            created_at: event.created_at.as_u64(),
        })
    }
}
