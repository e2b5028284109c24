use nostr_sdk::prelude::{Event, PublicKey};

use crate::models::tag_utils::has_tag_value;
use crate::models::Notification;

/// Events that tag `me`, newest first. My own events are not notifications.
pub fn notifications(events: &[Event], me: &PublicKey) -> Vec<Notification> {
    let me_hex = me.to_hex();
    let mut items: Vec<Notification> = events
        .iter()
        .filter(|e| e.pubkey != *me && has_tag_value(e, "p", &me_hex))
        .filter_map(Notification::from_event)
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}
