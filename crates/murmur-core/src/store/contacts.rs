//! Contacts and conversations derived from kind-4 direct messages.

use nostr_sdk::nips::nip04;
use nostr_sdk::prelude::{Event, Keys, PublicKey};

use crate::constants::{kinds, ENCRYPTED_PLACEHOLDER};
use crate::models::tag_utils::first_tag_value;
use crate::models::{Contact, DirectMessage};

/// The other party of a direct message seen from `me`: the first `p` tag
/// when I sent it, the author when I received it.
pub fn counterparty(event: &Event, me: &PublicKey) -> Option<PublicKey> {
    if event.pubkey != *me {
        return Some(event.pubkey);
    }
    let tagged = first_tag_value(event, "p")?;
    match PublicKey::from_hex(tagged) {
        Ok(pk) => Some(pk),
        Err(e) => {
            tracing::debug!("Skipping message {} with bad p tag: {}", event.id.to_hex(), e);
            None
        }
    }
}

/// Best-effort decryption. Returns the placeholder and `false` on failure.
pub fn decrypt_preview(event: &Event, counterparty: &PublicKey, keys: Option<&Keys>) -> (String, bool) {
    let Some(keys) = keys else {
        return (ENCRYPTED_PLACEHOLDER.to_string(), false);
    };
    match nip04::decrypt(keys.secret_key(), counterparty, &event.content) {
        Ok(plaintext) => (plaintext, true),
        Err(e) => {
            tracing::debug!("Could not decrypt message {}: {}", event.id.to_hex(), e);
            (ENCRYPTED_PLACEHOLDER.to_string(), false)
        }
    }
}

/// One contact per counterparty holding the latest message exchanged,
/// newest contact first. Ties on `created_at` keep the first-seen event.
pub fn contacts_from_direct_messages(events: &[Event], me: &PublicKey, keys: Option<&Keys>) -> Vec<Contact> {
    let mut latest: Vec<(PublicKey, &Event)> = Vec::new();

    for event in events.iter().filter(|e| e.kind.as_u16() == kinds::DIRECT_MESSAGE) {
        let Some(other) = counterparty(event, me) else {
            continue;
        };
        match latest.iter_mut().find(|(pk, _)| *pk == other) {
            Some((_, current)) if event.created_at > current.created_at => *current = event,
            Some(_) => {}
            None => latest.push((other, event)),
        }
    }

    let mut contacts: Vec<Contact> = latest
        .into_iter()
        .map(|(other, event)| {
            let (last_message, decrypted) = decrypt_preview(event, &other, keys);
            Contact {
                pubkey: other.to_hex(),
                last_event_id: event.id.to_hex(),
                last_message,
                decrypted,
                created_at: event.created_at.as_u64(),
                from_me: event.pubkey == *me,
            }
        })
        .collect();
    contacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    contacts
}

/// Every message exchanged with `other`, oldest first.
pub fn conversation(events: &[Event], me: &PublicKey, other: &PublicKey, keys: Option<&Keys>) -> Vec<DirectMessage> {
    let mut messages: Vec<DirectMessage> = events
        .iter()
        .filter(|e| e.kind.as_u16() == kinds::DIRECT_MESSAGE)
        .filter(|e| counterparty(e, me).as_ref() == Some(other))
        .map(|event| {
            let (content, decrypted) = decrypt_preview(event, other, keys);
            DirectMessage {
                id: event.id.to_hex(),
                counterparty: other.to_hex(),
                from_me: event.pubkey == *me,
                content,
                decrypted,
                created_at: event.created_at.as_u64(),
            }
        })
        .collect();
    messages.sort_by_key(|m| m.created_at);
    messages
}
