use nostr_sdk::prelude::Event;
use serde::{Deserialize, Serialize};

use crate::constants::kinds;

/// Kind-0 metadata content. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lud16: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub pubkey: String,
    pub created_at: u64,
    #[serde(flatten)]
    pub metadata: ProfileMetadata,
}

impl Profile {
    /// Parse a kind-0 event. Returns None for other kinds or content that
    /// is not a JSON object.
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.kind.as_u16() != kinds::METADATA {
            return None;
        }
        match serde_json::from_str::<ProfileMetadata>(&event.content) {
            Ok(metadata) => Some(Self {
                pubkey: event.pubkey.to_hex(),
                created_at: event.created_at.as_u64(),
                metadata,
            }),
            Err(e) => {
                tracing::debug!("Skipping malformed profile {}: {}", event.id.to_hex(), e);
                None
            }
        }
    }
}

/// Entry in the "who to follow" panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedUser {
    pub pubkey: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
}

impl From<&Profile> for SuggestedUser {
    fn from(profile: &Profile) -> Self {
        Self {
            pubkey: profile.pubkey.clone(),
            name: profile.metadata.name.clone(),
            about: profile.metadata.about.clone(),
        }
    }
}
