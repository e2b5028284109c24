use std::collections::HashMap;

use nostr_sdk::prelude::{Event, PublicKey};

use crate::models::{Profile, SuggestedUser};

/// Latest parsed kind-0 metadata per public key.
#[derive(Debug, Default)]
pub struct ProfileCache {
    profiles: HashMap<String, Profile>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pubkey: &PublicKey) -> Option<&Profile> {
        self.profiles.get(&pubkey.to_hex())
    }

    /// Fold metadata events in. Malformed content is skipped; an older
    /// event never overwrites a newer one. Returns how many entries changed.
    pub fn ingest<'a, I>(&mut self, events: I) -> usize
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut changed = 0;
        for profile in events.into_iter().filter_map(Profile::from_event) {
            let newer = self
                .profiles
                .get(&profile.pubkey)
                .map_or(true, |current| profile.created_at > current.created_at);
            if newer {
                self.profiles.insert(profile.pubkey.clone(), profile);
                changed += 1;
            }
        }
        changed
    }

    /// Profiles for `authors` that parsed, in the order given, up to `shown`.
    pub fn suggestions(&self, authors: &[PublicKey], shown: usize) -> Vec<SuggestedUser> {
        authors
            .iter()
            .filter_map(|pk| self.get(pk))
            .take(shown)
            .map(SuggestedUser::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::profile_event;
    use nostr_sdk::prelude::Keys;

    #[test]
    fn test_latest_profile_wins() {
        let keys = Keys::generate();
        let mut cache = ProfileCache::new();
        let new = profile_event(&keys, r#"{"name":"new"}"#, 200);
        let old = profile_event(&keys, r#"{"name":"old"}"#, 100);

        cache.ingest([&new, &old]);
        let profile = cache.get(&keys.public_key()).unwrap();
        assert_eq!(profile.metadata.name.as_deref(), Some("new"));
    }

    #[test]
    fn test_malformed_metadata_leaves_key_absent() {
        let good = Keys::generate();
        let bad = Keys::generate();
        let mut cache = ProfileCache::new();
        let events = vec![
            profile_event(&bad, "{not json", 100),
            profile_event(&good, r#"{"name":"ok","about":"hi","extra":1}"#, 100),
        ];

        assert_eq!(cache.ingest(&events), 1);
        assert!(cache.get(&bad.public_key()).is_none());
        assert_eq!(cache.get(&good.public_key()).unwrap().metadata.about.as_deref(), Some("hi"));
    }

    #[test]
    fn test_malformed_newer_event_keeps_older_profile() {
        let keys = Keys::generate();
        let mut cache = ProfileCache::new();
        let events = vec![
            profile_event(&keys, r#"{"name":"kept"}"#, 100),
            profile_event(&keys, "42", 200),
        ];

        cache.ingest(&events);
        assert_eq!(cache.get(&keys.public_key()).unwrap().metadata.name.as_deref(), Some("kept"));
    }

    #[test]
    fn test_suggestions_skip_missing_profiles_and_cap() {
        let a = Keys::generate();
        let b = Keys::generate();
        let c = Keys::generate();
        let mut cache = ProfileCache::new();
        let events = vec![
            profile_event(&a, r#"{"name":"a"}"#, 1),
            profile_event(&c, r#"{"name":"c"}"#, 1),
        ];
        cache.ingest(&events);

        let authors = vec![b.public_key(), c.public_key(), a.public_key()];
        let names: Vec<Option<String>> = cache.suggestions(&authors, 2).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec![Some("c".to_string()), Some("a".to_string())]);
    }
}
