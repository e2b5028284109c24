//! Text search over notes and profiles.
//!
//! - Multi-term AND queries with the '+' operator
//! - Case-insensitive substring matching
//! - Profiles match on `name`, `display_name` or `about`

use crate::models::{Note, Profile};

/// Split a query into lowercase terms that must ALL match.
///
/// # Examples
/// - "nostr" -> ["nostr"]
/// - "nostr+relay" -> ["nostr", "relay"]
/// - "  Nostr + relay  " -> ["nostr", "relay"]
/// - "" -> []
pub fn parse_search_terms(query: &str) -> Vec<String> {
    query
        .split('+')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `terms` must already be lowercase.
pub fn text_contains_all_terms(text: &str, terms: &[String]) -> bool {
    let text = text.to_lowercase();
    terms.iter().all(|term| text.contains(term.as_str()))
}

fn profile_matches(profile: &Profile, terms: &[String]) -> bool {
    let metadata = &profile.metadata;
    let searchable = [&metadata.name, &metadata.display_name, &metadata.about]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    text_contains_all_terms(&searchable, terms)
}

/// Notes whose content matches every term, order preserved.
/// An empty query matches nothing.
pub fn search_notes(notes: Vec<Note>, query: &str) -> Vec<Note> {
    let terms = parse_search_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }
    notes
        .into_iter()
        .filter(|note| text_contains_all_terms(&note.content, &terms))
        .collect()
}

pub fn search_profiles<'a, I>(profiles: I, query: &str) -> Vec<Profile>
where
    I: IntoIterator<Item = &'a Profile>,
{
    let terms = parse_search_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }
    profiles
        .into_iter()
        .filter(|profile| profile_matches(profile, &terms))
        .cloned()
        .collect()
}
