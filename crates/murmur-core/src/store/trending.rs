//! Hashtag trends and suggested authors over a recent-note window.

use std::collections::HashMap;

use nostr_sdk::prelude::{Event, PublicKey};

use crate::constants::categories::{
    CRYPTOCURRENCY, CRYPTO_KEYWORDS, TECHNOLOGY, TECH_KEYWORDS, TRENDING,
};
use crate::constants::kinds;
use crate::models::Trend;

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `#word` tokens in `content`, without the `#`.
pub fn extract_hashtags(content: &str) -> Vec<&str> {
    let mut tags = Vec::new();
    let mut rest = content;
    while let Some(pos) = rest.find('#') {
        let after = &rest[pos + 1..];
        let len = after.find(|c: char| !is_word_char(c)).unwrap_or(after.len());
        if len > 0 {
            tags.push(&after[..len]);
        }
        rest = &after[len..];
    }
    tags
}

/// Category by substring match against the keyword lists.
pub fn categorize(tag: &str) -> &'static str {
    let lower = tag.to_lowercase();
    if CRYPTO_KEYWORDS.iter().any(|k| lower.contains(k)) {
        CRYPTOCURRENCY
    } else if TECH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        TECHNOLOGY
    } else {
        TRENDING
    }
}

struct Tally<'a> {
    display: &'a str,
    count: usize,
    first_seen: usize,
}

/// Top `top_n` hashtags across the kind-1 events in `window`.
///
/// Counting is case-insensitive; the first-seen spelling is displayed.
/// Equal counts keep first-seen order. Recomputed from scratch per call.
pub fn trending(window: &[Event], top_n: usize) -> Vec<Trend> {
    let mut tallies: HashMap<String, Tally<'_>> = HashMap::new();
    let mut seen = 0;

    for event in window.iter().filter(|e| e.kind.as_u16() == kinds::TEXT_NOTE) {
        for tag in extract_hashtags(&event.content) {
            let tally = tallies.entry(tag.to_lowercase()).or_insert_with(|| {
                seen += 1;
                Tally {
                    display: tag,
                    count: 0,
                    first_seen: seen,
                }
            });
            tally.count += 1;
        }
    }

    let mut ranked: Vec<Tally<'_>> = tallies.into_values().collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.first_seen.cmp(&b.first_seen)));
    ranked
        .into_iter()
        .take(top_n)
        .map(|tally| Trend {
            tag: tally.display.to_string(),
            category: categorize(tally.display).to_string(),
            count: tally.count,
        })
        .collect()
}

/// Distinct authors in order of first appearance, capped at `cap`.
pub fn active_authors(window: &[Event], cap: usize) -> Vec<PublicKey> {
    let mut authors: Vec<PublicKey> = Vec::new();
    for event in window {
        if authors.len() == cap {
            break;
        }
        if !authors.contains(&event.pubkey) {
            authors.push(event.pubkey);
        }
    }
    authors
}
