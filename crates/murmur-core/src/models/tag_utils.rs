//! Tag extraction utilities for parsing nostr events
//!
//! Tags are ordered string arrays whose first element is the tag name,
//! e.g. `["p", <pubkey>]` or `["e", <event-id>, <relay>, <marker>]`.

use nostr_sdk::prelude::Event;

/// Extract the first value of the first tag with the given name.
pub fn first_tag_value<'a>(event: &'a Event, tag_name: &str) -> Option<&'a str> {
    event.tags.iter().find_map(|tag| {
        let values = tag.as_slice();
        match values {
            [name, value, ..] if name == tag_name && !value.is_empty() => Some(value.as_str()),
            _ => None,
        }
    })
}

/// Extract all values for a given tag name, in tag order.
pub fn all_tag_values<'a>(event: &'a Event, tag_name: &str) -> Vec<&'a str> {
    event
        .tags
        .iter()
        .filter_map(|tag| match tag.as_slice() {
            [name, value, ..] if name == tag_name && !value.is_empty() => Some(value.as_str()),
            _ => None,
        })
        .collect()
}

/// Check whether a tag with the given name carries the given value.
pub fn has_tag_value(event: &Event, tag_name: &str, expected: &str) -> bool {
    all_tag_values(event, tag_name).contains(&expected)
}
