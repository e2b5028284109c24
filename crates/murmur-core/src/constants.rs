//! Application-wide constants
//!
//! Centralized location for relay defaults, event kinds and the
//! window sizes used by the aggregation views.

/// Default relay set, used when no configuration overrides it
pub const DEFAULT_RELAYS: &[&str] = &["wss://relay.damus.io", "wss://nos.lol"];

/// Placeholder shown when a direct message cannot be decrypted
pub const ENCRYPTED_PLACEHOLDER: &str = "[Encrypted message]";

/// Default reaction symbol
pub const DEFAULT_REACTION: &str = "+";

// Query windows
pub const TIMELINE_LIMIT: usize = 20;
pub const TRENDING_WINDOW: usize = 100;
pub const PROFILE_NOTES_LIMIT: usize = 20;
pub const SEARCH_NOTES_LIMIT: usize = 50;

/// Events the feed store keeps before evicting the least recently delivered
pub const FEED_CAPACITY: usize = 1000;

/// Number of hashtags surfaced by the trending panel
pub const TRENDING_TOP_N: usize = 3;
/// Distinct authors taken from the trending window for "who to follow"
pub const SUGGESTED_AUTHORS: usize = 5;
/// Profiles shown in the "who to follow" panel
pub const SUGGESTED_SHOWN: usize = 2;

// Fallback ceilings, in seconds
pub const FEED_TIMEOUT_SECS: u64 = 5;
pub const PROFILE_TIMEOUT_SECS: u64 = 10;
pub const SEARCH_TIMEOUT_SECS: u64 = 15;
pub const PUBLISH_TIMEOUT_SECS: u64 = 5;
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

// Session storage keys
pub const PUBLIC_KEY_ENTRY: &str = "murmur.public_key";
pub const PRIVATE_KEY_ENTRY: &str = "murmur.private_key";

// Nostr event kinds used by murmur
pub mod kinds {
    /// Metadata (profiles)
    pub const METADATA: u16 = 0;
    /// Text note
    pub const TEXT_NOTE: u16 = 1;
    /// Contact list (follows)
    pub const CONTACT_LIST: u16 = 3;
    /// NIP-04 encrypted direct message
    pub const DIRECT_MESSAGE: u16 = 4;
    /// Repost
    pub const REPOST: u16 = 6;
    /// Reaction
    pub const REACTION: u16 = 7;
}

/// Keyword lists used to categorize hashtags, matched by substring
pub mod categories {
    pub const CRYPTOCURRENCY: &str = "Cryptocurrency";
    pub const TECHNOLOGY: &str = "Technology";
    pub const TRENDING: &str = "Trending";

    pub const CRYPTO_KEYWORDS: &[&str] = &["bitcoin", "btc", "lightning", "crypto", "nft", "defi"];
    pub const TECH_KEYWORDS: &[&str] = &["nostr", "web", "dev", "programming", "tech", "code"];
}
