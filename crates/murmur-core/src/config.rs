use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use nostr_sdk::prelude::RelayUrl;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_RELAYS, FEED_TIMEOUT_SECS, PROFILE_TIMEOUT_SECS,
    PUBLISH_TIMEOUT_SECS, SEARCH_TIMEOUT_SECS,
};
use crate::error::CoreError;

/// Which configured relays a read operation goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayScope {
    /// Every configured relay, for redundancy
    #[default]
    All,
    /// Only the first configured relay, for latency-sensitive pages
    First,
}

/// Fallback ceilings, in seconds, keyed by how important the query is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
    pub feed: u64,
    pub profile: u64,
    pub search: u64,
    pub publish: u64,
    pub connect: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            feed: FEED_TIMEOUT_SECS,
            profile: PROFILE_TIMEOUT_SECS,
            search: SEARCH_TIMEOUT_SECS,
            publish: PUBLISH_TIMEOUT_SECS,
            connect: CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Timeouts {
    pub fn feed(&self) -> Duration {
        Duration::from_secs(self.feed)
    }

    pub fn profile(&self) -> Duration {
        Duration::from_secs(self.profile)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_secs(self.publish)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub relays: Vec<String>,
    pub data_dir: PathBuf,
    pub timeouts: Timeouts,
    pub relay_scope: RelayScope,
    /// Read through live subscriptions only, never batch fetches
    pub stream_only: bool,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load config from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CoreConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.relay_urls()?;
        Ok(config)
    }

    /// Parse the configured relay set. An empty set or any malformed URI is
    /// rejected so a bad configuration fails at startup, not mid-query.
    pub fn relay_urls(&self) -> Result<Vec<RelayUrl>, CoreError> {
        if self.relays.is_empty() {
            return Err(CoreError::config("no relays configured"));
        }
        self.relays
            .iter()
            .map(|url| {
                RelayUrl::parse(url)
                    .map_err(|e| CoreError::config(format!("invalid relay url {url}: {e}")))
            })
            .collect()
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join("murmur"))
            .unwrap_or_else(|| PathBuf::from("murmur_data"));
        Self {
            relays: DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect(),
            data_dir,
            timeouts: Timeouts::default(),
            relay_scope: RelayScope::default(),
            stream_only: false,
        }
    }
}
