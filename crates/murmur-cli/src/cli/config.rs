use std::path::Path;

use anyhow::{Context, Result};
use murmur_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration loaded from a JSON file. Core settings sit at the top
/// level next to the CLI-only keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    #[serde(flatten)]
    pub core: CoreConfig,

    /// Keep the session in the OS keychain instead of a file under `dataDir`
    #[serde(default)]
    pub keyring: bool,

    /// Key to log in with when no session is stored yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// nsec, ncryptsec or 64-char hex secret key
    pub key: String,

    /// Opens an ncryptsec key, and keeps the stored key encrypted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.core.relay_urls()?;
        Ok(config)
    }
}
