use std::sync::Arc;

use anyhow::{Context, Result};
use murmur_core::nostr::{PublishReceipt, SessionStore};
use murmur_core::storage::{FileKeyValueStore, KeyValueStore, KeyringStore};
use murmur_core::{MurmurCore, SessionInfo, Tab};
use nostr_sdk::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};

use super::args::CliCommand;
use super::config::CliConfig;

/// Session storage chosen by `--keyring` or the config's `keyring` key.
pub fn open_storage(config: &CliConfig, keyring: bool) -> Result<Arc<dyn KeyValueStore>> {
    if keyring || config.keyring {
        return Ok(Arc::new(KeyringStore::new()));
    }
    let store = FileKeyValueStore::open(&config.core.data_dir)
        .with_context(|| format!("Failed to open session store in {}", config.core.data_dir.display()))?;
    Ok(Arc::new(store))
}

pub fn render(value: &Value, pretty: bool) -> Result<String> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(output)
}

/// Run one command and return its JSON result. `password` (or the
/// configured one) encrypts a new key at rest and unlocks a stored one.
pub async fn execute(
    command: CliCommand,
    config: &CliConfig,
    storage: Arc<dyn KeyValueStore>,
    password: Option<&str>,
) -> Result<Value> {
    let password = password.or_else(|| config.credentials.as_ref().and_then(|c| c.password.as_deref()));
    if !command.needs_relays() {
        let session = SessionStore::new(storage);
        session.resume();
        return session_command(command, &session, password);
    }

    tracing::debug!("Connecting to {} relay(s)", config.core.relays.len());
    let core = MurmurCore::connect(&config.core, storage).await?;
    if let Some(password) = password {
        if core.session_store().is_locked() {
            core.unlock(password).context("Failed to unlock stored key")?;
        }
    }
    if let Some(credentials) = &config.credentials {
        if core.session().public_key.is_none() {
            core.login_with_password(Some(&credentials.key), password)
                .context("Failed to log in with configured credentials")?;
        }
    }
    let result = relay_command(command, &core, password).await;
    core.shutdown().await;
    result
}

fn session_command(command: CliCommand, session: &SessionStore, password: Option<&str>) -> Result<Value> {
    match command {
        CliCommand::Login { key, read_only } => {
            match (key.as_deref(), read_only) {
                (Some(key), true) => session.login_public_key(key)?,
                (key, _) => session.login_with_password(key, password)?,
            };
            to_json(SessionInfo::from_store(session))
        }
        CliCommand::Logout => {
            session.logout()?;
            to_json(SessionInfo::from_store(session))
        }
        CliCommand::Whoami => to_json(SessionInfo::from_store(session)),
        other => anyhow::bail!("{other:?} needs a relay connection"),
    }
}

async fn relay_command(command: CliCommand, core: &MurmurCore, password: Option<&str>) -> Result<Value> {
    match command {
        CliCommand::Timeline { following } => {
            let tab = if following { Tab::Following } else { Tab::ForYou };
            to_json(core.get_timeline(tab).await)
        }
        CliCommand::Contacts => to_json(core.get_contacts().await),
        CliCommand::Profile { pubkey } => to_json(core.get_profile(&pubkey).await?),
        CliCommand::Notes { pubkey } => to_json(core.get_profile_notes(&pubkey).await?),
        CliCommand::Trending => to_json(core.get_trending().await),
        CliCommand::Search { query } => to_json(core.search(&query).await?),
        CliCommand::Notifications => to_json(core.get_notifications().await),
        CliCommand::Conversation { pubkey } => to_json(core.get_conversation(&pubkey).await?),
        CliCommand::Post { content } => Ok(receipt_json(&core.publish_note(&content).await?)),
        CliCommand::React { event_id, symbol } => {
            Ok(receipt_json(&core.publish_reaction(&event_id, &symbol).await?))
        }
        CliCommand::Repost { event_id } => Ok(receipt_json(&core.publish_repost(&event_id).await?)),
        CliCommand::Dm { pubkey, content } => {
            Ok(receipt_json(&core.send_direct_message(&pubkey, &content).await?))
        }
        CliCommand::Follow { pubkey } => Ok(receipt_json(&core.follow(&pubkey).await?)),
        CliCommand::Unfollow { pubkey } => Ok(receipt_json(&core.unfollow(&pubkey).await?)),
        CliCommand::Login { .. } | CliCommand::Logout | CliCommand::Whoami => {
            session_command(command, core.session_store(), password)
        }
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize result")
}

/// Per-relay outcome of a publish, one entry per relay asked.
pub fn receipt_json(receipt: &PublishReceipt) -> Value {
    let event = &receipt.event;
    let created_at = event.created_at.as_u64();
    let created_at_iso = i64::try_from(created_at)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|time| time.to_rfc3339());

    let accepted_by: Vec<String> = receipt
        .report
        .accepted_by()
        .into_iter()
        .map(|relay| relay.to_string())
        .collect();
    let failures: Vec<Value> = receipt
        .report
        .failures()
        .into_iter()
        .map(|(relay, error)| json!({ "relay": relay.to_string(), "error": error.to_string() }))
        .collect();

    json!({
        "id": event.id.to_hex(),
        "kind": event.kind.as_u16(),
        "createdAt": created_at,
        "createdAtIso": created_at_iso,
        "acceptedBy": accepted_by,
        "failures": failures,
    })
}
