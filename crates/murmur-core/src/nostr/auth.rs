use std::sync::Arc;

use nostr_sdk::nips::nip04;
use nostr_sdk::nips::nip49::EncryptedSecretKey;
use nostr_sdk::prelude::*;
use parking_lot::RwLock;

use crate::constants::{PRIVATE_KEY_ENTRY, PUBLIC_KEY_ENTRY};
use crate::error::CoreError;
use crate::events::{SessionEvent, SessionObservers};
use crate::storage::KeyValueStore;

/// Normalize user-supplied key material into a secret key.
/// Accepts 64-char hex or NIP-19 `nsec1...`, surrounding whitespace ignored.
pub fn parse_secret_key(input: &str) -> Result<SecretKey, CoreError> {
    let input = input.trim();
    if input.starts_with("nsec1") {
        return SecretKey::from_bech32(input)
            .map_err(|e| CoreError::validation(format!("Invalid nsec: {e}")));
    }
    if input.len() == 64 && input.chars().all(|c| c.is_ascii_hexdigit()) {
        return SecretKey::from_hex(input)
            .map_err(|e| CoreError::validation(format!("Invalid private key: {e}")));
    }
    Err(CoreError::validation(
        "Private key must be 64 hex characters or an nsec1 key",
    ))
}

const ENCRYPTED_KEY_PREFIX: &str = "ncryptsec1";

/// Like `parse_secret_key`, but also opens a NIP-49 `ncryptsec1...` key
/// with `password`.
pub fn unlock_secret_key(input: &str, password: Option<&str>) -> Result<SecretKey, CoreError> {
    let input = input.trim();
    if !input.starts_with(ENCRYPTED_KEY_PREFIX) {
        return parse_secret_key(input);
    }
    let password = password.ok_or_else(|| CoreError::validation("Password required for ncryptsec key"))?;
    let encrypted = EncryptedSecretKey::from_bech32(input)
        .map_err(|e| CoreError::validation(format!("Invalid ncryptsec: {e}")))?;
    encrypted
        .decrypt(password)
        .map_err(|e| CoreError::validation(format!("Could not decrypt key: {e}")))
}

pub fn parse_public_key(input: &str) -> Result<PublicKey, CoreError> {
    PublicKey::parse(input.trim())
        .map_err(|e| CoreError::validation(format!("Invalid public key: {e}")))
}

#[derive(Debug, Clone)]
enum Credentials {
    Full(Keys),
    ReadOnly(PublicKey),
}

impl Credentials {
    fn public_key(&self) -> PublicKey {
        match self {
            Credentials::Full(keys) => keys.public_key(),
            Credentials::ReadOnly(pk) => *pk,
        }
    }
}

/// Holds the user's key pair and persists the minimum needed to resume.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    current: RwLock<Option<Credentials>>,
    observers: SessionObservers,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            current: RwLock::new(None),
            observers: SessionObservers::new(),
        }
    }

    pub fn observers(&self) -> &SessionObservers {
        &self.observers
    }

    /// Restore a persisted session. A corrupt entry is wiped and the session
    /// comes back logged out. A password-protected key resumes read-only
    /// until `unlock`.
    pub fn resume(&self) -> Option<PublicKey> {
        let stored_private = self.storage.get(PRIVATE_KEY_ENTRY).ok().flatten();
        let stored_public = self.storage.get(PUBLIC_KEY_ENTRY).ok().flatten();

        let credentials = match (stored_private, stored_public) {
            (Some(secret), public) if secret.starts_with(ENCRYPTED_KEY_PREFIX) => {
                let locked = EncryptedSecretKey::from_bech32(&secret)
                    .map_err(|e| CoreError::validation(e.to_string()))
                    .and_then(|_| parse_public_key(public.as_deref().unwrap_or_default()));
                match locked {
                    Ok(pk) => {
                        tracing::info!("Stored key is encrypted; resuming read-only until unlocked");
                        Some(Credentials::ReadOnly(pk))
                    }
                    Err(e) => {
                        tracing::warn!("Discarding unreadable encrypted key: {}", e);
                        self.clear_persisted();
                        None
                    }
                }
            }
            (Some(secret), _) => match parse_secret_key(&secret) {
                Ok(secret_key) => Some(Credentials::Full(Keys::new(secret_key))),
                Err(e) => {
                    tracing::warn!("Discarding unreadable stored private key: {}", e);
                    self.clear_persisted();
                    None
                }
            },
            (None, Some(public)) => match parse_public_key(&public) {
                Ok(pk) => Some(Credentials::ReadOnly(pk)),
                Err(e) => {
                    tracing::warn!("Discarding unreadable stored public key: {}", e);
                    self.clear_persisted();
                    None
                }
            },
            (None, None) => None,
        }?;

        let public_key = credentials.public_key();
        self.set_current(credentials);
        tracing::info!("Resumed session for {}", public_key.to_hex());
        Some(public_key)
    }

    /// True while a password-protected key is stored but not yet unlocked.
    pub fn is_locked(&self) -> bool {
        !self.can_sign() && self.stored_encrypted_key().is_some()
    }

    /// Decrypt the stored key with `password` and regain signing. A wrong
    /// password leaves the session as it was.
    pub fn unlock(&self, password: &str) -> Result<PublicKey, CoreError> {
        let stored = self
            .stored_encrypted_key()
            .ok_or_else(|| CoreError::validation("No encrypted key is stored"))?;
        let keys = Keys::new(unlock_secret_key(&stored, Some(password))?);
        let public_key = keys.public_key();
        self.storage.set(PUBLIC_KEY_ENTRY, &public_key.to_hex())?;
        self.set_current(Credentials::Full(keys));
        tracing::info!("Unlocked session for {}", public_key.to_hex());
        Ok(public_key)
    }

    /// Log in with an existing private key, or generate a fresh one.
    /// On a validation failure the current session is left untouched.
    pub fn login(&self, private_key: Option<&str>) -> Result<PublicKey, CoreError> {
        self.login_with_password(private_key, None)
    }

    /// As `login`, but a non-empty `password` stores the key as a NIP-49
    /// `ncryptsec` instead of a plain `nsec`. `private_key` may itself be an
    /// `ncryptsec` opened with `password`.
    pub fn login_with_password(
        &self,
        private_key: Option<&str>,
        password: Option<&str>,
    ) -> Result<PublicKey, CoreError> {
        let password = password.filter(|p| !p.is_empty());
        let keys = match private_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(input) => Keys::new(unlock_secret_key(input, password)?),
            None => Keys::generate(),
        };

        let stored = match password {
            Some(pwd) => keys
                .secret_key()
                .encrypt(pwd)
                .map_err(CoreError::signing)?
                .to_bech32()
                .map_err(CoreError::signing)?,
            None => keys.secret_key().to_bech32().map_err(CoreError::signing)?,
        };
        let public_key = keys.public_key();
        self.storage.set(PUBLIC_KEY_ENTRY, &public_key.to_hex())?;
        self.storage.set(PRIVATE_KEY_ENTRY, &stored)?;

        self.set_current(Credentials::Full(keys));
        tracing::info!("Logged in as {}", public_key.to_hex());
        Ok(public_key)
    }

    /// Browse as a public key without signing capability.
    pub fn login_public_key(&self, input: &str) -> Result<PublicKey, CoreError> {
        let public_key = parse_public_key(input)?;
        self.storage.delete(PRIVATE_KEY_ENTRY)?;
        self.storage.set(PUBLIC_KEY_ENTRY, &public_key.to_hex())?;
        self.set_current(Credentials::ReadOnly(public_key));
        Ok(public_key)
    }

    pub fn logout(&self) -> Result<(), CoreError> {
        self.storage.delete(PUBLIC_KEY_ENTRY)?;
        self.storage.delete(PRIVATE_KEY_ENTRY)?;
        let was_logged_in = self.current.write().take().is_some();
        if was_logged_in {
            tracing::info!("Logged out");
            self.observers.notify(&SessionEvent::LoggedOut);
        }
        Ok(())
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.current.read().as_ref().map(Credentials::public_key)
    }

    /// True only when a private key is held.
    pub fn can_sign(&self) -> bool {
        matches!(*self.current.read(), Some(Credentials::Full(_)))
    }

    pub fn keys(&self) -> Result<Keys, CoreError> {
        match self.current.read().as_ref() {
            Some(Credentials::Full(keys)) => Ok(keys.clone()),
            _ => Err(CoreError::NotAuthenticated),
        }
    }

    pub fn sign(&self, unsigned: UnsignedEvent) -> Result<Event, CoreError> {
        let keys = self.keys()?;
        if unsigned.pubkey != keys.public_key() {
            return Err(CoreError::signing("event author does not match session key"));
        }
        unsigned.sign_with_keys(&keys).map_err(CoreError::signing)
    }

    pub fn encrypt_for(&self, recipient: &PublicKey, plaintext: &str) -> Result<String, CoreError> {
        let keys = self.keys()?;
        nip04::encrypt(keys.secret_key(), recipient, plaintext).map_err(CoreError::signing)
    }

    fn set_current(&self, credentials: Credentials) {
        let event = SessionEvent::LoggedIn {
            public_key: credentials.public_key(),
            read_only: matches!(credentials, Credentials::ReadOnly(_)),
        };
        *self.current.write() = Some(credentials);
        self.observers.notify(&event);
    }

    fn stored_encrypted_key(&self) -> Option<String> {
        self.storage
            .get(PRIVATE_KEY_ENTRY)
            .ok()
            .flatten()
            .filter(|stored| stored.starts_with(ENCRYPTED_KEY_PREFIX))
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.storage.delete(PRIVATE_KEY_ENTRY) {
            tracing::warn!("Failed to clear stored private key: {}", e);
        }
        if let Err(e) = self.storage.delete(PUBLIC_KEY_ENTRY) {
            tracing::warn!("Failed to clear stored public key: {}", e);
        }
    }
}
