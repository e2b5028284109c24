use serde::Serialize;

/// A direct-message counterparty with the latest message exchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub pubkey: String,
    pub last_event_id: String,
    pub last_message: String,
    /// False when `last_message` is the placeholder
    pub decrypted: bool,
    pub created_at: u64,
    pub from_me: bool,
}
