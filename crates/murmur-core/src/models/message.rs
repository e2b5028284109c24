use serde::Serialize;

/// One direct message in a conversation with a single counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectMessage {
    pub id: String,
    pub counterparty: String,
    pub from_me: bool,
    pub content: String,
    pub decrypted: bool,
    pub created_at: u64,
}
