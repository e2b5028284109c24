pub mod auth;
pub mod pool;
pub mod publish;
pub mod query;
pub mod transport;

pub use auth::{parse_public_key, parse_secret_key, unlock_secret_key, SessionStore};
pub use pool::{
    Completion, CompletionReason, ConnectionPool, PoolVariant, PublishReport, QueryOutcome,
    SubscriptionHandle,
};
pub use publish::{PublishPipeline, PublishReceipt};
pub use query::{settle, QueryEngine, Settled};
pub use transport::{Capabilities, RelayStream, RelayTransport, SdkRelayTransport, StreamItem};
