pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod models;
pub mod nostr;
pub mod runtime;
pub mod search;
pub mod storage;
pub mod store;
pub mod tracing_setup;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{CoreConfig, RelayScope, Timeouts};
pub use error::{CoreError, TransportError};
pub use events::{ListenerId, SessionEvent, SessionObservers};
pub use runtime::{parse_event_id, LiveView, MurmurCore, SessionInfo};
pub use store::Tab;
