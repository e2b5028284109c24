pub mod contacts;
pub mod feed_store;
pub mod notifications;
pub mod profiles;
pub mod timeline;
pub mod trending;

pub use contacts::{contacts_from_direct_messages, conversation};
pub use feed_store::FeedStore;
pub use notifications::notifications;
pub use profiles::ProfileCache;
pub use timeline::{timeline, FollowSet, Tab};
pub use trending::{active_authors, trending};
