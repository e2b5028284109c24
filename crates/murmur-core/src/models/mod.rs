pub mod contact;
pub mod message;
pub mod note;
pub mod notification;
pub mod profile;
pub mod tag_utils;
pub mod trend;
pub mod view;

pub use contact::Contact;
pub use message::DirectMessage;
pub use note::Note;
pub use notification::{Notification, NotificationKind};
pub use profile::{Profile, ProfileMetadata, SuggestedUser};
pub use trend::Trend;
pub use view::{EmptyReason, SearchResults, TrendingView, ViewSnapshot};
