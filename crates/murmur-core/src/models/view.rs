use serde::Serialize;

use super::{Note, Profile, SuggestedUser, Trend};

/// Why a view has nothing (or not everything) to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum EmptyReason {
    /// Every relay answered and nothing matched
    NoResults,
    /// The fallback ceiling fired before every relay finished
    TimedOut,
    /// My contact list is missing or tags nobody
    NotFollowingAnyone,
    /// The view needs a logged-in user
    NotAuthenticated,
    /// Every relay failed
    Unavailable(String),
}

/// What the presentation layer renders for one view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot<T> {
    pub data: T,
    pub loading: bool,
    /// True when some relays did not finish or failed
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EmptyReason>,
}

impl<T> ViewSnapshot<T> {
    pub fn ready(data: T) -> Self {
        Self {
            data,
            loading: false,
            partial: false,
            reason: None,
        }
    }

    pub fn empty(data: T, reason: EmptyReason) -> Self {
        Self {
            data,
            loading: false,
            partial: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingView {
    pub trends: Vec<Trend>,
    pub suggested_users: Vec<SuggestedUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub notes: Vec<Note>,
    pub profiles: Vec<Profile>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.profiles.is_empty()
    }
}
