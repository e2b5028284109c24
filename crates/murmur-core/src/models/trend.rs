use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trend {
    /// First-seen spelling, without the leading `#`
    pub tag: String,
    pub category: String,
    pub count: usize,
}
