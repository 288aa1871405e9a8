use chrono::{DateTime, Local};

use crate::frame::Snapshot;

/// Outcome of captioning one snapshot against the trigger set.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    /// Caption as returned by the recognizer (trimmed, original casing).
    pub caption: String,
    /// Trigger words found in the caption, in configured order.
    pub matched: Vec<String>,
    pub timestamp: DateTime<Local>,
    pub snapshot: Snapshot,
}

impl DetectionResult {
    /// True when a notification is owed to every active subscriber.
    pub fn is_match(&self) -> bool {
        !self.matched.is_empty()
    }

    /// First matched trigger, used for headlines and archive file names.
    pub fn primary_trigger(&self) -> Option<&str> {
        self.matched.first().map(String::as_str)
    }
}
