//! Per-recipient subscription state.
//!
//! Entries are created on first interaction and retained for the process
//! lifetime; `unsubscribe` flips the flag instead of removing the entry.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Opaque, transport-independent recipient identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecipientId(String);

impl RecipientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecipientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecipientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Thread-safe map of recipient -> subscribed.
///
/// The lock covers only the map access and is never held across I/O.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<BTreeMap<RecipientId, bool>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with subscribed recipients.
    pub fn with_subscribers<I>(recipients: I) -> Self
    where
        I: IntoIterator<Item = RecipientId>,
    {
        let entries = recipients.into_iter().map(|id| (id, true)).collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Records a recipient without changing an existing subscription.
    pub fn touch(&self, recipient: &RecipientId) {
        self.entries().entry(recipient.clone()).or_insert(false);
    }

    /// Returns true when the recipient was not subscribed before.
    pub fn subscribe(&self, recipient: &RecipientId) -> bool {
        let previous = self.entries().insert(recipient.clone(), true);
        previous != Some(true)
    }

    /// Returns true when the recipient was subscribed before.
    pub fn unsubscribe(&self, recipient: &RecipientId) -> bool {
        let previous = self.entries().insert(recipient.clone(), false);
        previous == Some(true)
    }

    pub fn is_subscribed(&self, recipient: &RecipientId) -> bool {
        self.entries().get(recipient).copied().unwrap_or(false)
    }

    /// Snapshot of subscribed recipients at call time.
    pub fn active_subscribers(&self) -> BTreeSet<RecipientId> {
        self.entries()
            .iter()
            .filter(|(_, subscribed)| **subscribed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of known recipients, subscribed or not.
    pub fn known(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<RecipientId, bool>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
