//! Aggregate and event traits shared by the order model and its stores.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Stored revision of an aggregate document.
///
/// 0 means never written. Each accepted write moves it forward by one, and
/// repositories refuse a write whose expected version is stale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of an aggregate not yet written.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Version carried by the first write.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A decided fact about an aggregate, named in the past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Stable name, used in logs and as a metric label.
    fn event_type(&self) -> &'static str;
}

/// A consistency boundary stored as one versioned document.
///
/// Commands read the current state and return the events they decide on;
/// [`Aggregate::apply`] folds those events in. All events of one command are
/// persisted by a single compare-and-swap write.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Id: Copy + Eq + std::fmt::Display;
    type Event: DomainEvent;
    type Error: std::error::Error + Send + Sync;

    fn aggregate_type() -> &'static str;

    /// `None` until the creating event has been applied.
    fn id(&self) -> Option<Self::Id>;

    fn version(&self) -> Version;

    /// Set by repositories once a write is accepted.
    fn set_version(&mut self, version: Version);

    /// Folds one event into the state. Never fails.
    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
