//! Metadata backends the orchestrator drives.
//!
//! A backend accepts a [`QueryPlan`] (predicate, scopes, ordering) and hands
//! back a [`MetadataQuery`] handle. The handle is event driven: callers
//! subscribe a one-shot gather listener, call `start()`, and later read the
//! accumulated records by index, either after the listener fired or at any
//! earlier point for a partial view.

mod memory;
mod notifier;
mod walk;

#[cfg(target_os = "macos")]
mod spotlight;

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::query::{Attribute, AttributeSource, OrderSpec, Predicate, SearchScope};

pub use memory::{GatherBehavior, MemoryBackend, MemoryEntry};
pub use notifier::GatherNotifier;
pub use walk::WalkBackend;

#[cfg(target_os = "macos")]
pub use spotlight::SpotlightBackend;

/// Everything a backend needs to run one search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub predicate: Predicate,
    pub scopes: Vec<SearchScope>,
    pub order: OrderSpec,
}

/// One-shot "gathering finished" callback.
pub type GatherListener = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned by [`MetadataQuery::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A metadata index service.
pub trait MetadataBackend: Send + Sync {
    /// Prepares a query. Nothing runs until [`MetadataQuery::start`].
    fn open(&self, plan: QueryPlan) -> Result<Arc<dyn MetadataQuery>>;
}

/// A single prepared search against a backend.
pub trait MetadataQuery: Send + Sync {
    fn subscribe(&self, listener: GatherListener) -> SubscriptionId;

    fn unsubscribe(&self, subscription: SubscriptionId);

    /// Begins gathering. `false` means the backend refused the plan.
    fn start(&self) -> bool;

    fn stop(&self);

    /// Number of records accumulated so far, in backend order.
    fn result_count(&self) -> usize;

    fn result_at(&self, index: usize) -> Option<RawRecord>;

    /// Why `start()` returned `false`, if the backend knows.
    fn start_error(&self) -> Option<String> {
        None
    }
}

/// A typed attribute value as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Bytes(u64),
    Time(DateTime<Utc>),
}

/// The raw attributes of one result item.
///
/// Backends fill in what they can read. Absent keys stay absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    values: HashMap<Attribute, AttributeValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, attribute: Attribute, value: AttributeValue) {
        self.values.insert(attribute, value);
    }

    pub fn with(mut self, attribute: Attribute, value: AttributeValue) -> Self {
        self.set(attribute, value);
        self
    }

    pub fn get(&self, attribute: Attribute) -> Option<&AttributeValue> {
        self.values.get(&attribute)
    }

    /// Copies every record attribute `source` can provide.
    pub fn capture(source: &dyn AttributeSource) -> Self {
        let mut record = Self::new();
        for attribute in Attribute::RECORD {
            let value = match attribute {
                Attribute::Size => source.bytes(attribute).map(AttributeValue::Bytes),
                Attribute::CreatedAt | Attribute::ModifiedAt => {
                    source.time(attribute).map(AttributeValue::Time)
                }
                _ => source
                    .text(attribute)
                    .map(|value| AttributeValue::Text(value.into_owned())),
            };
            if let Some(value) = value {
                record.set(attribute, value);
            }
        }
        record
    }
}

impl AttributeSource for RawRecord {
    fn text(&self, attribute: Attribute) -> Option<Cow<'_, str>> {
        match self.get(attribute)? {
            AttributeValue::Text(value) => Some(Cow::Borrowed(value.as_str())),
            _ => None,
        }
    }

    fn bytes(&self, attribute: Attribute) -> Option<u64> {
        match self.get(attribute)? {
            AttributeValue::Bytes(value) => Some(*value),
            _ => None,
        }
    }

    fn time(&self, attribute: Attribute) -> Option<DateTime<Utc>> {
        match self.get(attribute)? {
            AttributeValue::Time(value) => Some(*value),
            _ => None,
        }
    }
}
