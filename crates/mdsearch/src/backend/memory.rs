//! In-memory metadata backend.
//!
//! Holds a fixed list of entries and evaluates plans against them locally.
//! Gathering is scriptable so callers can exercise completion, slow
//! completion, never-finishing and refused searches deterministically. Each
//! entry can also become visible only after a delay, which models a backend
//! that accumulates results over time.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{
    GatherListener, GatherNotifier, MetadataBackend, MetadataQuery, QueryPlan, RawRecord,
    SubscriptionId,
};
use crate::error::Result;
use crate::query::{is_within_scope, Attribute, AttributeSource, SearchScope};

/// One indexed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    path: PathBuf,
    kind: Option<String>,
    size: Option<u64>,
    created_at: Option<DateTime<Utc>>,
    modified_at: Option<DateTime<Utc>>,
    content: Option<String>,
    available_after: Duration,
}

impl MemoryEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: None,
            size: None,
            created_at: None,
            modified_at: None,
            content: None,
            available_after: Duration::ZERO,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_created(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_modified(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// The entry only shows up in results once this much time has passed
    /// since `start()`.
    pub fn available_after(mut self, delay: Duration) -> Self {
        self.available_after = delay;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AttributeSource for MemoryEntry {
    fn text(&self, attribute: Attribute) -> Option<Cow<'_, str>> {
        match attribute {
            Attribute::Path => Some(self.path.to_string_lossy()),
            Attribute::FileName | Attribute::DisplayName => {
                self.path.file_name().map(|name| name.to_string_lossy())
            }
            Attribute::TextContent => self.content.as_deref().map(Cow::Borrowed),
            Attribute::Kind => self.kind.as_deref().map(Cow::Borrowed),
            _ => None,
        }
    }

    fn bytes(&self, attribute: Attribute) -> Option<u64> {
        match attribute {
            Attribute::Size => self.size,
            _ => None,
        }
    }

    fn time(&self, attribute: Attribute) -> Option<DateTime<Utc>> {
        match attribute {
            Attribute::CreatedAt => self.created_at,
            Attribute::ModifiedAt => self.modified_at,
            _ => None,
        }
    }
}

/// When a started query reports that gathering finished.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GatherBehavior {
    /// As soon as the runtime polls the notification task.
    #[default]
    Immediate,
    After(Duration),
    Never,
    /// `start()` returns `false` with this reason.
    Refuse(String),
}

/// Backend over a fixed list of entries.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Vec<MemoryEntry>,
    behavior: GatherBehavior,
    opened: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(entries: Vec<MemoryEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn with_behavior(mut self, behavior: GatherBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// How many queries have been opened against this backend.
    pub fn opened_queries(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl MetadataBackend for MemoryBackend {
    fn open(&self, plan: QueryPlan) -> Result<Arc<dyn MetadataQuery>> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        let mut matches = self
            .entries
            .iter()
            .filter(|entry| in_scopes(entry.path(), &plan.scopes))
            .filter(|entry| plan.predicate.matches(*entry))
            .cloned()
            .collect::<Vec<_>>();
        matches.sort_by(|left, right| plan.order.compare(left, right));

        log::debug!(
            "memory backend opened query predicate={} matches={}",
            plan.predicate,
            matches.len()
        );

        Ok(Arc::new(MemoryQuery {
            matches,
            behavior: self.behavior.clone(),
            notifier: Arc::new(GatherNotifier::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            clock: Mutex::new(QueryClock::default()),
        }))
    }
}

fn in_scopes(path: &Path, scopes: &[SearchScope]) -> bool {
    scopes.iter().any(|scope| match scope {
        SearchScope::IndexedVolume => true,
        SearchScope::Directory(root) => is_within_scope(path, root),
    })
}

#[derive(Debug, Default)]
struct QueryClock {
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

struct MemoryQuery {
    matches: Vec<MemoryEntry>,
    behavior: GatherBehavior,
    notifier: Arc<GatherNotifier>,
    stopped: Arc<AtomicBool>,
    clock: Mutex<QueryClock>,
}

impl MemoryQuery {
    fn visible(&self) -> impl Iterator<Item = &MemoryEntry> {
        let elapsed = {
            let clock = self.clock.lock();
            clock.started_at.map(|started_at| {
                clock
                    .stopped_at
                    .unwrap_or_else(Instant::now)
                    .saturating_duration_since(started_at)
            })
        };
        self.matches
            .iter()
            .filter(move |entry| elapsed.is_some_and(|elapsed| entry.available_after <= elapsed))
    }

    fn schedule_gathered(&self, delay: Duration) {
        let notifier = self.notifier.clone();
        let stopped = self.stopped.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if !stopped.load(Ordering::SeqCst) {
                        notifier.notify();
                    }
                });
            }
            Err(_) if delay.is_zero() => {
                notifier.notify();
            }
            Err(_) => {
                log::warn!("memory backend has no runtime to deliver a delayed gather notification");
            }
        }
    }
}

impl MetadataQuery for MemoryQuery {
    fn subscribe(&self, listener: GatherListener) -> SubscriptionId {
        self.notifier.subscribe(listener)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.notifier.unsubscribe(subscription);
    }

    fn start(&self) -> bool {
        if matches!(self.behavior, GatherBehavior::Refuse(_)) {
            return false;
        }
        self.clock.lock().started_at = Some(Instant::now());
        match &self.behavior {
            GatherBehavior::Immediate => self.schedule_gathered(Duration::ZERO),
            GatherBehavior::After(delay) => self.schedule_gathered(*delay),
            GatherBehavior::Never | GatherBehavior::Refuse(_) => {}
        }
        true
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut clock = self.clock.lock();
        if clock.stopped_at.is_none() {
            clock.stopped_at = Some(Instant::now());
        }
    }

    fn result_count(&self) -> usize {
        self.visible().count()
    }

    fn result_at(&self, index: usize) -> Option<RawRecord> {
        self.visible().nth(index).map(|entry| RawRecord::capture(entry))
    }

    fn start_error(&self) -> Option<String> {
        match &self.behavior {
            GatherBehavior::Refuse(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Predicate, SearchScope};

    fn plan(predicate: Predicate, scopes: Vec<SearchScope>) -> QueryPlan {
        QueryPlan {
            predicate,
            scopes,
            order: Default::default(),
        }
    }

    #[test]
    fn unstarted_query_has_no_results() {
        let backend = MemoryBackend::new(vec![MemoryEntry::new("/a/b.txt")]);
        let query = backend
            .open(plan(Predicate::True, vec![SearchScope::IndexedVolume]))
            .expect("open");
        assert_eq!(query.result_count(), 0);
        assert_eq!(backend.opened_queries(), 1);
    }

    #[test]
    fn scope_and_predicate_filter_entries() {
        let backend = MemoryBackend::new(vec![
            MemoryEntry::new("/tmp/docs/b.txt"),
            MemoryEntry::new("/tmp/docs/a.pdf"),
            MemoryEntry::new("/tmp/other.pdf"),
        ]);
        let query = backend
            .open(plan(
                Predicate::ends_with(Attribute::FileName, ".pdf"),
                vec![SearchScope::Directory(PathBuf::from("/tmp/docs"))],
            ))
            .expect("open");
        assert!(query.start());
        assert_eq!(query.result_count(), 1);
        let record = query.result_at(0).expect("record");
        assert_eq!(record.text(Attribute::Path).as_deref(), Some("/tmp/docs/a.pdf"));
    }

    #[test]
    fn refused_query_reports_reason() {
        let backend = MemoryBackend::new(vec![])
            .with_behavior(GatherBehavior::Refuse("bad predicate".to_string()));
        let query = backend
            .open(plan(Predicate::True, vec![SearchScope::IndexedVolume]))
            .expect("open");
        assert!(!query.start());
        assert_eq!(query.start_error().as_deref(), Some("bad predicate"));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_entries_accumulate_until_stop() {
        let backend = MemoryBackend::new(vec![
            MemoryEntry::new("/a/1"),
            MemoryEntry::new("/a/2").available_after(Duration::from_millis(500)),
            MemoryEntry::new("/a/3").available_after(Duration::from_secs(5)),
        ])
        .with_behavior(GatherBehavior::Never);
        let query = backend
            .open(plan(Predicate::True, vec![SearchScope::IndexedVolume]))
            .expect("open");
        assert!(query.start());
        assert_eq!(query.result_count(), 1);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(query.result_count(), 2);
        query.stop();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(query.result_count(), 2);
    }
}
