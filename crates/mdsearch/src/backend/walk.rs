//! Filesystem-walking backend for platforms without a metadata index.
//!
//! Each started query walks its scopes on a dedicated worker thread,
//! evaluates the predicate against live file metadata, and appends matches
//! as they arrive. Reads sort the pending matches into the plan's order
//! first, so a partial read after a timeout is already in final relative
//! order. Content criteria read the file itself (see [`file_content_matches`]).

use std::borrow::Cow;
use std::cell::OnceCell;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use parking_lot::Mutex;

use super::{
    GatherListener, GatherNotifier, MetadataBackend, MetadataQuery, QueryPlan, RawRecord,
    SubscriptionId,
};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::query::{
    file_content_matches, is_within_scope, Attribute, AttributeSource, OrderSpec, Predicate,
    SearchScope,
};

/// Backend that enumerates the filesystem directly.
#[derive(Debug, Clone)]
pub struct WalkBackend {
    volume_root: PathBuf,
    include_hidden: bool,
}

impl Default for WalkBackend {
    fn default() -> Self {
        Self::new("/")
    }
}

impl WalkBackend {
    /// `volume_root` stands in for the whole indexed volume when a query
    /// does not restrict its scope.
    pub fn new(volume_root: impl Into<PathBuf>) -> Self {
        Self {
            volume_root: volume_root.into(),
            include_hidden: false,
        }
    }

    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    fn resolve_roots(&self, scopes: &[SearchScope]) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = scopes
            .iter()
            .map(|scope| match scope {
                SearchScope::IndexedVolume => self.volume_root.clone(),
                SearchScope::Directory(path) => path.clone(),
            })
            .collect();
        roots.sort();
        roots.dedup();

        // Nested roots would be walked twice.
        let mut resolved: Vec<PathBuf> = Vec::with_capacity(roots.len());
        for root in roots {
            if !resolved.iter().any(|outer| is_within_scope(&root, outer)) {
                resolved.push(root);
            }
        }
        resolved
    }
}

impl MetadataBackend for WalkBackend {
    fn open(&self, plan: QueryPlan) -> Result<Arc<dyn MetadataQuery>> {
        let roots = self.resolve_roots(&plan.scopes);
        Ok(Arc::new(WalkQuery {
            roots,
            predicate: Arc::new(plan.predicate),
            include_hidden: self.include_hidden,
            started: AtomicBool::new(false),
            start_error: Mutex::new(None),
            shared: Arc::new(WalkShared {
                gathered: Mutex::new(Gathered::default()),
                notifier: GatherNotifier::new(),
                cancel: CancellationToken::new(),
                order: plan.order,
            }),
        }))
    }
}

#[derive(Default)]
struct Gathered {
    records: Vec<RawRecord>,
    sorted: bool,
}

struct WalkShared {
    gathered: Mutex<Gathered>,
    notifier: GatherNotifier,
    cancel: CancellationToken,
    order: OrderSpec,
}

impl WalkShared {
    fn push(&self, record: RawRecord) {
        let mut gathered = self.gathered.lock();
        gathered.records.push(record);
        gathered.sorted = false;
    }

    fn len(&self) -> usize {
        self.gathered.lock().records.len()
    }

    /// Reads the matches in plan order, sorting anything pushed since the
    /// last read. The sort is stable and mostly sees an ordered prefix.
    fn read_sorted<R>(&self, read: impl FnOnce(&[RawRecord]) -> R) -> R {
        let mut gathered = self.gathered.lock();
        if !gathered.sorted {
            gathered
                .records
                .sort_by(|left, right| self.order.compare(left, right));
            gathered.sorted = true;
        }
        read(&gathered.records)
    }
}

struct WalkQuery {
    roots: Vec<PathBuf>,
    predicate: Arc<Predicate>,
    include_hidden: bool,
    started: AtomicBool,
    start_error: Mutex<Option<String>>,
    shared: Arc<WalkShared>,
}

impl WalkQuery {
    fn refuse(&self, reason: String) -> bool {
        log::warn!("walk backend refused query: {reason}");
        *self.start_error.lock() = Some(reason);
        false
    }
}

impl MetadataQuery for WalkQuery {
    fn subscribe(&self, listener: GatherListener) -> SubscriptionId {
        self.shared.notifier.subscribe(listener)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.shared.notifier.unsubscribe(subscription);
    }

    fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.refuse("query was already started".to_string());
        }
        if let Some(missing) = self.roots.iter().find(|root| !root.is_dir()) {
            return self.refuse(format!(
                "search scope is not a directory: {}",
                missing.display()
            ));
        }

        let roots = self.roots.clone();
        let predicate = self.predicate.clone();
        let shared = self.shared.clone();
        let include_hidden = self.include_hidden;

        let spawned = thread::Builder::new()
            .name("mdsearch-walk".to_string())
            .spawn(move || {
                let started_at = Instant::now();
                match walk_roots(&roots, &predicate, &shared, include_hidden) {
                    Some(visited) => {
                        log::debug!(
                            "walk finished roots={} visited={} matched={} elapsed_ms={}",
                            roots.len(),
                            visited,
                            shared.len(),
                            started_at.elapsed().as_millis(),
                        );
                        shared.notifier.notify();
                    }
                    None => {
                        log::debug!(
                            "walk cancelled after {}ms",
                            started_at.elapsed().as_millis()
                        );
                    }
                }
            });

        match spawned {
            Ok(_) => true,
            Err(error) => self.refuse(format!("unable to spawn walker thread: {error}")),
        }
    }

    fn stop(&self) {
        self.shared.cancel.cancel();
    }

    fn result_count(&self) -> usize {
        self.shared.len()
    }

    fn result_at(&self, index: usize) -> Option<RawRecord> {
        self.shared
            .read_sorted(|records| records.get(index).cloned())
    }

    fn start_error(&self) -> Option<String> {
        self.start_error.lock().clone()
    }
}

/// Walks every root and records matches. Returns `None` if cancelled.
fn walk_roots(
    roots: &[PathBuf],
    predicate: &Predicate,
    shared: &WalkShared,
    include_hidden: bool,
) -> Option<usize> {
    let mut visited = 0usize;
    for root in roots {
        let walker = WalkBuilder::new(root)
            .hidden(!include_hidden)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .follow_links(false)
            .build();

        for entry in walker {
            visited += 1;
            shared.cancel.is_cancelled_sparse(visited)?;

            let Ok(entry) = entry else {
                continue;
            };
            // The scope root itself is not a result.
            if entry.depth() == 0 {
                continue;
            }
            let candidate = WalkCandidate::new(entry.path(), &shared.cancel);
            if predicate.matches(&candidate) {
                shared.push(RawRecord::capture(&candidate));
            }
        }
    }
    shared.cancel.is_cancelled()?;
    Some(visited)
}

/// A filesystem entry with lazily loaded metadata.
struct WalkCandidate<'a> {
    path: &'a Path,
    metadata: OnceCell<Option<Metadata>>,
    cancel: &'a CancellationToken,
}

impl<'a> WalkCandidate<'a> {
    fn new(path: &'a Path, cancel: &'a CancellationToken) -> Self {
        Self {
            path,
            metadata: OnceCell::new(),
            cancel,
        }
    }

    fn metadata(&self) -> Option<&Metadata> {
        self.metadata
            .get_or_init(|| fs::symlink_metadata(self.path).ok())
            .as_ref()
    }
}

impl AttributeSource for WalkCandidate<'_> {
    fn text(&self, attribute: Attribute) -> Option<Cow<'_, str>> {
        match attribute {
            Attribute::Path => Some(self.path.to_string_lossy()),
            Attribute::FileName | Attribute::DisplayName => {
                self.path.file_name().map(|name| name.to_string_lossy())
            }
            Attribute::Kind => {
                let file_type = self.metadata()?.file_type();
                let kind = if file_type.is_dir() {
                    "Folder"
                } else if file_type.is_symlink() {
                    "Alias"
                } else if file_type.is_file() {
                    "Document"
                } else {
                    "Other"
                };
                Some(Cow::Borrowed(kind))
            }
            _ => None,
        }
    }

    fn bytes(&self, attribute: Attribute) -> Option<u64> {
        match attribute {
            Attribute::Size => self
                .metadata()
                .filter(|metadata| metadata.is_file())
                .map(Metadata::len),
            _ => None,
        }
    }

    fn time(&self, attribute: Attribute) -> Option<DateTime<Utc>> {
        let metadata = self.metadata()?;
        let time = match attribute {
            Attribute::CreatedAt => metadata.created().ok()?,
            Attribute::ModifiedAt => metadata.modified().ok()?,
            _ => return None,
        };
        Some(DateTime::<Utc>::from(time))
    }

    fn contains_text(&self, attribute: Attribute, needle: &str) -> bool {
        if attribute == Attribute::TextContent {
            return file_content_matches(self.path, needle, self.cancel) == Some(true);
        }
        self.text(attribute)
            .map(|value| value.to_lowercase().contains(needle))
            .unwrap_or(false)
    }
}
