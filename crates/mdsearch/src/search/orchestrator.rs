//! Runs one search at a time against a metadata backend.
//!
//! The backend's one-shot "gathering finished" callback is bridged into a
//! oneshot channel and raced against the request timeout. Whichever side
//! wins, the backend handle is torn down (unsubscribe + stop) exactly once,
//! including when the caller drops the search future mid-flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::extract::extract_records;
use crate::backend::{MetadataBackend, MetadataQuery, QueryPlan, SubscriptionId};
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::query::{compile, plan_order, SearchScope};
use crate::request::SearchRequest;
use crate::types::SearchResults;

/// Deadline used when `started_at + timeout` is not representable.
const UNBOUNDED_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Running,
}

/// How the most recent request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Completed,
    /// The timeout fired first; results were partial.
    TimedOut,
    Failed,
    /// Another search was running.
    Rejected,
}

#[derive(Debug, Default)]
struct Slot {
    running: bool,
    last_outcome: Option<SearchOutcome>,
}

pub struct SearchOrchestrator {
    backend: Arc<dyn MetadataBackend>,
    config: SearchConfig,
    slot: Mutex<Slot>,
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("config", &self.config)
            .field("slot", &*self.slot.lock())
            .finish()
    }
}

impl SearchOrchestrator {
    pub fn new(backend: Arc<dyn MetadataBackend>) -> Self {
        Self::with_config(backend, SearchConfig::default())
    }

    pub fn with_config(backend: Arc<dyn MetadataBackend>, config: SearchConfig) -> Self {
        Self {
            backend,
            config,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        if self.slot.lock().running {
            OrchestratorState::Running
        } else {
            OrchestratorState::Idle
        }
    }

    pub fn last_outcome(&self) -> Option<SearchOutcome> {
        self.slot.lock().last_outcome
    }

    /// Runs `request` to completion or timeout.
    ///
    /// A timeout is not an error: the records gathered so far come back with
    /// `partial` set. A call made while another search is running fails
    /// with [`SearchError::RejectedConcurrent`] without touching the backend.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResults> {
        let mut slot = self.acquire_slot()?;
        let (result, outcome) = self.run(request).await;
        slot.outcome = Some(outcome);
        result
    }

    fn acquire_slot(&self) -> Result<SlotGuard<'_>> {
        let mut slot = self.slot.lock();
        if slot.running {
            slot.last_outcome = Some(SearchOutcome::Rejected);
            log::warn!("search rejected: another search is in progress");
            return Err(SearchError::RejectedConcurrent);
        }
        slot.running = true;
        Ok(SlotGuard {
            slot: &self.slot,
            outcome: None,
        })
    }

    async fn run(&self, request: SearchRequest) -> (Result<SearchResults>, SearchOutcome) {
        let started_at = Instant::now();
        let limit = self.config.effective_limit(request.limit);
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.config.default_timeout());

        let compiled = compile(&request.criteria.to_query());
        let scopes = if compiled.uses_default_scope() && !self.config.default_scopes.is_empty() {
            self.config
                .default_scopes
                .iter()
                .cloned()
                .map(SearchScope::Directory)
                .collect()
        } else {
            compiled.scopes
        };
        let plan = QueryPlan {
            predicate: compiled.predicate,
            scopes,
            order: plan_order(request.sort),
        };
        log::info!(
            "search submitted scopes={} limit={} timeout_ms={}",
            plan.scopes.len(),
            limit,
            timeout.as_millis(),
        );
        log::debug!(
            "search predicate={} scopes={:?} order={:?}",
            plan.predicate,
            plan.scopes,
            plan.order,
        );

        let query = match self.backend.open(plan) {
            Ok(query) => query,
            Err(error) => {
                log::warn!("search backend failed to open query: {error}");
                return (Err(error), SearchOutcome::Failed);
            }
        };

        // Once the race is decided the receiver is gone and a late send is a no-op.
        let (gathered_tx, gathered_rx) = oneshot::channel::<()>();
        let subscription = query.subscribe(Box::new(move || {
            let _ = gathered_tx.send(());
        }));
        let teardown = Teardown::new(query.clone(), subscription);

        if !query.start() {
            let detail = query
                .start_error()
                .unwrap_or_else(|| "backend did not start the query".to_string());
            teardown.run();
            log::warn!("search backend refused to start: {detail}");
            return (
                Err(SearchError::BackendStartFailure(detail)),
                SearchOutcome::Failed,
            );
        }

        let deadline = started_at
            .checked_add(timeout)
            .unwrap_or_else(|| started_at + UNBOUNDED_WAIT);
        let completed = tokio::select! {
            gathered = gathered_rx => match gathered {
                Ok(()) => true,
                // Listener dropped without firing; only the timeout can end this.
                Err(_) => {
                    tokio::time::sleep_until(deadline).await;
                    false
                }
            },
            _ = tokio::time::sleep_until(deadline) => false,
        };

        let (records, outcome) = if completed {
            teardown.run();
            (extract_records(query.as_ref(), limit), SearchOutcome::Completed)
        } else {
            let records = extract_records(query.as_ref(), limit);
            teardown.run();
            (records, SearchOutcome::TimedOut)
        };

        let partial = outcome == SearchOutcome::TimedOut;
        if partial {
            log::info!(
                "search timed out returned={} elapsed_ms={}",
                records.len(),
                started_at.elapsed().as_millis(),
            );
        } else {
            log::info!(
                "search completed returned={} elapsed_ms={}",
                records.len(),
                started_at.elapsed().as_millis(),
            );
        }

        (Ok(SearchResults { records, partial }), outcome)
    }
}

/// Frees the single-flight slot, including when the search future is dropped.
struct SlotGuard<'a> {
    slot: &'a Mutex<Slot>,
    outcome: Option<SearchOutcome>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        slot.running = false;
        if let Some(outcome) = self.outcome {
            slot.last_outcome = Some(outcome);
        }
    }
}

/// Unsubscribes and stops a backend query exactly once.
struct Teardown {
    query: Arc<dyn MetadataQuery>,
    subscription: SubscriptionId,
    done: AtomicBool,
}

impl Teardown {
    fn new(query: Arc<dyn MetadataQuery>, subscription: SubscriptionId) -> Self {
        Self {
            query,
            subscription,
            done: AtomicBool::new(false),
        }
    }

    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.query.unsubscribe(self.subscription);
        self.query.stop();
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.run();
    }
}
