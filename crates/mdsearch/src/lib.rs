//! File-metadata search: query compilation and search orchestration.
//!
//! This crate provides:
//! - A composable filter model and the legacy single-criterion adapter
//! - Compilation of filters into a backend predicate plus search scopes
//! - Sort planning and result capping
//! - A single-flight orchestrator with timeout and partial results
//! - Metadata backends: in-memory, filesystem walk, and Spotlight on macOS

pub mod backend;
pub mod cancel;
pub mod config;
pub mod error;
pub mod query;
pub mod request;
pub mod search;
pub mod types;

// Re-export main types
pub use backend::{
    GatherBehavior, MemoryBackend, MemoryEntry, MetadataBackend, MetadataQuery, QueryPlan,
    RawRecord, WalkBackend,
};
pub use cancel::CancellationToken;
pub use config::SearchConfig;
pub use error::{Result, SearchError};
pub use query::{
    adapt, cap, compile, plan_order, CompiledQuery, FilterGroup, LegacyRequest, Predicate, Query,
    SearchFilter, SearchScope, SortSpec,
};
pub use request::{SearchCriteria, SearchRequest};
pub use search::{OrchestratorState, SearchOrchestrator, SearchOutcome};
pub use types::{ResultRecord, SearchResults};

#[cfg(target_os = "macos")]
pub use backend::SpotlightBackend;
