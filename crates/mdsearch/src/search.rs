//! Single-flight search orchestration and result extraction.

mod extract;
mod orchestrator;

pub use extract::{extract_records, to_result_record};
pub use orchestrator::{OrchestratorState, SearchOrchestrator, SearchOutcome};
