//! Core services.
//!
//! Services hold the request-level logic and depend only on ports, never on
//! concrete adapters.

pub mod cleanup;
pub mod orchestrator;

pub use cleanup::{
    CleanupConfig, CleanupJob, CleanupOutcome, CleanupPolicy, CleanupPool, run_cleanup,
};
pub use orchestrator::{AttemptError, ChatError, ChatOrchestrator, Completion};
