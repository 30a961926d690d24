//! Conductor System
//!
//! Routes a turn, dispatches stages, persists checkpoints and summarizes.

pub mod checkpoint;
pub mod orchestrator;
pub mod router;
pub mod summary;

pub use checkpoint::CheckpointStore;
pub use orchestrator::{dispatch_table, Orchestrator, TurnOutcome};
pub use router::Router;
pub use summary::TurnSummary;
