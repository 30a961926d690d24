//! Lexis SDK
//!
//! Shared library providing the error type and the task category taxonomy.
//! This crate is used by the engine and by any front end that talks to it.

/// Error types and handling
pub mod errors;

/// Task category taxonomy
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, LexisErrorExt};
pub use types::TaskCategory;
