//! Lexis Engine Library
//!
//! This library provides the core functionality of the Lexis pipeline.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// LLM provider abstraction layer
pub mod llm;

/// Contract state threaded through a turn
pub mod state;

/// Stage supervisors
pub mod stages;

/// Conductor orchestration module
pub mod conductor;

/// Non-LLM capabilities: templates, PII, rendering, exports
pub mod tools;

/// Session ids and slash commands
pub mod session;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
