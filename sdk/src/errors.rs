//! Error types and handling
//!
//! This module provides the error types used throughout the Lexis engine.
//! All errors implement the `LexisErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Safety of messages
//!
//! Hints are static strings. They never echo draft text, prompts, or API keys,
//! so they are safe to print next to a half-finished contract.

use thiserror::Error;

/// Trait for Lexis error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait LexisErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried by submitting the turn again.
    /// Non-recoverable errors require a configuration change first.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: Memory store (SQLite) failures
/// - **LLM Provider**: Completion capability failures
/// - **Routing**: Category missing or outside the taxonomy
/// - **Stage**: A pipeline stage aborted the turn
/// - **Checkpoint**: Checkpoint write failures (reads never surface)
/// - **Export**: Calendar, text or signature document export failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, LexisErrorExt};
///
/// let error = EngineError::UnknownCategory("negotiate".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::NoProviderConfigured;
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("No LLM provider configured")]
    NoProviderConfigured,

    // Routing errors
    #[error("Task category not set for this turn")]
    CategoryNotSet,

    #[error("Unknown task category: {0}")]
    UnknownCategory(String),

    // Pipeline errors
    #[error("Stage {stage} failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("Stage not registered: {0}")]
    StageNotRegistered(String),

    // Persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Export error: {0}")]
    Export(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LexisErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::PathCanonicalization(_, _) => "Invalid path specified in configuration",

            // Database errors
            Self::Database(_) => "Conversation memory is unavailable. Check the data directory",

            // LLM provider errors
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",
            Self::NoProviderConfigured => "Set llm.default_provider to ollama or openai",

            // Routing errors
            Self::CategoryNotSet => "The request was not classified. Try rephrasing it",
            Self::UnknownCategory(_) => "Use one of: create, improve, review, admin, chat",

            // Pipeline errors
            Self::StageFailed { .. } => "A pipeline stage failed. The draft was not saved",
            Self::StageNotRegistered(_) => "The pipeline is missing a stage. Reinstall Lexis",

            // Persistence errors
            Self::Checkpoint(_) => "Could not save the session. Check disk space and permissions",
            Self::Export(_) => "Could not write the export file. Check the export directory",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::PathCanonicalization(_, _)
            | Self::NoProviderConfigured
            | Self::StageNotRegistered(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
