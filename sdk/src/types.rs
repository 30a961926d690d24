//! Task category taxonomy
//!
//! The closed set of categories a user turn can be routed to. This is the
//! stable contract between the router and the orchestrator: nothing outside
//! this set is ever dispatched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// Classification of user intent for one turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    /// Draft a new agreement
    Create,

    /// Revise the current draft
    Improve,

    /// Review the current draft and report gaps
    Review,

    /// Deadlines, signatures and exports
    Admin,

    /// Conversational turn, bypasses the pipeline
    Chat,
}

impl TaskCategory {
    /// Every category, in taxonomy order
    pub const ALL: [TaskCategory; 5] = [
        TaskCategory::Create,
        TaskCategory::Improve,
        TaskCategory::Review,
        TaskCategory::Admin,
        TaskCategory::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Create => "create",
            TaskCategory::Improve => "improve",
            TaskCategory::Review => "review",
            TaskCategory::Admin => "admin",
            TaskCategory::Chat => "chat",
        }
    }

    /// Whether this category bypasses stage dispatch entirely
    pub fn is_conversational(&self) -> bool {
        matches!(self, TaskCategory::Chat)
    }

    /// Normalize free-form classifier output into a category.
    ///
    /// Trims, lower-cases, strips quotes and trailing punctuation and keeps the
    /// first word. Anything outside the taxonomy becomes `Chat`.
    pub fn normalize(raw: &str) -> TaskCategory {
        let lowered = raw.trim().to_lowercase();
        let first = lowered
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches(|c: char| !c.is_alphanumeric());

        first.parse().unwrap_or(TaskCategory::Chat)
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(TaskCategory::Create),
            "improve" => Ok(TaskCategory::Improve),
            "review" => Ok(TaskCategory::Review),
            "admin" => Ok(TaskCategory::Admin),
            "chat" => Ok(TaskCategory::Chat),
            other => Err(EngineError::UnknownCategory(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_exact() {
        for category in TaskCategory::ALL {
            assert_eq!(TaskCategory::normalize(category.as_str()), category);
        }
    }

    #[test]
    fn test_normalize_noisy_output() {
        assert_eq!(TaskCategory::normalize("  Create\n"), TaskCategory::Create);
        assert_eq!(TaskCategory::normalize("\"review\"."), TaskCategory::Review);
        assert_eq!(
            TaskCategory::normalize("ADMIN - deadlines requested"),
            TaskCategory::Admin
        );
    }

    #[test]
    fn test_normalize_outside_taxonomy_is_chat() {
        assert_eq!(TaskCategory::normalize("negotiate"), TaskCategory::Chat);
        assert_eq!(TaskCategory::normalize(""), TaskCategory::Chat);
        assert_eq!(TaskCategory::normalize("I think create"), TaskCategory::Chat);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "draft".parse::<TaskCategory>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownCategory(ref s) if s == "draft"));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&TaskCategory::Improve).unwrap();
        assert_eq!(json, "\"improve\"");
        let back: TaskCategory = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(back, TaskCategory::Admin);
    }
}
