//! Turn summary
//!
//! Human-readable digest of a completed pipeline turn, built from the
//! validation report plus a short feedback note from the completion
//! capability. The feedback call is best-effort.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::warn;

use crate::llm::LLMProvider;
use crate::state::ContractState;

const FEEDBACK_PROMPT: &str = "You review validation results for a freelancer's service \
agreement. In at most three short sentences, tell the freelancer what to fix first. \
Be concrete and do not repeat the raw report.";

#[derive(Debug, Clone, Serialize)]
pub struct TurnSummary {
    pub session_id: String,
    pub category: String,
    pub stages: Vec<String>,
    pub version: Option<u32>,
    pub validation: Map<String, Value>,
    pub feedback: Option<String>,
    /// Why feedback is missing, when the synthesis call failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_error: Option<String>,
}

impl TurnSummary {
    pub fn from_state(state: &ContractState, stages: Vec<String>) -> Self {
        Self {
            session_id: state.session_id.clone(),
            category: state
                .task_category
                .map(|c| c.to_string())
                .unwrap_or_default(),
            stages,
            version: state.last_version().map(|v| v.version_number),
            validation: state.validation_report.clone(),
            feedback: None,
            feedback_error: None,
        }
    }

    /// Ask for a short feedback note; failures are recorded, never returned.
    pub async fn synthesize_feedback(&mut self, llm: &Arc<dyn LLMProvider>) {
        let report = match serde_json::to_string_pretty(&self.validation) {
            Ok(report) => report,
            Err(e) => {
                self.feedback_error = Some(e.to_string());
                return;
            }
        };

        match llm.prompt(FEEDBACK_PROMPT, &report).await {
            Ok(text) if !text.trim().is_empty() => self.feedback = Some(text.trim().to_string()),
            Ok(_) => self.feedback_error = Some("empty response".to_string()),
            Err(e) => {
                warn!("Feedback synthesis failed: {}", e);
                self.feedback_error = Some(e.to_string());
            }
        }
    }

    /// Verdict checks that did not pass, in report order
    pub fn issues(&self) -> Vec<(&str, &str)> {
        self.validation
            .iter()
            .filter(|(key, _)| !key.ends_with("_details"))
            .filter_map(|(key, value)| match value.as_str() {
                Some(verdict) if verdict != "pass" => Some((key.as_str(), verdict)),
                _ => None,
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Session:  {}", self.session_id);
        let _ = writeln!(out, "Category: {}", self.category);
        let _ = writeln!(out, "Stages:   {}", self.stages.join(" -> "));
        if let Some(version) = self.version {
            let _ = writeln!(out, "Version:  v{}", version);
        }

        out.push_str("\nValidation:\n");
        for (key, value) in &self.validation {
            if key.ends_with("_details") {
                continue;
            }
            let verdict = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let details = self
                .validation
                .get(&format!("{}_details", key))
                .and_then(Value::as_str)
                .unwrap_or("");
            let _ = writeln!(out, "  {:<18} {:<8} {}", key, verdict, details);
        }

        match (&self.feedback, &self.feedback_error) {
            (Some(feedback), _) => {
                let _ = write!(out, "\nFeedback:\n  {}\n", feedback);
            }
            (None, Some(err)) => {
                let _ = write!(out, "\nFeedback unavailable: {}\n", err);
            }
            (None, None) => {}
        }
        out
    }
}
