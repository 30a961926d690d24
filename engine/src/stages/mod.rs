//! Stage supervisors
//!
//! Each stage runs a fixed, ordered list of steps against the contract state.
//! A step reads what it needs, optionally calls a capability, mutates the
//! state and appends exactly one stage event. Steps run strictly in sequence.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::llm::LLMProvider;
use crate::state::{ContractState, StageKind};

pub mod admin;
pub mod chat;
pub mod drafting;
pub mod negotiation;
pub mod research;
pub mod validator;

pub use admin::AdminStage;
pub use chat::Conversation;
pub use drafting::DraftingStage;
pub use negotiation::NegotiationStage;
pub use research::ResearchStage;
pub use validator::Validator;

/// One supervisor in the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Run every step in order. An error aborts the turn.
    async fn run(&self, state: &mut ContractState) -> Result<()>;
}

/// Single completion call with stage/step context attached to the error
pub(crate) async fn complete(
    llm: &Arc<dyn LLMProvider>,
    stage: StageKind,
    step: &str,
    system: &str,
    user: &str,
) -> Result<String> {
    debug!(%stage, step, prompt_chars = user.len(), "Calling completion capability");
    llm.prompt(system, user)
        .await
        .with_context(|| format!("{}/{} completion failed", stage, step))
}

/// Counts unresolved placeholders: `[Party Name]`, `TBD`, `{{field}}`
pub struct PlaceholderScanner {
    pattern: Regex,
}

impl PlaceholderScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"\[[^\[\]\n]{1,80}\]|\bTBD\b|\{\{[^{}\n]*\}\}")?,
        })
    }

    pub fn count(&self, text: &str) -> usize {
        self.pattern.find_iter(text).count()
    }

    /// Distinct placeholders in order of first appearance
    pub fn distinct(&self, text: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for m in self.pattern.find_iter(text) {
            if !seen.iter().any(|s| s == m.as_str()) {
                seen.push(m.as_str().to_string());
            }
        }
        seen
    }
}

/// Pretty JSON of the extracted facts for prompt context
pub(crate) fn facts_block(state: &ContractState) -> String {
    if state.extracted_facts.is_empty() {
        return "(none)".to_string();
    }
    serde_json::to_string_pretty(&state.extracted_facts).unwrap_or_else(|_| "(none)".to_string())
}

/// Numbered list of reference clauses for prompt context
pub(crate) fn templates_block(templates: &[String]) -> String {
    if templates.is_empty() {
        return "(no reference clauses available)".to_string();
    }
    templates
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[{}] {}", i + 1, t.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared doubles for stage unit tests

    use crate::llm::{LLMError, LLMProvider, Message};
    use crate::state::{ContractState, Event, StageKind};
    use crate::tools::{Clause, ClauseLibrary, RegexPiiDetector, SignaturePacketRenderer, Toolkit};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Toolkit with a single payment clause and the default detectors
    pub fn toolkit(export_dir: &Path) -> Toolkit {
        Toolkit {
            templates: Arc::new(ClauseLibrary::from_clauses(vec![Clause {
                source: "payment.txt".into(),
                text: "Payment Terms: invoices are payable net 30.".into(),
            }])),
            pii: Arc::new(RegexPiiDetector::new().unwrap()),
            renderer: Arc::new(SignaturePacketRenderer),
            export_dir: export_dir.to_path_buf(),
            search_k: 3,
        }
    }

    /// Step names recorded by `stage`, in order
    pub fn steps(state: &ContractState, stage: StageKind) -> Vec<String> {
        state
            .messages
            .iter()
            .filter_map(|e| match e {
                Event::Stage(s) if s.stage == stage => Some(s.step.clone()),
                _ => None,
            })
            .collect()
    }

    /// Replays canned replies in order and records every prompt
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub prompts: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedLlm {
        pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompt_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(&self, messages: &[Message]) -> crate::llm::Result<String> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(LLMError::ProviderUnavailable(e)),
                None => Ok("ok".to_string()),
            }
        }
    }
}
