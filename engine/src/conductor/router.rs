//! Conductor Router
//!
//! Classifies a user turn into one of the task categories by asking the
//! completion capability with a fixed taxonomy prompt.

use anyhow::{Context, Result};
use sdk::TaskCategory;
use std::sync::Arc;
use tracing::debug;

use crate::llm::LLMProvider;

const TAXONOMY_PROMPT: &str = "Classify the user's request about a service agreement into \
exactly one category:\n\
- create: draft a new agreement\n\
- improve: revise or strengthen the existing draft\n\
- review: review the existing draft and report problems\n\
- admin: deadlines, calendar, signatures, notifications or exporting files\n\
- chat: anything else, including questions and small talk\n\n\
Reply with the single category word only.";

pub struct Router {
    llm: Arc<dyn LLMProvider>,
}

impl Router {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }

    /// Classify `input`. Output outside the taxonomy becomes `chat`;
    /// capability failures propagate.
    pub async fn classify(&self, input: &str) -> Result<TaskCategory> {
        let raw = self
            .llm
            .prompt(TAXONOMY_PROMPT, input)
            .await
            .context("Routing completion failed")?;

        let category = TaskCategory::normalize(&raw);
        debug!(raw = raw.trim(), %category, "Classified turn");
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::ScriptedLlm;

    #[tokio::test]
    async fn test_classify_normalizes() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok("  Review.\n"), Ok("negotiate")]));
        let router = Router::new(llm.clone());

        assert_eq!(router.classify("check my draft").await.unwrap(), TaskCategory::Review);
        assert_eq!(router.classify("haggle").await.unwrap(), TaskCategory::Chat);

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0][0].content.contains("admin"));
        assert_eq!(prompts[0][1].content, "check my draft");
    }

    #[tokio::test]
    async fn test_classify_propagates_failure() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err("connection refused")]));
        let router = Router::new(llm);

        let err = router.classify("draft an NDA").await.unwrap_err();
        assert!(format!("{:#}", err).contains("connection refused"));
    }
}
