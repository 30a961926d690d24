//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lexis_engine::conductor::{CheckpointStore, Orchestrator};
use lexis_engine::config::Config;
use lexis_engine::db::Database;
use lexis_engine::llm::{LLMError, LLMProvider, Message, Result};
use lexis_engine::tools::Toolkit;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Replies chosen by a substring of the system prompt; deterministic.
pub struct ScriptedProvider {
    rules: Vec<(String, std::result::Result<String, String>)>,
    default_reply: String,
    pub prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(default_reply: &str) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: default_reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply `reply` whenever the system prompt contains `needle`
    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), Ok(reply.to_string())));
        self
    }

    /// Fail whenever the system prompt contains `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.rules
            .push((needle.to_string(), Err(format!("scripted failure for {}", needle))));
        self
    }

    /// A provider wired for the whole pipeline, classifying every turn as `category`
    pub fn pipeline(category: &str) -> Self {
        Self::new(DRAFT_BODY)
            .on("Classify", category)
            .on("flat JSON object", r#"{"party_a": "Acme Corp", "party_b": "Beta LLC"}"#)
            .on("dated obligation", r#"[{"date": "2024-03-01", "description": "Delivery"}]"#)
            .on("gaps and risks", r#"[{"issue": "No termination clause", "severity": "high"}]"#)
            .on("validation results", "Looks fine.")
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m.first().map(|s| s.content.clone()))
            .collect()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        for (needle, reply) in &self.rules {
            if system.contains(needle.as_str()) {
                return reply.clone().map_err(LLMError::ProviderUnavailable);
            }
        }
        Ok(self.default_reply.clone())
    }
}

/// Agreement text that passes payment and IP checks
pub const DRAFT_BODY: &str = "1. Services. Beta LLC designs the Acme Corp website.\n\
2. Payment Terms. Invoices are payable net 30.\n\
3. Intellectual Property. All intellectual property vests in Acme Corp on payment.";

/// Orchestrator over real stages, memory and checkpoints rooted at `root`
pub async fn orchestrator(
    root: &Path,
    provider: Arc<ScriptedProvider>,
    configure: impl FnOnce(&mut Config),
) -> Orchestrator {
    let mut config = Config::rooted_at(root).unwrap();
    configure(&mut config);
    let db = Database::new(&config.memory_db_path()).await.unwrap();
    let tools = Toolkit::from_config(&config).unwrap();
    Orchestrator::new(
        provider,
        tools,
        Some(db.memory()),
        CheckpointStore::new(config.checkpoint_dir()),
        &config,
    )
    .unwrap()
}
