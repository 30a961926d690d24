//! Admin stage
//!
//! deadline extraction → calendar export → signature placeholder and packet
//! → notification → optional plain-text export.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::Stage;
use crate::llm::structured::parse_json_list;
use crate::llm::LLMProvider;
use crate::session::file_stem;
use crate::state::{ContractState, StageKind};
use crate::tools::export::{self, Deadline};
use crate::tools::{SignaturePlaceholder, Toolkit};

/// Fact keys tried, in order, for the signer's name
const SIGNER_KEYS: &[&str] = &["signer", "party_b", "client", "counterparty", "party_a"];
const DEFAULT_SIGNER: &str = "Counterparty";

const DEADLINE_PROMPT: &str = "List every dated obligation in the agreement. \
Output ONLY a JSON array of objects with \"date\" (YYYY-MM-DD) and \"description\". \
Output an empty array if there are none.";

pub struct AdminStage {
    llm: Arc<dyn LLMProvider>,
    tools: Toolkit,
}

impl AdminStage {
    pub fn new(llm: Arc<dyn LLMProvider>, tools: Toolkit) -> Self {
        Self { llm, tools }
    }

    /// Capability or parse failure yields no deadlines.
    async fn extract_deadlines(&self, state: &mut ContractState) -> Vec<Deadline> {
        let draft = state.draft_text().to_string();
        let deadlines = if draft.trim().is_empty() {
            Vec::new()
        } else {
            match self.llm.prompt(DEADLINE_PROMPT, &draft).await {
                Ok(raw) => parse_json_list::<Deadline>(&raw).unwrap_or_else(|e| {
                    warn!("Deadline extraction output unusable: {}", e);
                    Vec::new()
                }),
                Err(e) => {
                    warn!("Deadline extraction failed: {}", e);
                    Vec::new()
                }
            }
        };

        state.record_stage(
            StageKind::Admin,
            "deadline_extraction",
            json!({ "deadlines": deadlines, "count": deadlines.len() }),
        );
        deadlines
    }

    fn calendar(&self, state: &mut ContractState, deadlines: &[Deadline]) -> Result<()> {
        let path = self
            .tools
            .export_dir
            .join(format!("deadlines_{}.ics", file_stem(&state.session_id)));
        export::write_calendar(&path, deadlines)?;

        let events = deadlines
            .iter()
            .filter(|d| export::ics_date(&d.date).is_some())
            .count();
        info!(events, path = %path.display(), "Calendar exported");
        state.record_stage(
            StageKind::Admin,
            "calendar",
            json!({ "path": path.display().to_string(), "events": events }),
        );
        Ok(())
    }

    fn signer(state: &ContractState) -> String {
        SIGNER_KEYS
            .iter()
            .find_map(|key| {
                state
                    .extracted_facts
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
            })
            .unwrap_or(DEFAULT_SIGNER)
            .to_string()
    }

    fn signature(&self, state: &mut ContractState) -> Result<()> {
        let placeholder = SignaturePlaceholder::pending(Self::signer(state));

        let out_path = self.tools.export_dir.join(format!(
            "signature_{}.{}",
            file_stem(&state.session_id),
            self.tools.renderer.extension()
        ));
        let rendered = self
            .tools
            .renderer
            .render_signature_document(state.draft_text(), &placeholder, &out_path)
            .context("Signature document export failed")?;

        let value = serde_json::to_value(&placeholder)?;
        state.signatures = match &value {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        state.record_stage(
            StageKind::Admin,
            "signature",
            json!({ "path": rendered.display().to_string(), "signature": value }),
        );
        Ok(())
    }

    /// Logged only; nothing leaves the machine.
    fn notify(&self, state: &mut ContractState) {
        let signer = state
            .signatures
            .get("signer")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SIGNER)
            .to_string();
        let message = format!("Signature requested from {}", signer);
        info!(session_id = %state.session_id, "{}", message);
        state.record_stage(
            StageKind::Admin,
            "notification",
            json!({ "channel": "log", "message": message }),
        );
    }

    fn text_export(&self, state: &mut ContractState) -> Result<()> {
        let requested = state
            .latest_user_message()
            .map(export::wants_text_export)
            .unwrap_or(false);

        let payload = if requested {
            let path = export::write_text_export(&self.tools.export_dir, state.draft_text())?;
            json!({ "exported": true, "path": path.display().to_string() })
        } else {
            json!({ "exported": false })
        };
        state.record_stage(StageKind::Admin, "text_export", payload);
        Ok(())
    }
}

#[async_trait]
impl Stage for AdminStage {
    fn kind(&self) -> StageKind {
        StageKind::Admin
    }

    async fn run(&self, state: &mut ContractState) -> Result<()> {
        info!(session_id = %state.session_id, "Admin started");

        let deadlines = self.extract_deadlines(state).await;
        self.calendar(state, &deadlines)?;
        self.signature(state)?;
        self.notify(state);
        self.text_export(state)?;

        Ok(())
    }
}
