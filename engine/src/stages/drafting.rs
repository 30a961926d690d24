//! Drafting stage
//!
//! template retrieval → generation (plus gap analysis for reviews) →
//! consistency check → assembly → redline → version audit.

use anyhow::Result;
use async_trait::async_trait;
use sdk::types::TaskCategory;
use serde_json::{json, Value};
use similar::{ChangeTag, TextDiff};
use std::sync::Arc;
use tracing::{info, warn};

use super::{complete, facts_block, templates_block, PlaceholderScanner, Stage};
use crate::llm::structured::parse_json_array;
use crate::llm::LLMProvider;
use crate::state::{ContractState, StageKind, VersionType};
use crate::tools::Toolkit;

const HEADER: &str = "CONTRACT DRAFT\n==============";
const FOOTER: &str = "---\nEnd of draft. Review with qualified counsel before signing.";

/// Changed lines kept in a redline event
const MAX_REDLINE_LINES: usize = 40;

const DRAFT_PROMPT: &str = "You are an experienced contract drafter. Write the complete agreement \
described by the brief as plain text with numbered sections. \
Use real values, not placeholders, unless truly missing. \
Where a value is truly missing, use a bracketed placeholder such as [Client Name]. \
Do not add commentary before or after the agreement.";

const GAP_PROMPT: &str = "You are reviewing a contract for gaps and risks. \
Output ONLY a JSON array. Each element must have \"issue\", \"severity\" (low, medium or high) \
and \"recommendation\". Output an empty array if there are no gaps.";

/// Remove any number of nested header/footer envelopes.
pub fn strip_envelope(text: &str) -> &str {
    let mut body = text.trim();
    while let Some(inner) = body
        .strip_prefix(HEADER)
        .and_then(|rest| rest.strip_suffix(FOOTER))
    {
        body = inner.trim();
    }
    body
}

/// Wrap `body` in exactly one header/footer envelope.
pub fn assemble(body: &str) -> String {
    format!("{}\n\n{}\n\n{}", HEADER, strip_envelope(body), FOOTER)
}

pub struct DraftingStage {
    llm: Arc<dyn LLMProvider>,
    tools: Toolkit,
    placeholders: PlaceholderScanner,
}

impl DraftingStage {
    pub fn new(llm: Arc<dyn LLMProvider>, tools: Toolkit) -> Result<Self> {
        Ok(Self {
            llm,
            tools,
            placeholders: PlaceholderScanner::new()?,
        })
    }

    fn retrieve_templates(&self, state: &mut ContractState, request: &str) -> Vec<String> {
        let templates = self.tools.search_templates(request);
        state.record_stage(
            StageKind::Drafting,
            "template_retrieval",
            json!({ "count": templates.len() }),
        );
        templates
    }

    fn generation_prompt(&self, state: &ContractState, request: &str, templates: &[String]) -> String {
        let mut prompt = format!(
            "Request:\n{}\n\nResearch brief:\n{}\n\nFacts:\n{}\n\nReference clauses:\n{}",
            request,
            state.research_brief().unwrap_or("(none)"),
            facts_block(state),
            templates_block(templates),
        );

        if let Some(structure) = &state.contract_structure {
            prompt.push_str(&format!("\n\nFollow this structure:\n{}", structure));
        }
        if let Some(market) = &state.market_terms {
            prompt.push_str(&format!("\n\nMarket terms:\n{}", market));
        }
        if let Some(current) = state.draft_content.as_deref().filter(|d| !d.trim().is_empty()) {
            prompt.push_str(&format!(
                "\n\nCurrent draft (revise it rather than starting over):\n{}",
                strip_envelope(current)
            ));
        }
        if let Some(feedback) = &state.human_feedback {
            prompt.push_str(&format!("\n\nReviewer feedback to address:\n{}", feedback));
        }

        prompt
    }

    async fn generate(
        &self,
        state: &mut ContractState,
        request: &str,
        templates: &[String],
    ) -> Result<()> {
        let prompt = self.generation_prompt(state, request, templates);
        let output = complete(
            &self.llm,
            StageKind::Drafting,
            "generation",
            DRAFT_PROMPT,
            &prompt,
        )
        .await?;

        let body = strip_envelope(&output).to_string();
        let category = state.task_category.map(|c| c.as_str()).unwrap_or("create");
        state.record_stage(
            StageKind::Drafting,
            "generation",
            json!({ "chars": body.len(), "category": category }),
        );
        state.draft_content = Some(body);
        Ok(())
    }

    /// Review turns only; failure leaves an empty gap list.
    async fn gap_analysis(&self, state: &mut ContractState) {
        let draft = state.draft_text().to_string();
        let (gaps, available) = match self.llm.prompt(GAP_PROMPT, &draft).await {
            Ok(raw) => match parse_json_array(&raw) {
                Ok(items) => (items, true),
                Err(e) => {
                    warn!("Gap analysis output unusable: {}", e);
                    (Vec::new(), false)
                }
            },
            Err(e) => {
                warn!("Gap analysis failed: {}", e);
                (Vec::new(), false)
            }
        };

        state.record_stage(
            StageKind::Drafting,
            "gap_analysis",
            json!({ "gaps": gaps, "available": available }),
        );
    }

    fn consistency_check(&self, state: &mut ContractState) {
        let draft = state.draft_text();
        let count = self.placeholders.count(draft);
        let distinct: Vec<String> = self.placeholders.distinct(draft).into_iter().take(20).collect();
        if count > 0 {
            info!(count, "Draft has unresolved placeholders");
        }
        state.record_stage(
            StageKind::Drafting,
            "consistency",
            json!({ "unresolved_placeholders": count, "placeholders": distinct }),
        );
    }

    fn assembly(&self, state: &mut ContractState) {
        let assembled = assemble(state.draft_text());
        state.record_stage(
            StageKind::Drafting,
            "assembly",
            json!({ "chars": assembled.len() }),
        );
        state.draft_content = Some(assembled);
    }

    fn redline(&self, state: &mut ContractState) {
        let current = state.draft_text();
        let payload = match state.last_version() {
            None => json!({ "against_version": Value::Null, "summary": "Initial version" }),
            Some(previous) => {
                let diff = TextDiff::from_lines(previous.content.as_str(), current);
                let mut added = 0usize;
                let mut removed = 0usize;
                let mut changes: Vec<String> = Vec::new();

                for change in diff.iter_all_changes() {
                    let sign = match change.tag() {
                        ChangeTag::Insert => {
                            added += 1;
                            "+"
                        }
                        ChangeTag::Delete => {
                            removed += 1;
                            "-"
                        }
                        ChangeTag::Equal => continue,
                    };
                    if changes.len() < MAX_REDLINE_LINES {
                        changes.push(format!("{} {}", sign, change.value().trim_end()));
                    }
                }

                json!({
                    "against_version": previous.version_number,
                    "added": added,
                    "removed": removed,
                    "changes": changes,
                    "summary": format!("{} lines added, {} removed since v{}", added, removed, previous.version_number),
                })
            }
        };
        state.record_stage(StageKind::Drafting, "redline", payload);
    }

    fn version_audit(&self, state: &mut ContractState) {
        let content = state.draft_text().to_string();
        let version = state.append_version(content, VersionType::Draft).version_number;
        info!(session_id = %state.session_id, version, "Draft version recorded");
        state.record_stage(StageKind::Drafting, "version_audit", json!({ "version": version }));
    }
}

#[async_trait]
impl Stage for DraftingStage {
    fn kind(&self) -> StageKind {
        StageKind::Drafting
    }

    async fn run(&self, state: &mut ContractState) -> Result<()> {
        let request = state.latest_user_message().unwrap_or_default().to_string();
        info!(session_id = %state.session_id, "Drafting started");

        let templates = self.retrieve_templates(state, &request);
        self.generate(state, &request, &templates).await?;
        if state.task_category == Some(TaskCategory::Review) {
            self.gap_analysis(state).await;
        }
        self.consistency_check(state);
        self.assembly(state);
        self.redline(state);
        self.version_audit(state);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{steps, toolkit, ScriptedLlm};
    use proptest::prelude::*;

    fn stage(replies: Vec<Result<&str, &str>>) -> (Arc<ScriptedLlm>, DraftingStage) {
        let llm = Arc::new(ScriptedLlm::new(replies));
        let stage = DraftingStage::new(llm.clone(), toolkit(&std::env::temp_dir())).unwrap();
        (llm, stage)
    }

    #[tokio::test]
    async fn test_create_produces_wrapped_first_version() {
        let (_, stage) = stage(vec![Ok("1. Parties. Acme and [Designer Name].")]);
        let mut state = ContractState::new("s1");
        state.push_user("Create a design contract");
        state.task_category = Some(TaskCategory::Create);

        stage.run(&mut state).await.unwrap();

        assert_eq!(
            steps(&state, StageKind::Drafting),
            vec![
                "template_retrieval",
                "generation",
                "consistency",
                "assembly",
                "redline",
                "version_audit"
            ]
        );
        let draft = state.draft_text();
        assert!(draft.starts_with(HEADER));
        assert!(draft.ends_with(FOOTER));
        assert_eq!(state.versions.len(), 1);
        assert_eq!(state.versions[0].content, draft);

        let consistency = state.latest_stage_event(StageKind::Drafting, "consistency").unwrap();
        assert_eq!(consistency.payload["unresolved_placeholders"], 1);
        let redline = state.latest_stage_event(StageKind::Drafting, "redline").unwrap();
        assert!(redline.payload["against_version"].is_null());
    }

    #[tokio::test]
    async fn test_improve_redlines_against_previous_version() {
        let (llm, stage) = stage(vec![Ok("1. Term. 12 months."), Ok("1. Term. 24 months.")]);
        let mut state = ContractState::new("s1");
        state.push_user("Create a contract");
        state.task_category = Some(TaskCategory::Create);
        stage.run(&mut state).await.unwrap();

        state.push_user("Improve: make the term 24 months");
        state.task_category = Some(TaskCategory::Improve);
        stage.run(&mut state).await.unwrap();

        assert_eq!(state.versions.len(), 2);
        assert_eq!(state.versions[1].version_number, 2);
        let redline = state.latest_stage_event(StageKind::Drafting, "redline").unwrap();
        assert_eq!(redline.payload["against_version"], 1);
        assert_eq!(redline.payload["added"], 1);
        assert_eq!(redline.payload["removed"], 1);

        // Second prompt carries the unwrapped current draft
        let prompts = llm.prompts.lock().unwrap();
        let second = &prompts[1][1].content;
        assert!(second.contains("1. Term. 12 months."));
        assert!(!second.contains(HEADER));
    }

    #[tokio::test]
    async fn test_review_runs_gap_analysis() {
        let (_, stage) = stage(vec![
            Ok("1. Scope. Services."),
            Ok(r#"[{"issue": "No payment clause", "severity": "high", "recommendation": "Add one"}]"#),
        ]);
        let mut state = ContractState::new("s1");
        state.push_user("Review my contract");
        state.task_category = Some(TaskCategory::Review);

        stage.run(&mut state).await.unwrap();

        let gaps = state.latest_stage_event(StageKind::Drafting, "gap_analysis").unwrap();
        assert_eq!(gaps.payload["gaps"][0]["severity"], "high");
        assert_eq!(gaps.payload["available"], true);
    }

    #[tokio::test]
    async fn test_gap_analysis_degrades() {
        let (_, stage) = stage(vec![Ok("1. Scope."), Err("timeout")]);
        let mut state = ContractState::new("s1");
        state.push_user("Review my contract");
        state.task_category = Some(TaskCategory::Review);

        stage.run(&mut state).await.unwrap();

        let gaps = state.latest_stage_event(StageKind::Drafting, "gap_analysis").unwrap();
        assert_eq!(gaps.payload["available"], false);
        assert_eq!(state.versions.len(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_aborts_before_versioning() {
        let (_, stage) = stage(vec![Err("offline")]);
        let mut state = ContractState::new("s1");
        state.push_user("Create a contract");

        assert!(stage.run(&mut state).await.is_err());
        assert!(state.versions.is_empty());
        assert!(state.draft_content.is_none());
    }

    #[test]
    fn test_model_echoing_envelope_is_not_nested() {
        let once = assemble("Body text");
        let echoed = format!("Here it is:\n{}", once);
        assert_eq!(assemble(&once), once);
        assert_eq!(strip_envelope(&once), "Body text");
        // Only a full envelope is stripped
        assert!(assemble(&echoed).contains("Here it is:"));
    }

    proptest! {
        #[test]
        fn prop_assembly_is_idempotent(body in "[A-Za-z0-9 .,\n]{0,200}") {
            let once = assemble(&body);
            prop_assert_eq!(assemble(&once), once.clone());
            prop_assert_eq!(once.matches("CONTRACT DRAFT").count(), 1);
        }
    }
}
