//! Negotiation stage
//!
//! change extraction → impact analysis → counterproposal → version audit →
//! policy gate.
//!
//! The change request is the session's first user message, not the latest
//! one: negotiation reworks the deal as originally requested.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::drafting::{assemble, strip_envelope};
use super::{complete, PlaceholderScanner, Stage};
use crate::llm::structured::parse_json_array;
use crate::llm::LLMProvider;
use crate::state::{ContractState, StageKind, VersionType};

/// Version content when negotiation runs before anything was drafted
const EMPTY_NEGOTIATION_CONTENT: &str = "Negotiated content placeholder";

/// Terms the gate refuses to let through
const POLICY_BLOCKLIST: &[&str] = &[
    "unlimited liability",
    "waives all rights",
    "irrevocable waiver",
    "perpetual exclusivity",
    "without any compensation",
];

const CHANGE_PROMPT: &str = "List the specific changes the counterparty is asking for. \
Output ONLY a JSON array of short strings, one change per element.";

const IMPACT_PROMPT: &str = "You advise a freelancer. For each requested change, explain its \
commercial and legal impact on the freelancer in one or two sentences, then give an overall \
recommendation: accept, counter or reject.";

const COUNTER_PROMPT: &str = "You are negotiating on behalf of the freelancer. Rewrite the \
agreement as a counterproposal that addresses the requested changes according to the impact \
analysis. Output the complete revised agreement as plain text with numbered sections and \
no commentary.";

pub struct NegotiationStage {
    llm: Arc<dyn LLMProvider>,
    placeholders: PlaceholderScanner,
}

impl NegotiationStage {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Result<Self> {
        Ok(Self {
            llm,
            placeholders: PlaceholderScanner::new()?,
        })
    }

    /// Unparseable output falls back to the raw request as the single change.
    async fn extract_changes(
        &self,
        state: &mut ContractState,
        request: &str,
    ) -> Result<Vec<String>> {
        let raw = complete(
            &self.llm,
            StageKind::Negotiation,
            "change_extraction",
            CHANGE_PROMPT,
            request,
        )
        .await?;

        let changes: Vec<String> = match parse_json_array(&raw) {
            Ok(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.trim().is_empty())
                .collect(),
            Err(e) => {
                warn!("Change extraction unusable, using the request verbatim: {}", e);
                Vec::new()
            }
        };

        let changes = if changes.is_empty() {
            vec![request.to_string()]
        } else {
            changes
        };

        state.record_stage(
            StageKind::Negotiation,
            "change_extraction",
            json!({ "changes": changes, "source": "first_user_message" }),
        );
        Ok(changes)
    }

    async fn analyze_impact(
        &self,
        state: &mut ContractState,
        changes: &[String],
    ) -> Result<String> {
        let prompt = format!(
            "Requested changes:\n- {}\n\nCurrent agreement:\n{}",
            changes.join("\n- "),
            strip_envelope(state.draft_text())
        );
        let impact = complete(
            &self.llm,
            StageKind::Negotiation,
            "impact_analysis",
            IMPACT_PROMPT,
            &prompt,
        )
        .await?;
        state.record_stage(
            StageKind::Negotiation,
            "impact_analysis",
            json!({ "impact": impact }),
        );
        Ok(impact)
    }

    async fn counterproposal(
        &self,
        state: &mut ContractState,
        changes: &[String],
        impact: &str,
    ) -> Result<()> {
        let prompt = format!(
            "Requested changes:\n- {}\n\nImpact analysis:\n{}\n\nCurrent agreement:\n{}",
            changes.join("\n- "),
            impact,
            strip_envelope(state.draft_text())
        );
        let output = complete(
            &self.llm,
            StageKind::Negotiation,
            "counterproposal",
            COUNTER_PROMPT,
            &prompt,
        )
        .await?;

        let draft = assemble(&output);
        state.record_stage(
            StageKind::Negotiation,
            "counterproposal",
            json!({ "chars": draft.len() }),
        );
        state.draft_content = Some(draft);
        Ok(())
    }

    fn version_audit(&self, state: &mut ContractState) {
        let content = state
            .draft_content
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| EMPTY_NEGOTIATION_CONTENT.to_string());
        let version = state
            .append_version(content, VersionType::Negotiation)
            .version_number;
        info!(session_id = %state.session_id, version, "Negotiation version recorded");
        state.record_stage(
            StageKind::Negotiation,
            "version_audit",
            json!({ "version": version }),
        );
    }

    /// Deterministic: fails on blocklisted terms or unresolved placeholders.
    fn policy_gate(&self, state: &mut ContractState) {
        let lowered = state.draft_text().to_lowercase();
        let blocked: Vec<&str> = POLICY_BLOCKLIST
            .iter()
            .copied()
            .filter(|term| lowered.contains(term))
            .collect();
        let placeholders = self.placeholders.count(state.draft_text());

        let result = if blocked.is_empty() && placeholders == 0 {
            "pass"
        } else {
            "fail"
        };

        state
            .validation_report
            .insert("policy_gate".to_string(), json!(result));
        state.record_stage(
            StageKind::Negotiation,
            "policy_gate",
            json!({
                "result": result,
                "blocked_terms": blocked,
                "unresolved_placeholders": placeholders,
            }),
        );
    }
}

#[async_trait]
impl Stage for NegotiationStage {
    fn kind(&self) -> StageKind {
        StageKind::Negotiation
    }

    async fn run(&self, state: &mut ContractState) -> Result<()> {
        let request = state.first_user_message().unwrap_or_default().to_string();
        info!(session_id = %state.session_id, "Negotiation started");

        let changes = self.extract_changes(state, &request).await?;
        let impact = self.analyze_impact(state, &changes).await?;
        self.counterproposal(state, &changes, &impact).await?;
        self.version_audit(state);
        self.policy_gate(state);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{steps, ScriptedLlm};

    #[tokio::test]
    async fn test_negotiation_steps_and_version() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(r#"["Extend payment to net 60"]"#),
            Ok("Net 60 delays cash flow. Counter with net 45."),
            Ok("1. Payment. Net 45."),
        ]));
        let stage = NegotiationStage::new(llm.clone()).unwrap();
        let mut state = ContractState::new("s1");
        state.push_user("Client wants net 60 payment");
        state.push_user("Also export as txt");
        state.draft_content = Some("1. Payment. Net 30.".into());
        state.append_version("1. Payment. Net 30.", VersionType::Draft);

        stage.run(&mut state).await.unwrap();

        assert_eq!(
            steps(&state, StageKind::Negotiation),
            vec![
                "change_extraction",
                "impact_analysis",
                "counterproposal",
                "version_audit",
                "policy_gate"
            ]
        );
        assert_eq!(state.versions.len(), 2);
        assert_eq!(state.versions[1].kind, VersionType::Negotiation);
        assert!(state.draft_text().contains("Net 45"));
        assert_eq!(state.validation_report["policy_gate"], "pass");

        // The change request is the first user turn
        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts[0][1].content, "Client wants net 60 payment");
    }

    #[tokio::test]
    async fn test_unparseable_changes_fall_back_to_request() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok("sure thing"), Ok("impact"), Ok("text")]));
        let stage = NegotiationStage::new(llm).unwrap();
        let mut state = ContractState::new("s1");
        state.push_user("Lower the fee");

        stage.run(&mut state).await.unwrap();

        let event = state
            .latest_stage_event(StageKind::Negotiation, "change_extraction")
            .unwrap();
        assert_eq!(event.payload["changes"][0], "Lower the fee");
    }

    #[tokio::test]
    async fn test_change_extraction_failure_aborts_stage() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err("connection refused")]));
        let stage = NegotiationStage::new(llm.clone()).unwrap();
        let mut state = ContractState::new("s1");
        state.push_user("Lower the fee");
        state.append_version("1. Fee. 5000.", VersionType::Draft);

        let err = stage.run(&mut state).await.unwrap_err();

        assert!(err.to_string().contains("change_extraction"));
        assert_eq!(llm.prompt_count(), 1);
        assert!(steps(&state, StageKind::Negotiation).is_empty());
        assert_eq!(state.versions.len(), 1);
    }

    #[tokio::test]
    async fn test_policy_gate_fails_on_blocked_terms() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("[]"),
            Ok("impact"),
            Ok("The Contractor accepts Unlimited Liability."),
        ]));
        let stage = NegotiationStage::new(llm).unwrap();
        let mut state = ContractState::new("s1");
        state.push_user("Client wants more protection");

        stage.run(&mut state).await.unwrap();

        assert_eq!(state.validation_report["policy_gate"], "fail");
        let gate = state
            .latest_stage_event(StageKind::Negotiation, "policy_gate")
            .unwrap();
        assert_eq!(gate.payload["blocked_terms"][0], "unlimited liability");
    }

    #[test]
    fn test_version_audit_without_draft_uses_placeholder() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let stage = NegotiationStage::new(llm).unwrap();
        let mut state = ContractState::new("s1");

        stage.version_audit(&mut state);

        assert_eq!(state.versions[0].content, EMPTY_NEGOTIATION_CONTENT);
        assert_eq!(state.versions[0].version_number, 1);
    }
}
