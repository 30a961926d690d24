//! Research stage
//!
//! plan → template search → optional structure/market lookups → fact
//! extraction → brief → audit. Fact extraction degrades to no facts; every
//! other completion failure aborts the stage.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{complete, facts_block, templates_block, Stage};
use crate::llm::structured::parse_json_object;
use crate::llm::LLMProvider;
use crate::state::{ContractState, StageKind};
use crate::tools::Toolkit;

const PLAN_PROMPT: &str = "You are a legal research planner for freelance and small-business contracts. \
Given the user's request, list the research questions that must be answered before drafting: \
parties, jurisdiction, scope, payment, term, termination, IP and confidentiality. \
Reply with a short numbered list.";

const STRUCTURE_PROMPT: &str = "You are a contracts specialist. Outline the standard section structure \
for the agreement the user describes, one section title per line, in order.";

const MARKET_PROMPT: &str = "You are a contracts specialist. Summarize customary market terms for the \
agreement the user describes: typical payment schedule, notice periods, liability caps and term length. \
Keep it under 150 words.";

const EXTRACT_PROMPT: &str = "Extract the concrete facts stated in the request as a flat JSON object. \
Use snake_case keys such as party_a, party_b, signer, jurisdiction, fee, currency, start_date, term, \
deliverables. Only include facts that are explicitly stated. \
Output ONLY the JSON object, no markdown, no explanation.";

const BRIEF_PROMPT: &str = "You are preparing a drafting brief for a contract lawyer. \
Combine the request, research plan, facts and reference clauses into a concise brief \
covering: parties, purpose, key commercial terms, risks to address and open questions.";

pub struct ResearchStage {
    llm: Arc<dyn LLMProvider>,
    tools: Toolkit,
    lookups: bool,
}

impl ResearchStage {
    pub fn new(llm: Arc<dyn LLMProvider>, tools: Toolkit, lookups: bool) -> Self {
        Self { llm, tools, lookups }
    }

    async fn plan(&self, state: &mut ContractState, request: &str) -> Result<String> {
        let plan = complete(&self.llm, StageKind::Research, "plan", PLAN_PROMPT, request).await?;
        state.record_stage(StageKind::Research, "plan", json!({ "plan": plan }));
        Ok(plan)
    }

    fn template_search(&self, state: &mut ContractState, request: &str) -> Vec<String> {
        let templates = self.tools.search_templates(request);
        state.record_stage(
            StageKind::Research,
            "template_search",
            json!({ "count": templates.len() }),
        );
        templates
    }

    async fn run_lookups(&self, state: &mut ContractState, request: &str) -> Result<()> {
        let structure = complete(
            &self.llm,
            StageKind::Research,
            "structure_lookup",
            STRUCTURE_PROMPT,
            request,
        )
        .await?;
        state.record_stage(
            StageKind::Research,
            "structure_lookup",
            json!({ "chars": structure.len() }),
        );
        state.contract_structure = Some(structure);

        let market = complete(
            &self.llm,
            StageKind::Research,
            "market_lookup",
            MARKET_PROMPT,
            request,
        )
        .await?;
        state.record_stage(
            StageKind::Research,
            "market_lookup",
            json!({ "chars": market.len() }),
        );
        state.market_terms = Some(market);

        Ok(())
    }

    /// New facts are merged over facts from earlier turns.
    async fn extract_facts(&self, state: &mut ContractState, request: &str) {
        let extracted: Map<String, Value> = match self.llm.prompt(EXTRACT_PROMPT, request).await {
            Ok(raw) => match parse_json_object(&raw) {
                Ok(facts) => facts,
                Err(e) => {
                    warn!("Fact extraction output unusable, continuing without facts: {}", e);
                    Map::new()
                }
            },
            Err(e) => {
                warn!("Fact extraction failed, continuing without facts: {}", e);
                Map::new()
            }
        };

        let keys: Vec<String> = extracted.keys().cloned().collect();
        state.extracted_facts.extend(extracted);
        state.record_stage(
            StageKind::Research,
            "extract",
            json!({ "new_keys": keys, "fact_count": state.extracted_facts.len() }),
        );
    }

    async fn brief(
        &self,
        state: &mut ContractState,
        request: &str,
        plan: &str,
        templates: &[String],
    ) -> Result<()> {
        let mut prompt = format!(
            "Request:\n{}\n\nResearch plan:\n{}\n\nFacts:\n{}\n\nReference clauses:\n{}",
            request,
            plan,
            facts_block(state),
            templates_block(templates)
        );
        if let Some(structure) = &state.contract_structure {
            prompt.push_str(&format!("\n\nStandard structure:\n{}", structure));
        }
        if let Some(market) = &state.market_terms {
            prompt.push_str(&format!("\n\nMarket terms:\n{}", market));
        }

        let brief = complete(&self.llm, StageKind::Research, "brief", BRIEF_PROMPT, &prompt).await?;
        state.record_stage(StageKind::Research, "brief", json!({ "brief": brief }));
        Ok(())
    }

    fn audit(&self, state: &mut ContractState, template_count: usize) {
        let fact_keys: Vec<&String> = state.extracted_facts.keys().collect();
        let payload = json!({
            "fact_keys": fact_keys,
            "template_count": template_count,
            "lookups": self.lookups,
        });
        info!(
            facts = state.extracted_facts.len(),
            templates = template_count,
            "Research complete"
        );
        state.record_stage(StageKind::Research, "audit", payload);
    }
}

#[async_trait]
impl Stage for ResearchStage {
    fn kind(&self) -> StageKind {
        StageKind::Research
    }

    async fn run(&self, state: &mut ContractState) -> Result<()> {
        let request = state.latest_user_message().unwrap_or_default().to_string();
        info!(session_id = %state.session_id, "Research started");

        let plan = self.plan(state, &request).await?;
        let templates = self.template_search(state, &request);
        if self.lookups {
            self.run_lookups(state, &request).await?;
        }
        self.extract_facts(state, &request).await;
        self.brief(state, &request, &plan, &templates).await?;
        self.audit(state, templates.len());

        Ok(())
    }
}
