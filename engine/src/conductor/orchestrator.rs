//! Orchestrator
//!
//! Owns the router, the stage supervisors, conversational memory and the
//! checkpoint store, and sequences one turn:
//!
//! 1. Record the latest user turn into memory (best-effort)
//! 2. `chat` turns go to the conversational responder and return; no
//!    validation, no checkpoint
//! 3. Dispatch the category's stages in table order
//! 4. Run the validator
//! 5. Save the checkpoint
//! 6. Build the summary (feedback synthesis is best-effort)

use anyhow::Context;
use sdk::{EngineError, TaskCategory};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{CheckpointStore, Router, TurnSummary};
use crate::config::Config;
use crate::db::{Database, MemoryStore};
use crate::llm::{build_provider, LLMProvider, MessageRole};
use crate::stages::{
    AdminStage, Conversation, DraftingStage, NegotiationStage, ResearchStage, Stage, Validator,
};
use crate::state::{ContractState, Event, StageKind};
use crate::tools::Toolkit;
use serde_json::json;

/// Stages dispatched for each category, before the validator
pub fn dispatch_table(category: TaskCategory) -> &'static [StageKind] {
    match category {
        TaskCategory::Create | TaskCategory::Improve | TaskCategory::Review => {
            &[StageKind::Research, StageKind::Drafting]
        }
        TaskCategory::Admin => &[StageKind::Admin],
        TaskCategory::Chat => &[],
    }
}

/// Result of one turn
#[derive(Debug)]
pub struct TurnOutcome {
    pub state: ContractState,
    /// Assistant reply on the conversational path
    pub reply: Option<String>,
    /// Pipeline summary; absent on the conversational path
    pub summary: Option<TurnSummary>,
}

pub struct Orchestrator {
    llm: Arc<dyn LLMProvider>,
    router: Router,
    stages: HashMap<StageKind, Arc<dyn Stage>>,
    validator: Arc<dyn Stage>,
    conversation: Conversation,
    memory: Option<MemoryStore>,
    checkpoints: CheckpointStore,
    negotiation_categories: Vec<TaskCategory>,
}

impl Orchestrator {
    /// Wire the default stage set around one completion provider.
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        tools: Toolkit,
        memory: Option<MemoryStore>,
        checkpoints: CheckpointStore,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let research: Arc<dyn Stage> = Arc::new(ResearchStage::new(
            Arc::clone(&llm),
            tools.clone(),
            config.pipeline.research_lookups,
        ));
        let drafting: Arc<dyn Stage> =
            Arc::new(DraftingStage::new(Arc::clone(&llm), tools.clone())?);
        let negotiation: Arc<dyn Stage> = Arc::new(NegotiationStage::new(Arc::clone(&llm))?);
        let admin: Arc<dyn Stage> = Arc::new(AdminStage::new(Arc::clone(&llm), tools.clone()));
        let validator: Arc<dyn Stage> = Arc::new(Validator::new(Arc::clone(&tools.pii))?);

        let stages = [research, drafting, negotiation, admin]
            .into_iter()
            .map(|stage| (stage.kind(), stage))
            .collect();

        Ok(Self {
            router: Router::new(Arc::clone(&llm)),
            conversation: Conversation::new(
                Arc::clone(&llm),
                memory.clone(),
                config.memory.context_turns,
            ),
            llm,
            stages,
            validator,
            memory,
            checkpoints,
            negotiation_categories: config.pipeline.negotiation_categories.clone(),
        })
    }

    /// Build everything from configuration: provider, memory database,
    /// toolkit and checkpoint directory.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let llm = build_provider(&config.llm)?;
        let tools = Toolkit::from_config(config)?;
        let db = Database::new(&config.memory_db_path())
            .await
            .context("Failed to open conversational memory")?;
        let checkpoints = CheckpointStore::new(config.checkpoint_dir());

        Self::new(llm, tools, Some(db.memory()), checkpoints, config)
    }

    /// Replace the stage registered for `stage.kind()`.
    /// A validator-kind stage replaces the validator.
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        match stage.kind() {
            StageKind::Validator => self.validator = stage,
            kind => {
                self.stages.insert(kind, stage);
            }
        }
        self
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn memory(&self) -> Option<&MemoryStore> {
        self.memory.as_ref()
    }

    /// Ordered stages for `category`, negotiation included when configured
    pub fn plan(&self, category: TaskCategory) -> Vec<StageKind> {
        let mut plan = dispatch_table(category).to_vec();
        if !category.is_conversational() && self.negotiation_categories.contains(&category) {
            plan.push(StageKind::Negotiation);
        }
        plan
    }

    /// Load the session, append `input`, classify it and run the turn.
    pub async fn process_turn(
        &self,
        session_id: &str,
        input: &str,
    ) -> Result<TurnOutcome, EngineError> {
        let mut state = self.checkpoints.load(session_id);
        state.push_user(input);

        let category = self
            .router
            .classify(input)
            .await
            .map_err(|e| EngineError::LLMProvider(format!("{:#}", e)))?;
        info!(session_id, %category, "Turn routed");
        state.task_category = Some(category);

        self.run(state).await
    }

    /// Run one turn against `state`, which must already carry a category.
    pub async fn run(&self, mut state: ContractState) -> Result<TurnOutcome, EngineError> {
        let category = state.task_category.ok_or(EngineError::CategoryNotSet)?;

        self.remember_user_turn(&state).await;

        if category.is_conversational() {
            let reply = self
                .conversation
                .respond(&mut state)
                .await
                .map_err(|e| EngineError::LLMProvider(format!("{:#}", e)))?;
            return Ok(TurnOutcome {
                state,
                reply: Some(reply),
                summary: None,
            });
        }

        let plan = self.plan(category);
        state.record_stage(
            StageKind::Orchestrator,
            "dispatch",
            json!({
                "category": category,
                "stages": plan.iter().map(StageKind::as_str).collect::<Vec<_>>(),
            }),
        );

        for kind in &plan {
            let stage = self
                .stages
                .get(kind)
                .ok_or_else(|| EngineError::StageNotRegistered(kind.to_string()))?;
            Self::run_stage(stage.as_ref(), &mut state).await?;
        }
        Self::run_stage(self.validator.as_ref(), &mut state).await?;

        self.checkpoints.save(&state)?;

        let mut executed: Vec<String> = plan.iter().map(|k| k.to_string()).collect();
        executed.push(StageKind::Validator.to_string());
        let mut summary = TurnSummary::from_state(&state, executed);
        summary.synthesize_feedback(&self.llm).await;

        Ok(TurnOutcome {
            state,
            reply: None,
            summary: Some(summary),
        })
    }

    async fn run_stage(stage: &dyn Stage, state: &mut ContractState) -> Result<(), EngineError> {
        let kind = stage.kind();
        info!(session_id = %state.session_id, stage = %kind, "Stage started");
        stage.run(state).await.map_err(|e| {
            error!(stage = %kind, "Stage failed: {:#}", e);
            EngineError::StageFailed {
                stage: kind.to_string(),
                reason: format!("{:#}", e),
            }
        })
    }

    async fn remember_user_turn(&self, state: &ContractState) {
        let Some(memory) = &self.memory else {
            return;
        };
        if let Some(Event::User { content, .. }) = state.last_message() {
            if let Err(e) = memory
                .record(MessageRole::User, content, &state.session_id)
                .await
            {
                warn!("Failed to record user turn: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{toolkit, ScriptedLlm};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Appends its kind to a shared log instead of doing work
    struct Recorder {
        kind: StageKind,
        log: Arc<Mutex<Vec<StageKind>>>,
        fail: bool,
    }

    #[async_trait]
    impl Stage for Recorder {
        fn kind(&self) -> StageKind {
            self.kind
        }

        async fn run(&self, state: &mut ContractState) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.kind);
            if self.fail {
                anyhow::bail!("boom");
            }
            state.record_stage(self.kind, "recorded", json!({}));
            Ok(())
        }
    }

    fn orchestrator(
        dir: &std::path::Path,
        config: &Config,
        log: &Arc<Mutex<Vec<StageKind>>>,
    ) -> Orchestrator {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let mut orch = Orchestrator::new(
            llm,
            toolkit(dir),
            None,
            CheckpointStore::new(dir.join("checkpoints")),
            config,
        )
        .unwrap();
        for kind in [
            StageKind::Research,
            StageKind::Drafting,
            StageKind::Negotiation,
            StageKind::Admin,
            StageKind::Validator,
        ] {
            orch = orch.with_stage(Arc::new(Recorder {
                kind,
                log: Arc::clone(log),
                fail: false,
            }));
        }
        orch
    }

    fn state(category: Option<TaskCategory>) -> ContractState {
        let mut state = ContractState::new("s1");
        state.push_user("do the thing");
        state.task_category = category;
        state
    }

    #[tokio::test]
    async fn test_dispatch_order_per_category() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path()).unwrap();

        for category in [
            TaskCategory::Create,
            TaskCategory::Improve,
            TaskCategory::Review,
            TaskCategory::Admin,
        ] {
            let log = Arc::new(Mutex::new(Vec::new()));
            let orch = orchestrator(dir.path(), &config, &log);

            let outcome = orch.run(state(Some(category))).await.unwrap();

            let mut expected = dispatch_table(category).to_vec();
            expected.push(StageKind::Validator);
            assert_eq!(*log.lock().unwrap(), expected, "{}", category);
            assert!(outcome.summary.is_some());
            assert!(orch.checkpoints().exists("s1"));
        }
    }

    #[tokio::test]
    async fn test_negotiation_runs_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path()).unwrap();
        config.pipeline.negotiation_categories = vec![TaskCategory::Improve];
        let log = Arc::new(Mutex::new(Vec::new()));
        let orch = orchestrator(dir.path(), &config, &log);

        orch.run(state(Some(TaskCategory::Improve))).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                StageKind::Research,
                StageKind::Drafting,
                StageKind::Negotiation,
                StageKind::Validator
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_bypasses_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let orch = orchestrator(dir.path(), &config, &log);

        let outcome = orch.run(state(Some(TaskCategory::Chat))).await.unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(outcome.reply.as_deref(), Some("ok"));
        assert!(outcome.summary.is_none());
        assert!(!orch.checkpoints().exists("s1"));
    }

    #[tokio::test]
    async fn test_missing_category_dispatches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let orch = orchestrator(dir.path(), &config, &log);

        let err = orch.run(state(None)).await.unwrap_err();

        assert!(matches!(err, EngineError::CategoryNotSet));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stage_failure_aborts_without_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let orch = orchestrator(dir.path(), &config, &log).with_stage(Arc::new(Recorder {
            kind: StageKind::Research,
            log: Arc::clone(&log),
            fail: true,
        }));

        let err = orch.run(state(Some(TaskCategory::Create))).await.unwrap_err();

        assert!(matches!(err, EngineError::StageFailed { ref stage, .. } if stage == "research"));
        assert_eq!(*log.lock().unwrap(), vec![StageKind::Research]);
        assert!(!orch.checkpoints().exists("s1"));
    }
}
