//! End-to-end turns through the orchestrator with real stages, SQLite memory
//! and file checkpoints. The completion capability is scripted.

mod common;

use common::{orchestrator, ScriptedProvider, DRAFT_BODY};
use lexis_engine::state::{Event, StageKind, VersionType};
use sdk::{EngineError, TaskCategory};
use std::sync::Arc;

fn stage_order(events: &[Event]) -> Vec<StageKind> {
    let mut order: Vec<StageKind> = Vec::new();
    for event in events {
        if let Event::Stage(stage) = event {
            if order.last() != Some(&stage.stage) {
                order.push(stage.stage);
            }
        }
    }
    order
}

#[tokio::test]
async fn test_create_turn_drafts_validates_and_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::pipeline("create"));
    let orch = orchestrator(dir.path(), Arc::clone(&provider), |_| {}).await;

    let outcome = orch
        .process_turn("acme", "Draft a web design agreement between Acme Corp and Beta LLC")
        .await
        .unwrap();

    let state = &outcome.state;
    assert_eq!(state.task_category, Some(TaskCategory::Create));
    assert_eq!(
        stage_order(&state.messages),
        vec![
            StageKind::Orchestrator,
            StageKind::Research,
            StageKind::Drafting,
            StageKind::Validator
        ]
    );
    assert_eq!(state.versions.len(), 1);
    assert_eq!(state.versions[0].kind, VersionType::Draft);
    assert!(state.draft_text().contains("Payment Terms"));
    assert_eq!(state.extracted_facts["party_b"], "Beta LLC");
    assert_eq!(state.validation_report["payment_check"], "pass");
    assert_eq!(state.validation_report["pii_scan"], "pass");

    let summary = outcome.summary.unwrap();
    assert_eq!(summary.feedback.as_deref(), Some("Looks fine."));
    assert_eq!(summary.version, Some(1));

    // The checkpoint reproduces the returned state
    assert_eq!(orch.checkpoints().load("acme"), outcome.state);
}

#[tokio::test]
async fn test_versions_grow_across_turns() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::pipeline("improve"));
    let orch = orchestrator(dir.path(), provider, |_| {}).await;

    for turn in 1..=3u32 {
        let outcome = orch
            .process_turn("acme", &format!("Tighten the agreement, pass {}", turn))
            .await
            .unwrap();
        let versions = &outcome.state.versions;
        assert_eq!(versions.len(), turn as usize);
        for (i, version) in versions.iter().enumerate() {
            assert_eq!(version.version_number, i as u32 + 1);
        }
    }

    // The envelope is never nested by repeated assembly
    let state = orch.checkpoints().load("acme");
    assert_eq!(state.draft_text().matches("CONTRACT DRAFT").count(), 1);
    assert!(state.draft_text().contains(DRAFT_BODY));
}

#[tokio::test]
async fn test_review_records_gap_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::pipeline("review"));
    let orch = orchestrator(dir.path(), provider, |_| {}).await;

    let outcome = orch.process_turn("acme", "Review my agreement").await.unwrap();

    let gaps = outcome
        .state
        .latest_stage_event(StageKind::Drafting, "gap_analysis")
        .unwrap();
    assert_eq!(gaps.payload["gaps"][0]["severity"], "high");
}

#[tokio::test]
async fn test_negotiation_follows_drafting_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::pipeline("improve"));
    let orch = orchestrator(dir.path(), provider, |config| {
        config.pipeline.negotiation_categories = vec![TaskCategory::Improve];
    })
    .await;

    let outcome = orch
        .process_turn("acme", "Client wants net 60 instead of net 30")
        .await
        .unwrap();

    let kinds: Vec<VersionType> = outcome.state.versions.iter().map(|v| v.kind).collect();
    assert_eq!(kinds, vec![VersionType::Draft, VersionType::Negotiation]);
    assert_eq!(
        stage_order(&outcome.state.messages).last(),
        Some(&StageKind::Validator)
    );
}

#[tokio::test]
async fn test_admin_turn_exports_files() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::pipeline("admin"));
    let orch = orchestrator(dir.path(), provider, |_| {}).await;

    let outcome = orch
        .process_turn("acme", "Send it for signature and give me a plain text copy")
        .await
        .unwrap();

    assert_eq!(
        stage_order(&outcome.state.messages),
        vec![StageKind::Orchestrator, StageKind::Admin, StageKind::Validator]
    );
    let exports = dir.path().join("exports");
    assert!(exports.join("deadlines_acme.ics").exists());
    assert!(exports.join("signature_acme.txt").exists());
    assert!(exports.join("contract.txt").exists());
    assert_eq!(outcome.state.signatures["status"], "pending");
}

#[tokio::test]
async fn test_chat_turn_skips_pipeline_and_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::pipeline("chat").on("You are Lexis", "Hi!"));
    let orch = orchestrator(dir.path(), Arc::clone(&provider), |_| {}).await;

    let outcome = orch.process_turn("acme", "hello there").await.unwrap();

    assert_eq!(outcome.reply.as_deref(), Some("Hi!"));
    assert!(outcome.summary.is_none());
    assert!(stage_order(&outcome.state.messages).is_empty());
    assert!(!orch.checkpoints().exists("acme"));

    // User and assistant turns were both remembered
    let memory = orch.memory().unwrap();
    assert_eq!(memory.count("acme").await.unwrap(), 2);
}

#[tokio::test]
async fn test_chat_context_is_session_scoped() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::pipeline("chat"));
    let orch = orchestrator(dir.path(), Arc::clone(&provider), |_| {}).await;

    orch.process_turn("alpha", "my hourly rate is 95 dollars")
        .await
        .unwrap();
    orch.process_turn("beta", "what hourly rate did I mention")
        .await
        .unwrap();

    let beta_chat = provider
        .system_prompts()
        .into_iter()
        .filter(|p| p.starts_with("You are Lexis"))
        .last()
        .unwrap();
    assert!(!beta_chat.contains("95"));
    assert!(beta_chat.contains("what hourly rate did I mention"));
}

#[tokio::test]
async fn test_stage_failure_aborts_turn_without_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::pipeline("create").failing_on("contract drafter"));
    let orch = orchestrator(dir.path(), provider, |_| {}).await;

    let err = orch.process_turn("acme", "Draft an NDA").await.unwrap_err();

    assert!(matches!(err, EngineError::StageFailed { ref stage, .. } if stage == "drafting"));
    assert!(!orch.checkpoints().exists("acme"));
}

#[tokio::test]
async fn test_routing_failure_surfaces_as_provider_error() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new("x").failing_on("Classify"));
    let orch = orchestrator(dir.path(), provider, |_| {}).await;

    let err = orch.process_turn("acme", "Draft an NDA").await.unwrap_err();
    assert!(matches!(err, EngineError::LLMProvider(_)));
}

#[tokio::test]
async fn test_feedback_failure_does_not_fail_turn() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new(DRAFT_BODY)
            .on("Classify", "create")
            .failing_on("validation results"),
    );
    let orch = orchestrator(dir.path(), provider, |_| {}).await;

    let outcome = orch.process_turn("acme", "Draft an NDA").await.unwrap();

    let summary = outcome.summary.unwrap();
    assert!(summary.feedback.is_none());
    assert!(summary.feedback_error.is_some());
    assert!(orch.checkpoints().exists("acme"));
}
