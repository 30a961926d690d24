//! Contract state
//!
//! The single record threaded through every stage of a turn. It is loaded from
//! the checkpoint store, mutated in place, then written back. The message log
//! and the version history are append-only.

use chrono::{DateTime, Utc};
use sdk::types::TaskCategory;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod event;
mod version;

pub use event::{Event, EventStatus, StageEvent, StageKind};
pub use version::{VersionRecord, VersionType};

/// Shared mutable record for one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractState {
    pub session_id: String,

    /// Causally ordered log of user turns, assistant turns and stage events
    #[serde(default)]
    pub messages: Vec<Event>,

    /// Routing decision for the current turn
    #[serde(default)]
    pub task_category: Option<TaskCategory>,

    /// Research scratch space read by Drafting
    #[serde(default)]
    pub extracted_facts: Map<String, Value>,

    #[serde(default)]
    pub draft_content: Option<String>,

    #[serde(default)]
    pub versions: Vec<VersionRecord>,

    /// Latest validator findings, `<check>` plus `<check>_details`
    #[serde(default)]
    pub validation_report: Map<String, Value>,

    #[serde(default)]
    pub signatures: Map<String, Value>,

    /// Set by callers, never by stages
    #[serde(default)]
    pub payment_schedule: Option<Map<String, Value>>,

    #[serde(default)]
    pub contract_structure: Option<String>,

    #[serde(default)]
    pub market_terms: Option<String>,

    /// Reviewer feedback carried between turns
    #[serde(default)]
    pub human_feedback: Option<String>,
}

impl ContractState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            task_category: None,
            extracted_facts: Map::new(),
            draft_content: None,
            versions: Vec::new(),
            validation_report: Map::new(),
            signatures: Map::new(),
            payment_schedule: None,
            contract_structure: None,
            market_terms: None,
            human_feedback: None,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Event::User {
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Event::Assistant {
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Append a completed-step event for `stage`.
    ///
    /// A non-object payload is wrapped as `{"value": ...}` so consumers can
    /// always probe by key.
    pub fn record_stage(&mut self, stage: StageKind, step: &str, payload: Value) {
        let payload = match payload {
            Value::Object(_) => payload,
            Value::Null => Value::Object(Map::new()),
            other => serde_json::json!({ "value": other }),
        };

        self.messages.push(Event::Stage(StageEvent {
            stage,
            step: step.to_string(),
            status: EventStatus::Done,
            payload,
            timestamp: Utc::now(),
        }));
    }

    pub fn last_message(&self) -> Option<&Event> {
        self.messages.last()
    }

    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(Event::user_content)
    }

    /// The request that opened the session; negotiation reads it as the
    /// change request.
    pub fn first_user_message(&self) -> Option<&str> {
        self.messages.iter().find_map(Event::user_content)
    }

    pub fn latest_stage_event(&self, stage: StageKind, step: &str) -> Option<&StageEvent> {
        self.messages.iter().rev().find_map(|event| match event {
            Event::Stage(e) if e.stage == stage && e.step == step => Some(e),
            _ => None,
        })
    }

    /// Brief synthesized by the latest research run
    pub fn research_brief(&self) -> Option<&str> {
        self.latest_stage_event(StageKind::Research, "brief")
            .and_then(|e| e.payload.get("brief"))
            .and_then(Value::as_str)
    }

    pub fn last_version(&self) -> Option<&VersionRecord> {
        self.versions.last()
    }

    /// Snapshot `content` as the next version.
    ///
    /// The number is derived from the history length, so it is always one
    /// more than the number of prior versions.
    pub fn append_version(&mut self, content: impl Into<String>, kind: VersionType) -> &VersionRecord {
        let record = VersionRecord {
            version_number: self.versions.len() as u32 + 1,
            content: content.into(),
            timestamp: Utc::now(),
            kind,
        };
        self.versions.push(record);
        &self.versions[self.versions.len() - 1]
    }

    /// Current draft, or an empty string when nothing has been drafted
    pub fn draft_text(&self) -> &str {
        self.draft_content.as_deref().unwrap_or_default()
    }

    /// Timestamp of the most recent event, if any
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(Event::timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors_on_empty_state() {
        let state = ContractState::new("s1");
        assert!(state.latest_user_message().is_none());
        assert!(state.first_user_message().is_none());
        assert!(state.research_brief().is_none());
        assert!(state.last_version().is_none());
        assert_eq!(state.draft_text(), "");
    }

    #[test]
    fn test_first_and_latest_user_message() {
        let mut state = ContractState::new("s1");
        state.push_user("Draft an NDA");
        state.push_assistant("Done");
        state.push_user("Make the term 2 years");
        state.record_stage(StageKind::Research, "plan", json!({}));

        assert_eq!(state.first_user_message(), Some("Draft an NDA"));
        assert_eq!(state.latest_user_message(), Some("Make the term 2 years"));
    }

    #[test]
    fn test_research_brief_uses_latest_event() {
        let mut state = ContractState::new("s1");
        state.record_stage(StageKind::Research, "brief", json!({"brief": "old"}));
        state.record_stage(StageKind::Drafting, "brief", json!({"brief": "not research"}));
        state.record_stage(StageKind::Research, "brief", json!({"brief": "new"}));

        assert_eq!(state.research_brief(), Some("new"));
    }

    #[test]
    fn test_brief_event_without_key_is_tolerated() {
        let mut state = ContractState::new("s1");
        state.record_stage(StageKind::Research, "brief", json!({"other": 1}));
        assert!(state.research_brief().is_none());
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let mut state = ContractState::new("s1");
        state.record_stage(StageKind::Admin, "notify", json!("sent"));
        let event = state.latest_stage_event(StageKind::Admin, "notify").unwrap();
        assert_eq!(event.payload["value"], "sent");
        assert_eq!(event.status, EventStatus::Done);
    }

    #[test]
    fn test_version_numbers_follow_history_length() {
        let mut state = ContractState::new("s1");
        state.append_version("one", VersionType::Draft);
        state.append_version("two", VersionType::Negotiation);
        let third = state.append_version("three", VersionType::Draft).version_number;

        assert_eq!(third, 3);
        assert_eq!(state.last_version().unwrap().kind, VersionType::Draft);
        assert_eq!(state.versions[1].kind, VersionType::Negotiation);
    }

    #[test]
    fn test_serde_roundtrip_preserves_every_field() {
        let mut state = ContractState::new("s1");
        state.push_user("Draft a services agreement");
        state.task_category = Some(TaskCategory::Create);
        state.extracted_facts.insert("party_a".into(), json!("Acme"));
        state.draft_content = Some("Body".into());
        state.append_version("Body", VersionType::Draft);
        state.validation_report.insert("pii_scan".into(), json!("pass"));
        state.signatures.insert("signer".into(), json!("Acme"));
        state.payment_schedule = Some(Map::from_iter([("net".to_string(), json!(30))]));
        state.contract_structure = Some("Recitals; Terms".into());
        state.market_terms = Some("Net 30".into());
        state.human_feedback = Some("Shorter please".into());

        let json = serde_json::to_string_pretty(&state).unwrap();
        let restored: ContractState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_minimal_document_deserializes() {
        let state: ContractState = serde_json::from_str(r#"{"session_id": "abc"}"#).unwrap();
        assert_eq!(state, ContractState::new("abc"));
    }
}
