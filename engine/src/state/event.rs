use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One entry of the session log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Event {
    User {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Assistant {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Stage(StageEvent),
}

impl Event {
    pub fn user_content(&self) -> Option<&str> {
        match self {
            Event::User { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Event::User { .. })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::User { timestamp, .. } | Event::Assistant { timestamp, .. } => *timestamp,
            Event::Stage(e) => e.timestamp,
        }
    }
}

/// Completion record for one pipeline step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageEvent {
    pub stage: StageKind,
    pub step: String,
    pub status: EventStatus,
    /// Free-form object; consumers probe keys and tolerate absence
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Producer of a stage event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Research,
    Drafting,
    Negotiation,
    Admin,
    Validator,
    Orchestrator,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Research => "research",
            StageKind::Drafting => "drafting",
            StageKind::Negotiation => "negotiation",
            StageKind::Admin => "admin",
            StageKind::Validator => "validator",
            StageKind::Orchestrator => "orchestrator",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = Event::Stage(StageEvent {
            stage: StageKind::Research,
            step: "brief".into(),
            status: EventStatus::Done,
            payload: json!({"brief": "text"}),
            timestamp: Utc::now(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "stage");
        assert_eq!(value["stage"], "research");
        assert_eq!(value["status"], "done");
        assert_eq!(value["payload"]["brief"], "text");

        let user = serde_json::to_value(Event::User {
            content: "hi".into(),
            timestamp: Utc::now(),
        })
        .unwrap();
        assert_eq!(user["kind"], "user");
        assert_eq!(user["content"], "hi");
    }
}
