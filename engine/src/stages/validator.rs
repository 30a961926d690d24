//! Validator
//!
//! Runs the fixed battery of checks against the current draft and replaces
//! the validation report with `<check>` / `<check>_details` pairs. A check
//! that errors records `warning` with the error text; the rest still run.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{PlaceholderScanner, Stage};
use crate::state::{ContractState, StageKind};
use crate::tools::{PiiDetector, PiiEntity};

pub const PASS: &str = "pass";
pub const WARNING: &str = "warning";
pub const FAIL: &str = "fail";

/// Check names in execution order
pub const CHECKS: [&str; 6] = [
    "pii_scan",
    "enforceability",
    "payment_check",
    "ip_ownership",
    "readability_score",
    "consistency",
];

const RISK_PHRASES: &[&str] = &[
    "unlimited liability",
    "in perpetuity",
    "sole discretion",
    "waives all rights",
    "non-compete",
    "liquidated damages",
    "automatically renew",
];

/// Verdict (or score) plus human-readable details
struct Finding {
    value: Value,
    details: String,
}

impl Finding {
    fn new(value: impl Into<Value>, details: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            details: details.into(),
        }
    }
}

pub struct Validator {
    pii: Arc<dyn PiiDetector>,
    placeholders: PlaceholderScanner,
    ip_clause: Regex,
}

impl Validator {
    pub fn new(pii: Arc<dyn PiiDetector>) -> Result<Self> {
        Ok(Self {
            pii,
            placeholders: PlaceholderScanner::new()?,
            ip_clause: Regex::new(
                r"(?i)intellectual\s+property|work\s+made\s+for\s+hire|work\s+for\s+hire|\bip\s+(ownership|rights)\b",
            )?,
        })
    }

    fn check(&self, name: &str, state: &ContractState) -> Result<Finding> {
        let draft = state.draft_text();
        match name {
            "pii_scan" => self.pii_scan(draft),
            "enforceability" => Ok(enforceability(draft)),
            "payment_check" => Ok(payment_check(state)),
            "ip_ownership" => Ok(self.ip_ownership(draft)),
            "readability_score" => Ok(readability(draft)),
            "consistency" => Ok(self.consistency(draft)),
            other => anyhow::bail!("unknown check {}", other),
        }
    }

    fn pii_scan(&self, draft: &str) -> Result<Finding> {
        let entities = self.pii.detect(draft)?;
        if entities.is_empty() {
            return Ok(Finding::new(PASS, "No PII detected"));
        }

        let labels: Vec<&str> = entities.iter().map(PiiEntity::label).collect();
        let verdict = if entities.contains(&PiiEntity::Email) {
            FAIL
        } else {
            WARNING
        };
        Ok(Finding::new(verdict, format!("Detected: {}", labels.join(", "))))
    }

    fn ip_ownership(&self, draft: &str) -> Finding {
        if draft.trim().is_empty() {
            Finding::new(WARNING, "No draft content to check")
        } else if self.ip_clause.is_match(draft) {
            Finding::new(PASS, "IP clause present")
        } else {
            Finding::new(FAIL, "No intellectual property clause found")
        }
    }

    fn consistency(&self, draft: &str) -> Finding {
        let found = self.placeholders.distinct(draft);
        if found.is_empty() {
            Finding::new(PASS, "No unresolved placeholders")
        } else {
            Finding::new(
                WARNING,
                format!(
                    "{} unresolved placeholders: {}",
                    self.placeholders.count(draft),
                    found.join(", ")
                ),
            )
        }
    }
}

fn enforceability(draft: &str) -> Finding {
    if draft.trim().is_empty() {
        return Finding::new(WARNING, "No draft content to check");
    }
    let lowered = draft.to_lowercase();
    let found: Vec<&str> = RISK_PHRASES
        .iter()
        .copied()
        .filter(|p| lowered.contains(p))
        .collect();
    if found.is_empty() {
        Finding::new(PASS, "Standard terms detected")
    } else {
        Finding::new(WARNING, format!("Risky terms: {}", found.join(", ")))
    }
}

fn payment_check(state: &ContractState) -> Finding {
    let has_schedule = state
        .payment_schedule
        .as_ref()
        .map(|s| !s.is_empty())
        .unwrap_or(false);
    let in_text = state.draft_text().contains("Payment Terms")
        || state.versions.iter().any(|v| v.content.contains("Payment Terms"));

    if has_schedule || in_text {
        Finding::new(PASS, "Payment terms found")
    } else {
        Finding::new(FAIL, "Missing payment terms")
    }
}

/// Average words per `.`-separated segment, rounded to two decimals.
pub fn readability_score(draft: &str) -> f64 {
    let segments: Vec<&str> = draft.split('.').collect();
    let words: usize = segments.iter().map(|s| s.split_whitespace().count()).sum();
    let avg = words as f64 / segments.len().max(1) as f64;
    (avg * 100.0).round() / 100.0
}

fn readability(draft: &str) -> Finding {
    let score = readability_score(draft);
    Finding::new(score, format!("Average sentence length: {} words", score))
}

#[async_trait]
impl Stage for Validator {
    fn kind(&self) -> StageKind {
        StageKind::Validator
    }

    async fn run(&self, state: &mut ContractState) -> Result<()> {
        let mut report = Map::new();
        let mut failed = Vec::new();
        let mut warnings = Vec::new();

        for name in CHECKS {
            let finding = self.check(name, state).unwrap_or_else(|e| {
                warn!(check = name, "Validator check errored: {:#}", e);
                Finding::new(WARNING, format!("Check failed to run: {}", e))
            });

            match finding.value.as_str() {
                Some(FAIL) => failed.push(name),
                Some(WARNING) => warnings.push(name),
                _ => {}
            }
            report.insert(name.to_string(), finding.value);
            report.insert(format!("{}_details", name), Value::String(finding.details));
        }

        info!(
            session_id = %state.session_id,
            failed = failed.len(),
            warnings = warnings.len(),
            "Validation complete"
        );

        state.validation_report = report;
        state.record_stage(
            StageKind::Validator,
            "run",
            json!({ "checks": CHECKS.len(), "failed": failed, "warnings": warnings }),
        );
        Ok(())
    }
}
