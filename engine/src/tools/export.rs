//! File exports: iCalendar deadlines and plain-text contract copies.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CRLF: &str = "\r\n";

/// Phrases in a user turn that request a plain-text copy
const TEXT_EXPORT_KEYWORDS: &[&str] = &["txt", "text file", ".txt", "plain text"];

/// A dated obligation pulled from the draft
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deadline {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
}

/// `YYYYMMDD` for dates that are exactly eight digits once `-`, `/` and `.`
/// separators are removed.
pub fn ics_date(raw: &str) -> Option<String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '/' | '.'))
        .collect();

    if compact.len() == 8 && compact.chars().all(|c| c.is_ascii_digit()) {
        Some(compact)
    } else {
        None
    }
}

/// Render deadlines as an iCalendar document; malformed dates are skipped.
pub fn render_calendar(deadlines: &[Deadline]) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Lexis//Deadlines//EN".to_string(),
    ];

    for (index, deadline) in deadlines.iter().enumerate() {
        let Some(date) = ics_date(&deadline.date) else {
            tracing::debug!("Skipping deadline with malformed date '{}'", deadline.date);
            continue;
        };

        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:lexis-{}-{}", date, index + 1));
        lines.push(format!("DTSTART;VALUE=DATE:{}", date));
        lines.push(format!("SUMMARY:{}", escape_text(&deadline.description)));
        lines.push("END:VEVENT".to_string());
    }

    lines.push("END:VCALENDAR".to_string());

    let mut out = lines.join(CRLF);
    out.push_str(CRLF);
    out
}

/// Write the calendar for `deadlines` to `path`
pub fn write_calendar(path: &Path, deadlines: &[Deadline]) -> Result<PathBuf> {
    std::fs::write(path, render_calendar(deadlines))
        .with_context(|| format!("Failed to write calendar {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Whether a user turn asks for a plain-text copy
pub fn wants_text_export(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TEXT_EXPORT_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// First unused name in `dir` among `contract.txt`, `contract_v2.txt`, ...
pub fn next_text_export_path(dir: &Path) -> PathBuf {
    let first = dir.join("contract.txt");
    if !first.exists() {
        return first;
    }

    (2u32..)
        .map(|n| dir.join(format!("contract_v{}.txt", n)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Write `content` to the next unused export name in `dir`
pub fn write_text_export(dir: &Path, content: &str) -> Result<PathBuf> {
    let path = next_text_export_path(dir);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write text export {}", path.display()))?;
    tracing::info!("Text export written to {}", path.display());
    Ok(path)
}

/// RFC 5545 TEXT escaping
fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}
