//! Session control
//!
//! A session id scopes conversational memory and names the checkpoint file.
//! The interactive loop switches sessions with slash commands; everything
//! else on a line is a turn for the current session.

use std::fmt;

pub const HELP_TEXT: &str = "\
Commands:
  /session <id>  switch to an existing or new session
  /new           start a fresh session
  /current       show the current session id
  /help          show this help
  /exit          leave the loop
Anything else is sent to the pipeline as a request.";

/// Fresh random session id
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// File-system safe form of a session id, distinct for distinct ids.
///
/// ASCII alphanumerics and `-` pass through, `_` becomes `__` and every other
/// UTF-8 byte becomes `_` plus two lowercase hex digits. The empty id maps to
/// a lone `_`, which no other id produces.
pub fn file_stem(session_id: &str) -> String {
    if session_id.is_empty() {
        return "_".to_string();
    }

    let mut stem = String::with_capacity(session_id.len());
    for byte in session_id.bytes() {
        match byte {
            b'_' => stem.push_str("__"),
            b if b.is_ascii_alphanumeric() || b == b'-' => stem.push(char::from(b)),
            b => stem.push_str(&format!("_{:02x}", b)),
        }
    }
    stem
}

/// A slash command typed in the interactive loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Switch(String),
    New,
    Current,
    Help,
    Exit,
    /// Slash command that was not understood; carries a message for the user
    Invalid(String),
}

impl SessionCommand {
    /// Parse a line; `None` means the line is a regular turn.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if !trimmed.starts_with('/') {
            return None;
        }

        let mut parts = trimmed.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let arg = parts.next();

        let parsed = match (command, arg) {
            ("/session", Some(id)) => SessionCommand::Switch(id.to_string()),
            ("/session", None) => SessionCommand::Invalid("Usage: /session <id>".to_string()),
            ("/new", _) => SessionCommand::New,
            ("/current", _) => SessionCommand::Current,
            ("/help", _) => SessionCommand::Help,
            ("/exit" | "/quit", _) => SessionCommand::Exit,
            (other, _) => {
                SessionCommand::Invalid(format!("Unknown command '{}'. Type /help", other))
            }
        };

        Some(parsed)
    }
}

/// Tracks which session subsequent turns belong to
#[derive(Debug, Clone)]
pub struct SessionManager {
    current: String,
}

impl SessionManager {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            current: initial
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(new_session_id),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Apply a command and return the line to show the user, or `None` for
    /// `/exit`.
    pub fn apply(&mut self, command: &SessionCommand) -> Option<String> {
        match command {
            SessionCommand::Switch(id) => {
                self.current = id.clone();
                tracing::info!(session_id = %self.current, "Switched session");
                Some(format!("Switched to session {}", self.current))
            }
            SessionCommand::New => {
                self.current = new_session_id();
                tracing::info!(session_id = %self.current, "Started new session");
                Some(format!("Started new session {}", self.current))
            }
            SessionCommand::Current => Some(format!("Current session: {}", self.current)),
            SessionCommand::Help => Some(HELP_TEXT.to_string()),
            SessionCommand::Invalid(message) => Some(message.clone()),
            SessionCommand::Exit => None,
        }
    }
}

impl fmt::Display for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.current)
    }
}
